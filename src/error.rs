use std::borrow::Cow;
use std::io;
use std::num;
use std::str;
use std::string;

use thiserror::Error;

/// Errors raised on the client side, before anything is sent to the server.
#[derive(Debug, Error, PartialEq)]
pub enum ClientError {
    /// The key is longer than the 250 bytes memcached accepts.
    #[error("key is too long")]
    KeyTooLong,
    /// The key is empty or contains whitespace or control characters.
    #[error("key contains invalid characters")]
    InvalidKey,
    /// The ASCII protocol received a `CLIENT_ERROR` line, or a local
    /// framing limit was hit.
    #[error("{0}")]
    Error(Cow<'static, str>),
}

impl From<String> for ClientError {
    fn from(s: String) -> Self {
        ClientError::Error(Cow::Owned(s))
    }
}

/// Errors caused by the server answering something unexpected.
#[derive(Debug, Error, PartialEq)]
pub enum ServerError {
    /// The binary response did not start with the response magic byte.
    #[error("bad magic number in response header: {0:#04x}")]
    BadMagic(u8),
    /// The response could not be parsed.
    #[error("bad response: {0}")]
    BadResponse(Cow<'static, str>),
    /// The ASCII protocol received a `SERVER_ERROR` line.
    #[error("{0}")]
    Error(String),
}

impl From<String> for ServerError {
    fn from(s: String) -> Self {
        ServerError::Error(s)
    }
}

/// Status of a command the server refused to carry out.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("key not found")]
    KeyNotFound,
    #[error("key exists")]
    KeyExists,
    #[error("value too large")]
    ValueTooLarge,
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("item not stored")]
    ItemNotStored,
    #[error("incr/decr on non-numeric value")]
    NonNumericValue,
    #[error("unknown command")]
    UnknownCommand,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid command")]
    InvalidCommand,
    #[error("unknown status code: {0:#06x}")]
    Unknown(u16),
}

impl From<u16> for CommandError {
    fn from(status: u16) -> CommandError {
        match status {
            0x0001 => CommandError::KeyNotFound,
            0x0002 => CommandError::KeyExists,
            0x0003 => CommandError::ValueTooLarge,
            0x0004 => CommandError::InvalidArguments,
            0x0005 => CommandError::ItemNotStored,
            0x0006 => CommandError::NonNumericValue,
            0x0081 => CommandError::UnknownCommand,
            0x0082 => CommandError::OutOfMemory,
            _ => CommandError::Unknown(status),
        }
    }
}

/// Failure to establish or keep up a session with the server.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid connection target: {0}")]
    Target(Cow<'static, str>),
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[cfg(feature = "tls")]
    #[error("tls: {0}")]
    Tls(#[from] openssl::error::ErrorStack),
    #[cfg(feature = "tls")]
    #[error("tls handshake: {0}")]
    Handshake(String),
}

/// A set/get/delete (or other command) failed at the protocol or server level.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("value is not valid utf-8: {0}")]
    Utf8(#[from] string::FromUtf8Error),
    #[error("cannot parse integer: {0}")]
    ParseInt(#[from] num::ParseIntError),
    #[error("cannot parse float: {0}")]
    ParseFloat(#[from] num::ParseFloatError),
    #[error("cannot parse bool: {0}")]
    ParseBool(#[from] str::ParseBoolError),
    #[cfg(feature = "json")]
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// The single error type every client operation returns.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("operation error: {0}")]
    Operation(#[from] OperationError),
    #[error("connection is closed")]
    ConnectionClosed,
}

macro_rules! impl_from_for_cache_error {
    ($via:ident, $($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for CacheError {
                fn from(err: $ty) -> CacheError {
                    CacheError::$via(err.into())
                }
            }
        )+
    };
}

impl_from_for_cache_error!(Connection, io::Error, url::ParseError, r2d2::Error);
impl_from_for_cache_error!(
    Operation,
    ClientError,
    ServerError,
    CommandError,
    string::FromUtf8Error,
    num::ParseIntError,
    num::ParseFloatError,
    str::ParseBoolError,
);

#[cfg(feature = "tls")]
impl_from_for_cache_error!(Connection, openssl::error::ErrorStack);

#[cfg(feature = "json")]
impl_from_for_cache_error!(Operation, serde_json::Error);

impl From<str::Utf8Error> for CacheError {
    fn from(err: str::Utf8Error) -> CacheError {
        ServerError::BadResponse(Cow::Owned(err.to_string())).into()
    }
}

impl CacheError {
    /// Map the generic ASCII error lines onto errors, passing every other line through.
    pub(crate) fn try_from(s: &str) -> Result<&str, CacheError> {
        if s == "ERROR\r\n" {
            Err(CommandError::InvalidCommand)?
        } else if let Some(message) = s.strip_prefix("CLIENT_ERROR ") {
            Err(ClientError::from(message.trim_end_matches("\r\n").to_string()))?
        } else if let Some(message) = s.strip_prefix("SERVER_ERROR ") {
            let message = message.trim_end_matches("\r\n");
            if message.starts_with("object too large") {
                Err(CommandError::ValueTooLarge)?
            } else if message.starts_with("out of memory") {
                Err(CommandError::OutOfMemory)?
            }
            Err(ServerError::from(message.to_string()))?
        } else if s == "NOT_FOUND\r\n" {
            Err(CommandError::KeyNotFound)?
        } else if s == "EXISTS\r\n" {
            Err(CommandError::KeyExists)?
        } else {
            Ok(s)
        }
    }

    /// The command status carried by this error, if any.
    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            CacheError::Operation(OperationError::Command(e)) => Some(e),
            _ => None,
        }
    }
}
