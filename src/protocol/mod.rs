mod ascii;
mod binary;
mod binary_packet;

use enum_dispatch::enum_dispatch;

use crate::error::{CacheError, ClientError};
pub(crate) use crate::protocol::ascii::AsciiProtocol;
pub(crate) use crate::protocol::binary::BinaryProtocol;
use crate::stream::Stream;
use crate::value::{FromMemcacheValue, ToMemcacheValue};

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

#[enum_dispatch]
pub enum Protocol {
    Ascii(AsciiProtocol<Stream>),
    Binary(BinaryProtocol),
}

#[enum_dispatch(Protocol)]
pub trait ProtocolTrait {
    fn version(&mut self) -> Result<String, CacheError>;
    fn flush(&mut self) -> Result<(), CacheError>;
    fn get<V: FromMemcacheValue>(&mut self, key: &str) -> Result<Option<V>, CacheError>;
    fn set<V: ToMemcacheValue>(&mut self, key: &str, value: V, expiration: u32) -> Result<bool, CacheError>;
    fn delete(&mut self, key: &str) -> Result<bool, CacheError>;
    fn touch(&mut self, key: &str, expiration: u32) -> Result<bool, CacheError>;
    fn stream(&mut self) -> &mut Stream;
}

/// Reject keys memcached would refuse, before anything goes on the wire.
pub(crate) fn check_key(key: &str) -> Result<(), CacheError> {
    if key.len() > MAX_KEY_LENGTH {
        Err(ClientError::KeyTooLong)?
    }
    if key.is_empty() || key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        Err(ClientError::InvalidKey)?
    }
    Ok(())
}
