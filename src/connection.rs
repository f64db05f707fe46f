use std::borrow::Cow;
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, warn};
use url::Url;

#[cfg(feature = "tls")]
use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslVerifyMode};

use crate::error::{CacheError, ConnectionError};
use crate::protocol::{AsciiProtocol, BinaryProtocol, Protocol, ProtocolTrait};
use crate::stream::Stream;

/// Default bound on establishing a connection, when the url does not carry `connect_timeout`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which wire protocol a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolKind {
    #[default]
    Binary,
    Ascii,
}

/// Everything a connection url can configure.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub protocol: ProtocolKind,
    pub connect_timeout: Duration,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub tcp_nodelay: bool,
    #[cfg(feature = "tls")]
    pub tls: Option<TlsOptions>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            protocol: ProtocolKind::Binary,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            write_timeout: None,
            tcp_nodelay: false,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

#[cfg(feature = "tls")]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TlsOptions {
    pub verify: bool,
    pub ca_path: Option<String>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

fn invalid(message: impl Into<Cow<'static, str>>) -> CacheError {
    ConnectionError::Target(message.into()).into()
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, CacheError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| invalid(format!("{} must be a number of seconds, got {:?}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CacheError> {
    value
        .parse::<bool>()
        .map_err(|_| invalid(format!("{} must be true or false, got {:?}", key, value)))
}

impl ConnectionOptions {
    /// Read the options carried by a `memcache://` or `memcache+tls://` url.
    pub fn from_url(url: &Url) -> Result<Self, CacheError> {
        let mut options = ConnectionOptions::default();
        match url.scheme() {
            "memcache" => {}
            #[cfg(feature = "tls")]
            "memcache+tls" => {
                options.tls = Some(TlsOptions {
                    verify: true,
                    ..Default::default()
                })
            }
            scheme => return Err(invalid(format!("unsupported url scheme {:?}", scheme))),
        }

        for (key, value) in url.query_pairs() {
            match &*key {
                "protocol" => {
                    options.protocol = match &*value {
                        "binary" => ProtocolKind::Binary,
                        "ascii" => ProtocolKind::Ascii,
                        other => return Err(invalid(format!("unknown protocol {:?}", other))),
                    }
                }
                "timeout" => {
                    let timeout = parse_seconds(&key, &value)?;
                    options.read_timeout = Some(timeout);
                    options.write_timeout = Some(timeout);
                }
                "connect_timeout" => options.connect_timeout = parse_seconds(&key, &value)?,
                "tcp_nodelay" => options.tcp_nodelay = parse_bool(&key, &value)?,
                #[cfg(feature = "tls")]
                "verify_mode" | "ca_path" | "cert_path" | "key_path" => {
                    let tls = options
                        .tls
                        .as_mut()
                        .ok_or_else(|| invalid(format!("{} requires the memcache+tls scheme", key)))?;
                    match &*key {
                        "verify_mode" => {
                            tls.verify = match &*value {
                                "none" => false,
                                "peer" => true,
                                other => return Err(invalid(format!("unknown verify_mode {:?}", other))),
                            }
                        }
                        "ca_path" => tls.ca_path = Some(value.into_owned()),
                        "cert_path" => tls.cert_path = Some(value.into_owned()),
                        _ => tls.key_path = Some(value.into_owned()),
                    }
                }
                other => warn!("ignoring unknown connection parameter {:?}", other),
            }
        }
        Ok(options)
    }
}

/// An open session to one memcached server.
pub struct Connection {
    protocol: Protocol,
    url: String,
    broken: bool,
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!("closing connection to {}", self.url);
        self.protocol.stream().shutdown();
    }
}

fn tcp_stream(url: &Url, options: &ConnectionOptions) -> Result<TcpStream, CacheError> {
    let host = url.host_str().ok_or_else(|| invalid("url has no host"))?;
    let port = url.port().unwrap_or(11211);
    // url keeps the brackets around ipv6 literals
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, options.connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(options.tcp_nodelay)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(err.into()),
        None => Err(invalid(format!("{} did not resolve to any address", host))),
    }
}

#[cfg(feature = "tls")]
fn tls_stream(url: &Url, tcp: TcpStream, tls: &TlsOptions) -> Result<Stream, CacheError> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    if let Some(ca_path) = &tls.ca_path {
        builder.set_ca_file(ca_path)?;
    }
    if let Some(cert_path) = &tls.cert_path {
        builder.set_certificate_file(cert_path, SslFiletype::PEM)?;
    }
    if let Some(key_path) = &tls.key_path {
        builder.set_private_key_file(key_path, SslFiletype::PEM)?;
    }
    if !tls.verify {
        builder.set_verify(SslVerifyMode::NONE);
    }
    let domain = url.host_str().unwrap_or_default();
    let stream = builder
        .build()
        .connect(domain, tcp)
        .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
    Ok(Stream::Tls(stream))
}

impl Connection {
    pub(crate) fn connect_with(url: &Url, options: &ConnectionOptions) -> Result<Self, CacheError> {
        let mut stream = Self::open_stream(url, options)?;
        stream.set_read_timeout(options.read_timeout)?;
        stream.set_write_timeout(options.write_timeout)?;

        let protocol = match options.protocol {
            ProtocolKind::Binary => Protocol::Binary(BinaryProtocol::new(stream)),
            ProtocolKind::Ascii => Protocol::Ascii(AsciiProtocol::new(stream)),
        };
        debug!("connected to {} ({:?} protocol)", url, options.protocol);
        Ok(Connection {
            protocol,
            url: url.to_string(),
            broken: false,
        })
    }

    /// Run one request. Any failure other than a command status may leave part
    /// of a reply unread, so the connection is marked broken and the pool drops it.
    pub(crate) fn run<T, F>(&mut self, request: F) -> Result<T, CacheError>
    where
        F: FnOnce(&mut Protocol) -> Result<T, CacheError>,
    {
        let result = request(&mut self.protocol);
        if let Err(ref err) = result {
            if err.command_error().is_none() {
                warn!("dropping connection to {} after error: {}", self.url, err);
                self.broken = true;
            }
        }
        result
    }

    fn open_stream(url: &Url, options: &ConnectionOptions) -> Result<Stream, CacheError> {
        #[cfg(unix)]
        {
            if url.host_str().map_or(true, str::is_empty) && !url.path().is_empty() && url.path() != "/" {
                return Ok(Stream::Unix(UnixStream::connect(url.path())?));
            }
        }
        let tcp = tcp_stream(url, options)?;
        #[cfg(feature = "tls")]
        {
            if let Some(tls) = &options.tls {
                return tls_stream(url, tcp, tls);
            }
        }
        Ok(Stream::Tcp(tcp))
    }
}

/// Opens and health-checks connections for the client's pool.
///
/// Options are shared with the client, so timeouts changed at runtime also
/// apply to connections opened later.
#[derive(Debug)]
pub struct ConnectionManager {
    url: Url,
    options: Arc<RwLock<ConnectionOptions>>,
}

impl ConnectionManager {
    pub fn with_options(url: Url, options: ConnectionOptions) -> Self {
        ConnectionManager {
            url,
            options: Arc::new(RwLock::new(options)),
        }
    }

    pub(crate) fn shared_options(&self) -> Arc<RwLock<ConnectionOptions>> {
        Arc::clone(&self.options)
    }
}

impl r2d2::ManageConnection for ConnectionManager {
    type Connection = Connection;
    type Error = CacheError;

    fn connect(&self) -> Result<Connection, CacheError> {
        let options = self.options.read().unwrap_or_else(PoisonError::into_inner).clone();
        Connection::connect_with(&self.url, &options)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), CacheError> {
        conn.run(|protocol| protocol.version()).map(|_| ())
    }

    fn has_broken(&self, conn: &mut Connection) -> bool {
        conn.broken
    }
}
