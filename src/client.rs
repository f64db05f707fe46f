use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::debug;
use r2d2::{Pool, PooledConnection};
use url::Url;

use crate::connection::{ConnectionManager, ConnectionOptions, ProtocolKind};
use crate::error::CacheError;
use crate::protocol::{check_key, Protocol, ProtocolTrait};
use crate::value::{FromMemcacheValue, ToMemcacheValue};

/// Anything that names a single memcached server.
pub trait Connectable {
    fn get_url(self) -> Result<Url, CacheError>;
}

impl Connectable for Url {
    fn get_url(self) -> Result<Url, CacheError> {
        Ok(self)
    }
}

impl Connectable for &str {
    fn get_url(self) -> Result<Url, CacheError> {
        Ok(Url::parse(self)?)
    }
}

impl Connectable for String {
    fn get_url(self) -> Result<Url, CacheError> {
        self.as_str().get_url()
    }
}

impl Connectable for (&str, u16) {
    fn get_url(self) -> Result<Url, CacheError> {
        let (host, port) = self;
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        format!("memcache://{}:{}", host, port).as_str().get_url()
    }
}

/// A blocking client bound to one memcached server.
///
/// The client owns its connection. Once [`Client::close`] has been called every
/// operation fails with [`CacheError::ConnectionClosed`].
pub struct Client {
    pool: Option<Pool<ConnectionManager>>,
    options: Arc<RwLock<ConnectionOptions>>,
    url: String,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect to the server named by `target`.
    ///
    /// Example:
    ///
    /// ```rust,no_run
    /// let client = memcache_demo::Client::connect("memcache://localhost:11211").unwrap();
    /// let client = memcache_demo::Client::connect(("localhost", 11211)).unwrap();
    /// ```
    pub fn connect<C: Connectable>(target: C) -> Result<Self, CacheError> {
        ClientBuilder::new().server(target)?.build()
    }

    fn connection(&self) -> Result<PooledConnection<ConnectionManager>, CacheError> {
        let pool = self.pool.as_ref().ok_or(CacheError::ConnectionClosed)?;
        Ok(pool.get()?)
    }

    fn run<T, F>(&self, request: F) -> Result<T, CacheError>
    where
        F: FnOnce(&mut Protocol) -> Result<T, CacheError>,
    {
        self.connection()?.run(request)
    }

    /// Set the socket read timeout for TCP connections. Also applies to
    /// connections the client opens later.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        self.options.write().unwrap_or_else(PoisonError::into_inner).read_timeout = timeout;
        conn.run(|protocol| protocol.stream().set_read_timeout(timeout))
    }

    /// Set the socket write timeout for TCP connections. Also applies to
    /// connections the client opens later.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        self.options.write().unwrap_or_else(PoisonError::into_inner).write_timeout = timeout;
        conn.run(|protocol| protocol.stream().set_write_timeout(timeout))
    }

    /// Get the memcached server version.
    ///
    /// Example:
    ///
    /// ```rust,no_run
    /// let client = memcache_demo::Client::connect("memcache://localhost:11211").unwrap();
    /// println!("{}", client.version().unwrap());
    /// ```
    pub fn version(&self) -> Result<String, CacheError> {
        self.run(|protocol| protocol.version())
    }

    /// Flush all cache on memcached server immediately.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.run(|protocol| protocol.flush())
    }

    /// Get a key from memcached server. `None` when the key was never set,
    /// has expired, or was deleted.
    ///
    /// Example:
    ///
    /// ```rust,no_run
    /// let client = memcache_demo::Client::connect("memcache://localhost:11211").unwrap();
    /// let value: Option<String> = client.get("myKey").unwrap();
    /// ```
    pub fn get<V: FromMemcacheValue>(&self, key: &str) -> Result<Option<V>, CacheError> {
        check_key(key)?;
        self.run(|protocol| protocol.get(key))
    }

    /// Set a key with associate value into memcached server with expiration seconds.
    ///
    /// Returns `false` when the server refuses to store the item.
    ///
    /// Example:
    ///
    /// ```rust,no_run
    /// let client = memcache_demo::Client::connect("memcache://localhost:11211").unwrap();
    /// assert!(client.set("myKey", "Hello from Java!", 60).unwrap());
    /// ```
    pub fn set<V: ToMemcacheValue>(&self, key: &str, value: V, expiration: u32) -> Result<bool, CacheError> {
        check_key(key)?;
        self.run(|protocol| protocol.set(key, value, expiration))
    }

    /// Delete a key from memcached server. `false` when there was nothing to delete.
    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        check_key(key)?;
        self.run(|protocol| protocol.delete(key))
    }

    /// Set a new expiration time for an existing key. `false` when the key is absent.
    pub fn touch(&self, key: &str, expiration: u32) -> Result<bool, CacheError> {
        check_key(key)?;
        self.run(|protocol| protocol.touch(key, expiration))
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.pool.take().is_some() {
            debug!("closed client for {}", self.url);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_none()
    }
}

pub struct ClientBuilder {
    url: Option<Url>,
    options: Option<ConnectionOptions>,
    protocol: Option<ProtocolKind>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Create an empty client builder.
    pub fn new() -> Self {
        ClientBuilder {
            url: None,
            options: None,
            protocol: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Set the server to talk to. Its url parameters are validated here.
    pub fn server<C: Connectable>(mut self, target: C) -> Result<Self, CacheError> {
        let url = target.get_url()?;
        self.options = Some(ConnectionOptions::from_url(&url)?);
        self.url = Some(url);
        Ok(self)
    }

    /// Override the wire protocol chosen by the url.
    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Set the bound on establishing a connection.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the socket read timeout for TCP connections.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the socket write timeout for TCP connections.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Open the connection. Fails if the server cannot be reached within the
    /// connection timeout.
    pub fn build(self) -> Result<Client, CacheError> {
        let (url, mut options) = match (self.url, self.options) {
            (Some(url), Some(options)) => (url, options),
            _ => Err(crate::error::ConnectionError::Target("no server configured".into()))?,
        };
        if let Some(protocol) = self.protocol {
            options.protocol = protocol;
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = timeout;
        }
        if self.read_timeout.is_some() {
            options.read_timeout = self.read_timeout;
        }
        if self.write_timeout.is_some() {
            options.write_timeout = self.write_timeout;
        }

        let connect_timeout = options.connect_timeout;
        debug!("connecting to {} with {:?}", url, options);
        let manager = ConnectionManager::with_options(url.clone(), options);
        let shared_options = manager.shared_options();
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(connect_timeout)
            .build(manager)?;
        Ok(Client {
            pool: Some(pool),
            options: shared_options,
            url: url.to_string(),
        })
    }
}
