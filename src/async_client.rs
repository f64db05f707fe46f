use std::time::Duration;

use crate::client::{self as blocking, Connectable};
use crate::error::CacheError;
use crate::value::{FromMemcacheValue, ToMemcacheValue};

/// Future-returning face of [`blocking::Client`].
///
/// Each call runs the request on the calling task, so awaiting one call at a
/// time keeps the operations in order.
pub struct AsyncClient {
    inner: blocking::Client,
}

impl From<blocking::Client> for AsyncClient {
    fn from(client: blocking::Client) -> Self {
        Self { inner: client }
    }
}

impl AsyncClient {
    pub fn builder() -> blocking::ClientBuilder {
        blocking::ClientBuilder::new()
    }

    pub fn connect<C: Connectable>(target: C) -> Result<Self, CacheError> {
        Ok(blocking::Client::connect(target)?.into())
    }

    /// Get a reference to the inner `Client` object.
    /// This will allow you to call methods on the `Client` object synchronously.
    ///
    /// Example:
    ///
    /// ```rust,no_run
    /// let client = memcache_demo::AsyncClient::connect("memcache://localhost:11211").unwrap();
    /// let blocking_client = client.blocking();
    /// let _: Option<String> = blocking_client.get("foo").unwrap();
    /// ```
    pub fn blocking(&self) -> &blocking::Client {
        &self.inner
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), CacheError> {
        self.inner.set_read_timeout(timeout)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<(), CacheError> {
        self.inner.set_write_timeout(timeout)
    }

    pub async fn version(&self) -> Result<String, CacheError> {
        self.inner.version()
    }

    pub async fn flush(&self) -> Result<(), CacheError> {
        self.inner.flush()
    }

    /// Get a key from memcached server.
    ///
    /// Example:
    ///
    /// ```rust,no_run
    /// # async fn demo() {
    /// let client = memcache_demo::AsyncClient::connect("memcache://localhost:11211").unwrap();
    /// let value: Option<String> = client.get("myKey").await.unwrap();
    /// # }
    /// ```
    pub async fn get<V: FromMemcacheValue>(&self, key: &str) -> Result<Option<V>, CacheError> {
        self.inner.get(key)
    }

    /// Set a key with associate value into memcached server with expiration seconds.
    pub async fn set<V: ToMemcacheValue>(
        &self,
        key: &str,
        value: V,
        expiration: u32,
    ) -> Result<bool, CacheError> {
        self.inner.set(key, value, expiration)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key)
    }

    pub async fn touch(&self, key: &str, expiration: u32) -> Result<bool, CacheError> {
        self.inner.touch(key, expiration)
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
