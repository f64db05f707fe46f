/*!
memcache-demo stores, reads back and deletes a key on a [memcached](https://memcached.org/)
server, on top of a small single-server client.

# Features:

- <input type="checkbox"  disabled checked /> Both memcached protocols
  - <input type="checkbox"  disabled checked /> Binary protocol
  - <input type="checkbox"  disabled checked /> ASCII protocol
- <input type="checkbox"  disabled checked /> Connections
  - <input type="checkbox"  disabled checked /> TCP connection
  - <input type="checkbox"  disabled checked/> UNIX Domain socket connection
  - <input type="checkbox"  disabled checked/> TLS connection (`tls` feature)
- <input type="checkbox"  disabled checked /> Typed values, JSON through serde (`json` feature)
- <input type="checkbox"  disabled checked /> Blocking and `async` interfaces

# Basic usage:

```rust,no_run
// create connection with to memcached server node:
let mut client = memcache_demo::connect("memcache://127.0.0.1:11211?timeout=10&tcp_nodelay=true").unwrap();

// set a string value for one minute:
assert!(client.set("myKey", "Hello from Java!", 60).unwrap());

// retrieve from memcached:
let value: Option<String> = client.get("myKey").unwrap();
assert_eq!(value.as_deref(), Some("Hello from Java!"));

// delete value:
assert!(client.delete("myKey").unwrap());
assert_eq!(client.get::<String>("myKey").unwrap(), None);

// release the connection, any further call fails:
client.close();
assert!(client.get::<String>("myKey").is_err());
```
!*/

mod async_client;
mod client;
pub mod config;
mod connection;
mod error;
mod protocol;
pub mod scenario;
mod stream;
mod value;

pub use crate::async_client::AsyncClient;
pub use crate::client::{Client, ClientBuilder, Connectable};
pub use crate::connection::{ConnectionManager, ConnectionOptions, ProtocolKind, DEFAULT_CONNECT_TIMEOUT};
pub use crate::error::{
    CacheError, ClientError, CommandError, ConnectionError, OperationError, ServerError,
};
pub use crate::protocol::MAX_KEY_LENGTH;
#[cfg(feature = "json")]
pub use crate::value::Json;
pub use crate::value::{FromMemcacheValue, ToMemcacheValue};
pub use url::{ParseError as UrlParseError, Url};

/// Create a memcached client instance and connect to memcached server.
///
/// Example:
///
/// ```rust,no_run
/// let client = memcache_demo::connect("memcache://localhost:11211").unwrap();
/// ```
pub fn connect<C: Connectable>(target: C) -> Result<Client, CacheError> {
    Client::connect(target)
}
