use clap::{Parser, ValueEnum};
use url::Url;

use crate::connection::ProtocolKind;
use crate::error::CacheError;
use crate::scenario::Scenario;

/// Wire protocol accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProtocolArg {
    Binary,
    Ascii,
}

impl From<ProtocolArg> for ProtocolKind {
    fn from(p: ProtocolArg) -> Self {
        match p {
            ProtocolArg::Binary => ProtocolKind::Binary,
            ProtocolArg::Ascii => ProtocolKind::Ascii,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "memcache-demo")]
#[command(about = "Store, read back and delete one key on a memcached server.")]
#[command(version)]
pub struct Settings {
    /// Memcached host
    #[arg(long, env = "MEMCACHED_HOST", default_value = "localhost")]
    pub host: String,

    /// Memcached port
    #[arg(long, env = "MEMCACHED_PORT", default_value_t = 11211)]
    pub port: u16,

    /// Wire protocol
    #[arg(long, env = "MEMCACHED_PROTOCOL", value_enum, default_value_t = ProtocolArg::Binary)]
    pub protocol: ProtocolArg,

    /// Seconds allowed for establishing the connection
    #[arg(long, env = "MEMCACHED_CONNECT_TIMEOUT", default_value_t = 5.0)]
    pub connect_timeout: f64,

    /// Socket read/write timeout in seconds
    #[arg(long, env = "MEMCACHED_TIMEOUT")]
    pub timeout: Option<f64>,

    #[arg(long, env = "MEMCACHED_KEY", default_value = "myKey")]
    pub key: String,

    /// Time-to-live of the stored entry in seconds
    #[arg(long, env = "MEMCACHED_TTL", default_value_t = 60)]
    pub ttl: u32,

    #[arg(long, env = "MEMCACHED_VALUE", default_value = "Hello from Java!")]
    pub value: String,
}

impl Settings {
    /// The `memcache://` url the client connects to.
    pub fn url(&self) -> Result<Url, CacheError> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let mut url = Url::parse(&format!("memcache://{}:{}", host, self.port))?;
        {
            let mut query = url.query_pairs_mut();
            if self.protocol == ProtocolArg::Ascii {
                query.append_pair("protocol", "ascii");
            }
            query.append_pair("connect_timeout", &self.connect_timeout.to_string());
            if let Some(timeout) = self.timeout {
                query.append_pair("timeout", &timeout.to_string());
            }
        }
        Ok(url)
    }

    pub fn scenario(&self) -> Scenario {
        Scenario {
            key: self.key.clone(),
            ttl: self.ttl,
            value: self.value.clone(),
        }
    }
}
