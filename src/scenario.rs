//! The scripted set / get / delete / verify sequence and its report.

use std::io::Write;

use log::debug;

use crate::async_client::AsyncClient;
use crate::error::CacheError;

/// One entry to write, read back, and remove.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub key: String,
    pub ttl: u32,
    pub value: String,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            key: String::from("myKey"),
            ttl: 60,
            value: String::from("Hello from Java!"),
        }
    }
}

impl Scenario {
    /// Run the sequence against `client`, writing one report line per step to `out`.
    ///
    /// Stops at the first error; the caller owns the client and closes it.
    pub async fn run<W: Write>(&self, client: &AsyncClient, out: &mut W) -> Result<(), CacheError> {
        let key = self.key.as_str();

        debug!("storing {:?} for {}s", key, self.ttl);
        if client.set(key, self.value.as_str(), self.ttl).await? {
            writeln!(out, "Set '{}'", key)?;
        } else {
            writeln!(out, "Failed to set '{}'", key)?;
        }

        match client.get::<String>(key).await? {
            Some(value) => writeln!(out, "Got '{}': {}", key, value)?,
            None => writeln!(out, "'{}' not found.", key)?,
        }

        if client.delete(key).await? {
            writeln!(out, "Deleted '{}'", key)?;
        } else {
            writeln!(out, "Failed to delete '{}' (or key didn't exist).", key)?;
        }

        if client.get::<String>(key).await?.is_none() {
            writeln!(out, "'{}' is successfully deleted.", key)?;
        }
        Ok(())
    }
}
