use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::CacheError;

#[cfg(feature = "tls")]
use openssl::ssl::SslStream;

/// The transport a connection talks over.
///
/// Timeouts and shutdown act on the underlying socket, so they also apply
/// beneath a TLS session.
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "tls")]
    Tls(SslStream<TcpStream>),
}

impl Stream {
    pub(crate) fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), CacheError> {
        match self {
            Stream::Tcp(ref mut conn) => conn.set_read_timeout(timeout)?,
            #[cfg(unix)]
            Stream::Unix(ref mut conn) => conn.set_read_timeout(timeout)?,
            #[cfg(feature = "tls")]
            Stream::Tls(ref mut stream) => stream.get_ref().set_read_timeout(timeout)?,
        }
        Ok(())
    }

    pub(crate) fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), CacheError> {
        match self {
            Stream::Tcp(ref mut conn) => conn.set_write_timeout(timeout)?,
            #[cfg(unix)]
            Stream::Unix(ref mut conn) => conn.set_write_timeout(timeout)?,
            #[cfg(feature = "tls")]
            Stream::Tls(ref mut stream) => stream.get_ref().set_write_timeout(timeout)?,
        }
        Ok(())
    }

    /// Shut down both halves of the socket. Errors are ignored since the
    /// peer may already have gone away.
    pub(crate) fn shutdown(&mut self) {
        let _ = match self {
            Stream::Tcp(ref mut conn) => conn.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(ref mut conn) => conn.shutdown(Shutdown::Both),
            #[cfg(feature = "tls")]
            Stream::Tls(ref mut stream) => {
                let _ = stream.shutdown();
                stream.get_ref().shutdown(Shutdown::Both)
            }
        };
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Tcp(conn) => write!(f, "Tcp({:?})", conn.peer_addr().ok()),
            #[cfg(unix)]
            Stream::Unix(conn) => write!(f, "Unix({:?})", conn.peer_addr().ok()),
            #[cfg(feature = "tls")]
            Stream::Tls(stream) => write!(f, "Tls({:?})", stream.get_ref().peer_addr().ok()),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(ref mut stream) => stream.read(buf),
            #[cfg(unix)]
            Stream::Unix(ref mut stream) => stream.read(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(ref mut stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(ref mut stream) => stream.write(buf),
            #[cfg(unix)]
            Stream::Unix(ref mut stream) => stream.write(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(ref mut stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(ref mut stream) => stream.flush(),
            #[cfg(unix)]
            Stream::Unix(ref mut stream) => stream.flush(),
            #[cfg(feature = "tls")]
            Stream::Tls(ref mut stream) => stream.flush(),
        }
    }
}
