use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};

use log::trace;

use super::ProtocolTrait;
use crate::error::{CacheError, ClientError, CommandError, ServerError};
use crate::stream::Stream;
use crate::value::{FromMemcacheValue, ToMemcacheValue};

const END: &str = "END\r\n";
const LINE_CAPACITY: usize = 2048;
/// memcached refuses to raise its item size limit (`-I`) past 1 GiB.
const MAX_VALUE_LENGTH: usize = 1024 * 1024 * 1024;

enum StoreCommand {
    Set,
}

impl fmt::Display for StoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StoreCommand::Set => write!(f, "set"),
        }
    }
}

/// Buffered reader that refuses lines longer than its fixed buffer, so a
/// misbehaving server cannot make the client allocate without bound.
struct CappedLineReader<C> {
    inner: C,
    filled: usize,
    buf: [u8; LINE_CAPACITY],
}

fn get_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n").map(|i| i + 2)
}

impl<C: Read> CappedLineReader<C> {
    fn new(inner: C) -> Self {
        Self {
            inner,
            filled: 0,
            buf: [0x0; LINE_CAPACITY],
        }
    }

    fn get_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CacheError> {
        let min = std::cmp::min(buf.len(), self.filled);
        let (to_fill, rest) = buf.split_at_mut(min);
        to_fill.copy_from_slice(&self.buf[..min]);
        self.consume(min);
        if !rest.is_empty() {
            self.inner.read_exact(rest)?;
        }
        Ok(())
    }

    /// Read one CRLF terminated line and hand it to `cb`. The line must fit
    /// in the internal buffer, which is plenty for status and header lines.
    fn read_line<T, F>(&mut self, mut cb: F) -> Result<T, CacheError>
    where
        F: FnMut(&str) -> Result<T, CacheError>,
    {
        let mut scanned: usize = 0;
        loop {
            // a CRLF may straddle two reads, so rescan the last byte of the previous chunk
            if let Some(n) = get_line(&self.buf[scanned.saturating_sub(1)..self.filled]) {
                let n = scanned.saturating_sub(1) + n;
                let result = cb(std::str::from_utf8(&self.buf[..n])?);
                self.consume(n);
                return result;
            }
            scanned = self.filled;
            if self.filled == self.buf.len() {
                return Err(ClientError::Error(Cow::Borrowed("ascii protocol response line too long")))?;
            }
            let read = self.inner.read(&mut self.buf[self.filled..])?;
            if read == 0 {
                return Err(ServerError::BadResponse(Cow::Borrowed("connection closed before end of line")))?;
            }
            self.filled += read;
        }
    }

    fn consume(&mut self, amount: usize) {
        let amount = std::cmp::min(self.filled, amount);
        self.buf.copy_within(amount..self.filled, 0);
        self.filled -= amount;
    }
}

/// Memcached text protocol.
pub struct AsciiProtocol<C: Read + Write + Sized> {
    reader: CappedLineReader<C>,
}

impl<C: Read + Write> AsciiProtocol<C> {
    pub(crate) fn new(stream: C) -> Self {
        Self {
            reader: CappedLineReader::new(stream),
        }
    }

    fn store<V: ToMemcacheValue>(
        &mut self,
        command: StoreCommand,
        key: &str,
        value: V,
        exptime: u32,
    ) -> Result<bool, CacheError> {
        let bytes = value.to_bytes()?;
        trace!("ascii {} {} ({} bytes, ttl {})", command, key, bytes.len(), exptime);
        write!(
            self.reader.get_mut(),
            "{command} {key} {flags} {exptime} {vlen}\r\n",
            command = command,
            key = key,
            flags = value.get_flags(),
            exptime = exptime,
            vlen = bytes.len(),
        )?;
        self.reader.get_mut().write_all(&bytes)?;
        self.reader.get_mut().write_all(b"\r\n")?;
        self.reader.get_mut().flush()?;

        self.reader.read_line(|response| match CacheError::try_from(response) {
            Ok("STORED\r\n") => Ok(true),
            Ok("NOT_STORED\r\n") => Ok(false),
            Ok(response) => Err(ServerError::BadResponse(Cow::Owned(response.into())))?,
            Err(CacheError::Operation(crate::error::OperationError::Command(
                CommandError::KeyExists | CommandError::ValueTooLarge,
            ))) => Ok(false),
            Err(e) => Err(e),
        })
    }

    fn parse_ok_response(&mut self) -> Result<(), CacheError> {
        self.reader.read_line(|response| {
            let response = CacheError::try_from(response)?;
            if response == "OK\r\n" {
                Ok(())
            } else {
                Err(ServerError::BadResponse(Cow::Owned(response.into())))?
            }
        })
    }

    /// `true` for `expected`, `false` for `NOT_FOUND`.
    fn parse_exists_response(&mut self, expected: &'static str) -> Result<bool, CacheError> {
        self.reader.read_line(|response| match CacheError::try_from(response) {
            Ok(s) if s == expected => Ok(true),
            Ok(s) => Err(ServerError::BadResponse(Cow::Owned(s.into())).into()),
            Err(e) if e.command_error() == Some(&CommandError::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        })
    }

    fn parse_get_response<V: FromMemcacheValue>(&mut self) -> Result<Option<(String, V)>, CacheError> {
        let result = self.reader.read_line(|buf| {
            let buf = CacheError::try_from(buf)?;
            if buf == END {
                return Ok(None);
            }
            if !buf.starts_with("VALUE ") {
                return Err(ServerError::BadResponse(Cow::Owned(buf.into())))?;
            }
            let mut header = buf.trim_end_matches("\r\n").split(' ');
            let mut next_or_err = || {
                header
                    .next()
                    .ok_or_else(|| ServerError::BadResponse(Cow::Owned(buf.into())))
            };
            let _ = next_or_err()?;
            let key = next_or_err()?.to_string();
            let flags: u32 = next_or_err()?.parse()?;
            let length: usize = next_or_err()?.parse()?;
            if length > MAX_VALUE_LENGTH {
                return Err(ServerError::BadResponse(Cow::Owned(format!(
                    "value of {} bytes exceeds the largest memcached item",
                    length
                ))))?;
            }
            // a trailing cas unique is tolerated
            Ok(Some((key, flags, length)))
        })?;
        match result {
            Some((key, flags, length)) => {
                let mut value = vec![0u8; length + 2];
                self.reader.read_exact(value.as_mut_slice())?;
                if &value[length..] != b"\r\n" {
                    return Err(ServerError::BadResponse(Cow::Borrowed("value is not terminated by CRLF")))?;
                }
                value.truncate(length);
                let value = FromMemcacheValue::from_memcache_value(value, flags)?;
                Ok(Some((key, value)))
            }
            None => Ok(None),
        }
    }
}

impl<C: Read + Write> AsciiProtocol<C> {
    pub(crate) fn version(&mut self) -> Result<String, CacheError> {
        self.reader.get_mut().write_all(b"version\r\n")?;
        self.reader.get_mut().flush()?;
        self.reader.read_line(|response| {
            let response = CacheError::try_from(response)?;
            match response.strip_prefix("VERSION ") {
                Some(version) => Ok(version.trim_end_matches("\r\n").to_string()),
                None => Err(ServerError::BadResponse(Cow::Owned(response.into())))?,
            }
        })
    }

    pub(crate) fn flush(&mut self) -> Result<(), CacheError> {
        self.reader.get_mut().write_all(b"flush_all\r\n")?;
        self.reader.get_mut().flush()?;
        self.parse_ok_response()
    }

    pub(crate) fn get<V: FromMemcacheValue>(&mut self, key: &str) -> Result<Option<V>, CacheError> {
        trace!("ascii get {}", key);
        write!(self.reader.get_mut(), "get {}\r\n", key)?;
        self.reader.get_mut().flush()?;

        match self.parse_get_response::<V>()? {
            Some((k, v)) => {
                if k != key {
                    Err(ServerError::BadResponse(Cow::Borrowed("key doesn't match in the response")))?
                } else if self.parse_get_response::<Vec<u8>>()?.is_none() {
                    Ok(Some(v))
                } else {
                    Err(ServerError::BadResponse(Cow::Borrowed("expected end of get response")))?
                }
            }
            None => Ok(None),
        }
    }

    pub(crate) fn set<V: ToMemcacheValue>(&mut self, key: &str, value: V, expiration: u32) -> Result<bool, CacheError> {
        self.store(StoreCommand::Set, key, value, expiration)
    }

    pub(crate) fn delete(&mut self, key: &str) -> Result<bool, CacheError> {
        trace!("ascii delete {}", key);
        write!(self.reader.get_mut(), "delete {}\r\n", key)?;
        self.reader.get_mut().flush()?;
        self.parse_exists_response("DELETED\r\n")
    }

    pub(crate) fn touch(&mut self, key: &str, expiration: u32) -> Result<bool, CacheError> {
        write!(self.reader.get_mut(), "touch {} {}\r\n", key, expiration)?;
        self.reader.get_mut().flush()?;
        self.parse_exists_response("TOUCHED\r\n")
    }

    pub(crate) fn stream(&mut self) -> &mut C {
        self.reader.get_mut()
    }
}

impl ProtocolTrait for AsciiProtocol<Stream> {
    fn version(&mut self) -> Result<String, CacheError> {
        AsciiProtocol::version(self)
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        AsciiProtocol::flush(self)
    }

    fn get<V: FromMemcacheValue>(&mut self, key: &str) -> Result<Option<V>, CacheError> {
        AsciiProtocol::get(self, key)
    }

    fn set<V: ToMemcacheValue>(&mut self, key: &str, value: V, expiration: u32) -> Result<bool, CacheError> {
        AsciiProtocol::set(self, key, value, expiration)
    }

    fn delete(&mut self, key: &str) -> Result<bool, CacheError> {
        AsciiProtocol::delete(self, key)
    }

    fn touch(&mut self, key: &str, expiration: u32) -> Result<bool, CacheError> {
        AsciiProtocol::touch(self, key, expiration)
    }

    fn stream(&mut self) -> &mut Stream {
        AsciiProtocol::stream(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;

    /// In-memory duplex: reads come from a canned server reply, writes are recorded.
    struct Scripted {
        reply: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl Scripted {
        fn new(reply: &[u8]) -> Self {
            Scripted {
                reply: Cursor::new(reply.to_vec()),
                sent: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // hand out one byte at a time to exercise line reassembly
            let n = std::cmp::min(1, buf.len());
            self.reply.read(&mut buf[..n])
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn protocol(reply: &[u8]) -> AsciiProtocol<Scripted> {
        AsciiProtocol::new(Scripted::new(reply))
    }

    #[test]
    fn set_writes_command_line_and_data_block() {
        let mut p = protocol(b"STORED\r\n");
        assert!(p.set("myKey", "Hello from Java!", 60).unwrap());
        assert_eq!(p.stream().sent, b"set myKey 0 60 16\r\nHello from Java!\r\n".to_vec());
    }

    #[test]
    fn set_rejections_are_false() {
        assert!(!protocol(b"NOT_STORED\r\n").set("k", "v", 0).unwrap());
        assert!(!protocol(b"SERVER_ERROR object too large for cache\r\n")
            .set("k", "v", 0)
            .unwrap());
    }

    #[test]
    fn get_hit_and_miss() {
        let mut p = protocol(b"VALUE myKey 0 16\r\nHello from Java!\r\nEND\r\n");
        let value: Option<String> = p.get("myKey").unwrap();
        assert_eq!(value.as_deref(), Some("Hello from Java!"));
        assert_eq!(p.stream().sent, b"get myKey\r\n".to_vec());

        let value: Option<String> = protocol(b"END\r\n").get("myKey").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn get_value_may_contain_crlf() {
        let mut p = protocol(b"VALUE k 5 4\r\na\r\nb\r\nEND\r\n");
        let value: Option<(Vec<u8>, u32)> = p.get("k").unwrap();
        assert_eq!(value, Some((b"a\r\nb".to_vec(), 5)));
    }

    #[test]
    fn get_rejects_mismatched_key() {
        let mut p = protocol(b"VALUE other 0 1\r\nx\r\nEND\r\n");
        assert!(p.get::<String>("k").is_err());
    }

    #[test]
    fn delete_present_and_absent() {
        assert!(protocol(b"DELETED\r\n").delete("k").unwrap());
        assert!(!protocol(b"NOT_FOUND\r\n").delete("k").unwrap());
    }

    #[test]
    fn touch_and_version() {
        assert!(protocol(b"TOUCHED\r\n").touch("k", 10).unwrap());
        assert_eq!(protocol(b"VERSION 1.6.21\r\n").version().unwrap(), "1.6.21");
    }

    #[test]
    fn server_error_is_surfaced() {
        let err = protocol(b"SERVER_ERROR out of memory storing object\r\n")
            .delete("k")
            .unwrap_err();
        assert_eq!(err.command_error(), Some(&CommandError::OutOfMemory));
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut reply = vec![b'x'; LINE_CAPACITY + 10];
        reply.extend_from_slice(b"\r\n");
        let err = protocol(&reply).version().unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn eof_mid_line_is_an_error() {
        assert!(protocol(b"STOR").delete("k").is_err());
    }

    #[test]
    fn absurd_value_length_is_rejected_before_allocating() {
        let err = protocol(format!("VALUE k 0 {}\r\n", usize::MAX).as_bytes())
            .get::<Vec<u8>>("k")
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Operation(crate::error::OperationError::Server(ServerError::BadResponse(_)))
        ));
    }

    #[cfg(feature = "json")]
    #[test]
    fn value_that_fails_to_encode_sends_nothing() {
        let mut by_point = std::collections::BTreeMap::new();
        by_point.insert((1, 2), "a");

        let mut p = protocol(b"");
        assert!(p.set("k", crate::value::Json(by_point), 0).is_err());
        assert!(p.stream().sent.is_empty());
    }
}
