use std::io::{BufWriter, Write};

use byteorder::{BigEndian, WriteBytesExt};
use log::trace;

use super::ProtocolTrait;
use crate::error::CacheError;
use crate::protocol::binary_packet::{self, Opcode, PacketHeader, StoreExtras};
use crate::stream::Stream;
use crate::value::{FromMemcacheValue, ToMemcacheValue};

/// Memcached binary protocol. Requests are assembled in a write buffer and
/// flushed once per command; responses are read straight off the stream.
///
/// Every request carries a fresh `opaque`, and a response echoing anything
/// else is rejected.
pub struct BinaryProtocol {
    stream: BufWriter<Stream>,
    opaque: u32,
}

impl BinaryProtocol {
    pub(crate) fn new(stream: Stream) -> Self {
        BinaryProtocol {
            stream: BufWriter::new(stream),
            opaque: 0,
        }
    }

    fn header(&mut self, opcode: Opcode, key: &str, extras_length: u8, value_length: usize) -> PacketHeader {
        self.opaque = self.opaque.wrapping_add(1);
        PacketHeader {
            opaque: self.opaque,
            ..PacketHeader::request(opcode, key, extras_length, value_length)
        }
    }

    fn send_key_only(&mut self, opcode: Opcode, key: &str) -> Result<PacketHeader, CacheError> {
        let header = self.header(opcode, key, 0, 0);
        header.write(&mut self.stream)?;
        self.stream.write_all(key.as_bytes())?;
        self.stream.flush()?;
        Ok(header)
    }
}

impl ProtocolTrait for BinaryProtocol {
    fn version(&mut self) -> Result<String, CacheError> {
        let request = self.send_key_only(Opcode::Version, "")?;
        binary_packet::parse_version_response(self.stream.get_mut(), &request)
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        let request = self.send_key_only(Opcode::Flush, "")?;
        binary_packet::parse_ok_response(self.stream.get_mut(), &request)
    }

    fn get<V: FromMemcacheValue>(&mut self, key: &str) -> Result<Option<V>, CacheError> {
        trace!("binary get {}", key);
        let request = self.send_key_only(Opcode::Get, key)?;
        binary_packet::parse_get_response(self.stream.get_mut(), &request)
    }

    fn set<V: ToMemcacheValue>(&mut self, key: &str, value: V, expiration: u32) -> Result<bool, CacheError> {
        let bytes = value.to_bytes()?;
        trace!("binary set {} ({} bytes, ttl {})", key, bytes.len(), expiration);
        let extras = StoreExtras {
            flags: value.get_flags(),
            expiration,
        };
        let request = self.header(Opcode::Set, key, 8, bytes.len());
        request.write(&mut self.stream)?;
        self.stream.write_u32::<BigEndian>(extras.flags)?;
        self.stream.write_u32::<BigEndian>(extras.expiration)?;
        self.stream.write_all(key.as_bytes())?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        binary_packet::parse_store_response(self.stream.get_mut(), &request)
    }

    fn delete(&mut self, key: &str) -> Result<bool, CacheError> {
        trace!("binary delete {}", key);
        let request = self.send_key_only(Opcode::Delete, key)?;
        binary_packet::parse_exists_response(self.stream.get_mut(), &request)
    }

    fn touch(&mut self, key: &str, expiration: u32) -> Result<bool, CacheError> {
        let request = self.header(Opcode::Touch, key, 4, 0);
        request.write(&mut self.stream)?;
        self.stream.write_u32::<BigEndian>(expiration)?;
        self.stream.write_all(key.as_bytes())?;
        self.stream.flush()?;
        binary_packet::parse_exists_response(self.stream.get_mut(), &request)
    }

    fn stream(&mut self) -> &mut Stream {
        self.stream.get_mut()
    }
}
