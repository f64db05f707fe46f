use std::borrow::Cow;
use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CacheError, CommandError, ServerError};
use crate::value::FromMemcacheValue;

const OK_STATUS: u16 = 0x0;
#[cfg(test)]
pub(crate) const HEADER_LENGTH: usize = 24;

pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Delete = 0x04,
    Flush = 0x08,
    Version = 0x0b,
    Touch = 0x1c,
}

pub enum Magic {
    Request = 0x80,
    Response = 0x81,
}

#[derive(Debug, Default, PartialEq)]
pub struct PacketHeader {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    pub vbucket_id_or_status: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

/// Extras of a Set request: item flags, then expiration in seconds.
#[derive(Debug)]
pub struct StoreExtras {
    pub flags: u32,
    pub expiration: u32,
}

impl PacketHeader {
    /// Header for a request carrying `key`, `extras_length` bytes of extras and
    /// `value_length` bytes of value.
    pub fn request(opcode: Opcode, key: &str, extras_length: u8, value_length: usize) -> PacketHeader {
        PacketHeader {
            magic: Magic::Request as u8,
            opcode: opcode as u8,
            key_length: key.len() as u16,
            extras_length,
            total_body_length: (usize::from(extras_length) + key.len() + value_length) as u32,
            ..Default::default()
        }
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        writer.write_u8(self.magic)?;
        writer.write_u8(self.opcode)?;
        writer.write_u16::<BigEndian>(self.key_length)?;
        writer.write_u8(self.extras_length)?;
        writer.write_u8(self.data_type)?;
        writer.write_u16::<BigEndian>(self.vbucket_id_or_status)?;
        writer.write_u32::<BigEndian>(self.total_body_length)?;
        writer.write_u32::<BigEndian>(self.opaque)?;
        writer.write_u64::<BigEndian>(self.cas)?;
        Ok(())
    }

    pub fn read<R: io::Read>(reader: &mut R) -> Result<PacketHeader, CacheError> {
        let magic = reader.read_u8()?;
        if magic != Magic::Response as u8 {
            return Err(ServerError::BadMagic(magic).into());
        }
        let header = PacketHeader {
            magic,
            opcode: reader.read_u8()?,
            key_length: reader.read_u16::<BigEndian>()?,
            extras_length: reader.read_u8()?,
            data_type: reader.read_u8()?,
            vbucket_id_or_status: reader.read_u16::<BigEndian>()?,
            total_body_length: reader.read_u32::<BigEndian>()?,
            opaque: reader.read_u32::<BigEndian>()?,
            cas: reader.read_u64::<BigEndian>()?,
        };
        Ok(header)
    }
}

pub struct Response {
    header: PacketHeader,
    extras: Vec<u8>,
    value: Vec<u8>,
}

impl Response {
    pub(crate) fn err(self) -> Result<Self, CacheError> {
        let status = self.header.vbucket_id_or_status;
        if status == OK_STATUS {
            Ok(self)
        } else {
            Err(CommandError::from(status))?
        }
    }
}

/// Read one response and check it answers `request`. A mismatch means the
/// stream is out of step and the connection cannot be trusted any more.
pub fn parse_response<R: io::Read>(reader: &mut R, request: &PacketHeader) -> Result<Response, CacheError> {
    let header = PacketHeader::read(reader)?;
    if header.opcode != request.opcode || header.opaque != request.opaque {
        return Err(ServerError::BadResponse(Cow::Owned(format!(
            "response (opcode {:#04x}, opaque {}) does not answer request (opcode {:#04x}, opaque {})",
            header.opcode, header.opaque, request.opcode, request.opaque
        )))
        .into());
    }
    let fixed = u32::from(header.key_length) + u32::from(header.extras_length);
    if header.total_body_length < fixed {
        return Err(ServerError::BadResponse(Cow::Borrowed(
            "total body length is shorter than key and extras",
        ))
        .into());
    }

    let mut extras = vec![0x0; header.extras_length as usize];
    reader.read_exact(extras.as_mut_slice())?;

    // responses never carry a key for the opcodes in use, skip it if present
    let mut key = vec![0x0; header.key_length as usize];
    reader.read_exact(key.as_mut_slice())?;

    let mut value = vec![0x0; (header.total_body_length - fixed) as usize];
    reader.read_exact(value.as_mut_slice())?;

    Ok(Response { header, extras, value })
}

/// Parse a response that carries no payload of interest.
pub fn parse_ok_response<R: io::Read>(reader: &mut R, request: &PacketHeader) -> Result<(), CacheError> {
    parse_response(reader, request)?.err().map(|_| ())
}

/// Store responses: a refused write is `false`, everything else unexpected is an error.
pub fn parse_store_response<R: io::Read>(reader: &mut R, request: &PacketHeader) -> Result<bool, CacheError> {
    match parse_response(reader, request)?.err() {
        Ok(_) => Ok(true),
        Err(CacheError::Operation(e)) if is_rejected_write(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_rejected_write(err: &crate::error::OperationError) -> bool {
    use crate::error::OperationError::Command;
    matches!(
        err,
        Command(CommandError::ItemNotStored) | Command(CommandError::KeyExists) | Command(CommandError::ValueTooLarge)
    )
}

pub fn parse_version_response<R: io::Read>(reader: &mut R, request: &PacketHeader) -> Result<String, CacheError> {
    let Response { value, .. } = parse_response(reader, request)?.err()?;
    Ok(String::from_utf8(value)?)
}

pub fn parse_get_response<R: io::Read, V: FromMemcacheValue>(reader: &mut R, request: &PacketHeader) -> Result<Option<V>, CacheError> {
    match parse_response(reader, request)?.err() {
        Ok(Response { extras, value, .. }) => {
            let flags = Cursor::new(extras).read_u32::<BigEndian>()?;
            Ok(Some(FromMemcacheValue::from_memcache_value(value, flags)?))
        }
        Err(CacheError::Operation(crate::error::OperationError::Command(CommandError::KeyNotFound))) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Delete and touch share the same shape: success is `true`, a missing key is `false`.
pub fn parse_exists_response<R: io::Read>(reader: &mut R, request: &PacketHeader) -> Result<bool, CacheError> {
    match parse_response(reader, request)?.err() {
        Ok(_) => Ok(true),
        Err(CacheError::Operation(crate::error::OperationError::Command(CommandError::KeyNotFound))) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &str) -> Cursor<Vec<u8>> {
        Cursor::new(hex::decode(input).expect("Decoding failed"))
    }

    fn request(opcode: Opcode) -> PacketHeader {
        PacketHeader::request(opcode, "myKey", 0, 0)
    }

    #[test]
    fn write_get_request_header() {
        let header = PacketHeader::request(Opcode::Get, "myKey", 0, 0);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LENGTH);
        assert_eq!(
            hex::encode(buf),
            "800000050000000000000005000000000000000000000000"
        );
    }

    #[test]
    fn set_request_counts_extras_in_body_length() {
        let header = PacketHeader::request(Opcode::Set, "myKey", 8, 16);
        assert_eq!(header.total_body_length, 8 + 5 + 16);
        assert_eq!(header.extras_length, 8);
    }

    #[test]
    fn read_rejects_bad_magic() {
        let err = PacketHeader::read(&mut reader("800000000000000000000000000000000000000000000000")).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Operation(crate::error::OperationError::Server(ServerError::BadMagic(0x80)))
        ));
    }

    #[test]
    fn get_hit_decodes_flags_and_value() {
        // Get response, 4 bytes of extras (flags = 0), value "bar"
        let mut r = reader("81000000040000000000000700000000000000000000000100000000626172");
        let value: Option<(Vec<u8>, u32)> = parse_get_response(&mut r, &request(Opcode::Get)).unwrap();
        assert_eq!(value, Some((b"bar".to_vec(), 0)));
    }

    #[test]
    fn get_miss_is_none() {
        // status 0x0001 with "Not found" body
        let mut r = reader("8100000000000001000000090000000000000000000000004e6f7420666f756e64");
        let value: Option<String> = parse_get_response(&mut r, &request(Opcode::Get)).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn store_rejections_are_false() {
        // status 0x0005 item not stored
        let mut r = reader("810100000000000500000000000000000000000000000000");
        assert!(!parse_store_response(&mut r, &request(Opcode::Set)).unwrap());
        // status 0x0000
        let mut r = reader("810100000000000000000000000000000000000000000001");
        assert!(parse_store_response(&mut r, &request(Opcode::Set)).unwrap());
    }

    #[test]
    fn delete_missing_key_is_false() {
        let mut r = reader("810400000000000100000000000000000000000000000000");
        assert!(!parse_exists_response(&mut r, &request(Opcode::Delete)).unwrap());
    }

    #[test]
    fn body_shorter_than_extras_is_rejected() {
        let mut r = reader("810000000400000000000002000000000000000000000000");
        assert!(parse_response(&mut r, &request(Opcode::Get)).is_err());
    }

    #[test]
    fn reply_to_another_request_is_rejected() {
        // a Delete "not found" reply read while waiting for a Get
        let mut r = reader("810400000000000100000000000000000000000000000000");
        let err = parse_get_response::<_, String>(&mut r, &request(Opcode::Get)).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Operation(crate::error::OperationError::Server(ServerError::BadResponse(_)))
        ));

        // right opcode, stale opaque
        let mut r = reader("810400000000000100000000000000070000000000000000");
        let mut delete = request(Opcode::Delete);
        delete.opaque = 8;
        assert!(parse_exists_response(&mut r, &delete).is_err());
    }
}
