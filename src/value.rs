use std::borrow::Cow;
use std::str::FromStr;

use crate::error::CacheError;

/// Encoding marker stored in the item's flags word.
pub enum Flags {
    Bytes = 0,
    #[cfg(feature = "json")]
    Json = 2,
}

/// determine how the value is serialize to memcache
///
/// Values are encoded in full before a request is written, so a value that
/// fails to encode never puts a partial command on the wire.
pub trait ToMemcacheValue {
    fn get_flags(&self) -> u32;
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError>;
}

impl<'a> ToMemcacheValue for &'a [u8] {
    fn get_flags(&self) -> u32 {
        Flags::Bytes as u32
    }

    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError> {
        Ok(Cow::Borrowed(*self))
    }
}

impl ToMemcacheValue for Vec<u8> {
    fn get_flags(&self) -> u32 {
        Flags::Bytes as u32
    }

    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

impl ToMemcacheValue for String {
    fn get_flags(&self) -> u32 {
        Flags::Bytes as u32
    }

    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl<'a> ToMemcacheValue for &'a String {
    fn get_flags(&self) -> u32 {
        Flags::Bytes as u32
    }

    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl<'a> ToMemcacheValue for &'a str {
    fn get_flags(&self) -> u32 {
        Flags::Bytes as u32
    }

    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

macro_rules! impl_to_memcache_value_for_number {
    ($ty:ident) => {
        impl ToMemcacheValue for $ty {
            fn get_flags(&self) -> u32 {
                Flags::Bytes as u32
            }

            fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError> {
                Ok(Cow::Owned(self.to_string().into_bytes()))
            }
        }
    };
}

impl_to_memcache_value_for_number!(bool);
impl_to_memcache_value_for_number!(u8);
impl_to_memcache_value_for_number!(u16);
impl_to_memcache_value_for_number!(u32);
impl_to_memcache_value_for_number!(u64);
impl_to_memcache_value_for_number!(i8);
impl_to_memcache_value_for_number!(i16);
impl_to_memcache_value_for_number!(i32);
impl_to_memcache_value_for_number!(i64);
impl_to_memcache_value_for_number!(f32);
impl_to_memcache_value_for_number!(f64);

type MemcacheValue<T> = Result<T, CacheError>;

/// determine how the value is unserialize to memcache
pub trait FromMemcacheValue: Sized {
    fn from_memcache_value(value: Vec<u8>, flags: u32) -> MemcacheValue<Self>;
}

impl FromMemcacheValue for (Vec<u8>, u32) {
    fn from_memcache_value(value: Vec<u8>, flags: u32) -> MemcacheValue<Self> {
        Ok((value, flags))
    }
}

impl FromMemcacheValue for Vec<u8> {
    fn from_memcache_value(value: Vec<u8>, _: u32) -> MemcacheValue<Self> {
        Ok(value)
    }
}

impl FromMemcacheValue for String {
    fn from_memcache_value(value: Vec<u8>, _: u32) -> MemcacheValue<Self> {
        Ok(String::from_utf8(value)?)
    }
}

macro_rules! impl_from_memcache_value_for_number {
    ($ty:ident) => {
        impl FromMemcacheValue for $ty {
            fn from_memcache_value(value: Vec<u8>, _: u32) -> MemcacheValue<Self> {
                let s: String = FromMemcacheValue::from_memcache_value(value, 0)?;
                Ok(Self::from_str(s.as_str())?)
            }
        }
    };
}

impl_from_memcache_value_for_number!(bool);
impl_from_memcache_value_for_number!(u8);
impl_from_memcache_value_for_number!(u16);
impl_from_memcache_value_for_number!(u32);
impl_from_memcache_value_for_number!(u64);
impl_from_memcache_value_for_number!(i8);
impl_from_memcache_value_for_number!(i16);
impl_from_memcache_value_for_number!(i32);
impl_from_memcache_value_for_number!(i64);
impl_from_memcache_value_for_number!(f32);
impl_from_memcache_value_for_number!(f64);

/// A value stored as JSON, marked with [`Flags::Json`].
///
/// ```rust,no_run
/// use memcache_demo::{Client, Json};
///
/// let client = Client::connect("memcache://localhost:11211").unwrap();
/// client.set("point", Json(vec![1, 2, 3]), 60).unwrap();
/// let point: Option<Json<Vec<i32>>> = client.get("point").unwrap();
/// assert_eq!(point.unwrap().0, vec![1, 2, 3]);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

#[cfg(feature = "json")]
impl<T: serde::Serialize> ToMemcacheValue for Json<T> {
    fn get_flags(&self) -> u32 {
        Flags::Json as u32
    }

    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CacheError> {
        Ok(Cow::Owned(serde_json::to_vec(&self.0)?))
    }
}

#[cfg(feature = "json")]
impl<T: serde::de::DeserializeOwned> FromMemcacheValue for Json<T> {
    fn from_memcache_value(value: Vec<u8>, _: u32) -> MemcacheValue<Self> {
        Ok(Json(serde_json::from_slice(&value)?))
    }
}
