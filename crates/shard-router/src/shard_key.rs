//! Shard keys and their supported kinds.

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The value a call is routed by.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ShardKey {
    /// UTF-8 string key. Hashed before modulo routing.
    Str(String),
    /// Signed 32-bit key.
    I32(i32),
    /// Signed 64-bit key.
    I64(i64),
    /// Unsigned 32-bit key.
    U32(u32),
    /// Unsigned 64-bit key.
    U64(u64),
}

impl ShardKey {
    /// Recovers a shard key from a type-erased value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupport`] if the value is not a `String`, `&str`,
    /// `i32`, `i64`, `u32` or `u64`.
    pub fn from_any(value: &dyn Any) -> Result<Self> {
        if let Some(v) = value.downcast_ref::<String>() {
            return Ok(Self::Str(v.clone()));
        }
        if let Some(v) = value.downcast_ref::<&str>() {
            return Ok(Self::Str((*v).to_string()));
        }
        if let Some(v) = value.downcast_ref::<i32>() {
            return Ok(Self::I32(*v));
        }
        if let Some(v) = value.downcast_ref::<i64>() {
            return Ok(Self::I64(*v));
        }
        if let Some(v) = value.downcast_ref::<u32>() {
            return Ok(Self::U32(*v));
        }
        if let Some(v) = value.downcast_ref::<u64>() {
            return Ok(Self::U64(*v));
        }

        Err(Error::not_support(format!(
            "shard key type is not one of {}",
            ShardKeyKind::ALL.map(ShardKeyKind::as_str).join(", ")
        )))
    }

    /// Returns the kind of this key.
    #[must_use]
    pub const fn kind(&self) -> ShardKeyKind {
        match self {
            Self::Str(_) => ShardKeyKind::String,
            Self::I32(_) => ShardKeyKind::Int32,
            Self::I64(_) => ShardKeyKind::Int64,
            Self::U32(_) => ShardKeyKind::Uint32,
            Self::U64(_) => ShardKeyKind::Uint64,
        }
    }

    /// Maps the key onto `0..len` for modulo routing.
    ///
    /// String keys are hashed with CRC-32 first. Integer keys are reduced as
    /// raw values, so clustered small keys land on low positions.
    /// `len` must be non-zero.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn modulo_index(&self, len: usize) -> usize {
        debug_assert!(len > 0);
        let len = len as u64;

        let index = match self {
            Self::Str(v) => u64::from(crc32fast::hash(v.as_bytes())) % len,
            Self::I32(v) => i64::from(*v).rem_euclid(len as i64) as u64,
            Self::I64(v) => v.rem_euclid(len as i64) as u64,
            Self::U32(v) => u64::from(*v) % len,
            Self::U64(v) => v % len,
        };

        index as usize
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(v) => f.write_str(v),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for ShardKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for ShardKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i32> for ShardKey {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<i64> for ShardKey {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<u32> for ShardKey {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<u64> for ShardKey {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

/// The supported shard key field types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ShardKeyKind {
    /// `string`
    String,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
}

impl ShardKeyKind {
    /// Every supported kind.
    pub const ALL: [Self; 5] = [
        Self::String,
        Self::Int32,
        Self::Int64,
        Self::Uint32,
        Self::Uint64,
    ];

    /// Returns the configuration name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
        }
    }
}

impl fmt::Display for ShardKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShardKeyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::not_support(format!("shard key type '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_from_any_recovers_supported_types() {
        assert_eq!(
            ShardKey::from_any(&"user".to_string()).unwrap(),
            ShardKey::Str("user".into())
        );
        assert_eq!(ShardKey::from_any(&"user").unwrap(), ShardKey::from("user"));
        assert_eq!(ShardKey::from_any(&-3i32).unwrap(), ShardKey::I32(-3));
        assert_eq!(ShardKey::from_any(&4i64).unwrap(), ShardKey::I64(4));
        assert_eq!(ShardKey::from_any(&5u32).unwrap(), ShardKey::U32(5));
        assert_eq!(ShardKey::from_any(&6u64).unwrap(), ShardKey::U64(6));
    }

    #[test]
    fn test_from_any_rejects_other_types() {
        let err = ShardKey::from_any(&1.5f64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupport);

        let err = ShardKey::from_any(&7u16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupport);
    }

    #[test]
    fn test_integer_keys_are_used_raw() {
        assert_eq!(ShardKey::U32(42).modulo_index(3), 0);
        assert_eq!(ShardKey::U64(43).modulo_index(3), 1);
        assert_eq!(ShardKey::I64(44).modulo_index(3), 2);
        assert_eq!(ShardKey::I32(2).modulo_index(5), 2);
    }

    #[test]
    fn test_negative_keys_stay_in_range() {
        assert_eq!(ShardKey::I32(-1).modulo_index(3), 2);
        assert_eq!(ShardKey::I64(i64::MIN).modulo_index(7), i64::MIN.rem_euclid(7) as usize);
    }

    #[test]
    fn test_string_keys_are_hashed() {
        let expected = crc32fast::hash(b"user123") as usize % 3;
        assert_eq!(ShardKey::from("user123").modulo_index(3), expected);
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(ShardKey::from("abc").to_string(), "abc");
        assert_eq!(ShardKey::I32(-12).to_string(), "-12");
        assert_eq!(ShardKey::U64(u64::MAX).to_string(), "18446744073709551615");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("uint32".parse::<ShardKeyKind>().unwrap(), ShardKeyKind::Uint32);
        assert_eq!("STRING".parse::<ShardKeyKind>().unwrap(), ShardKeyKind::String);
        assert_eq!(
            "float".parse::<ShardKeyKind>().unwrap_err().kind(),
            ErrorKind::NotSupport
        );
    }
}
