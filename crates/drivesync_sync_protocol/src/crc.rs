//! CRC32 values on the wire.
//!
//! Checksums travel as decimal strings (`"3421780262"`) so clients with
//! signed or floating-point integers read them unambiguously. Plain JSON
//! numbers are accepted on input.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An unsigned CRC32 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Crc32(pub u32);

impl Crc32 {
    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for Crc32 {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Crc32> for u32 {
    fn from(value: Crc32) -> Self {
        value.0
    }
}

impl fmt::Display for Crc32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Crc32 {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidCrc32 {
                value: s.to_string(),
            });
        }
        trimmed
            .parse::<u32>()
            .map(Self)
            .map_err(|_| ProtocolError::InvalidCrc32 {
                value: s.to_string(),
            })
    }
}

impl Serialize for Crc32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Crc32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CrcVisitor;

        impl Visitor<'_> for CrcVisitor {
            type Value = Crc32;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an unsigned 32-bit CRC as a decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Crc32, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Crc32, E> {
                u32::try_from(v)
                    .map(Crc32)
                    .map_err(|_| E::custom(format!("crc32 out of range: {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Crc32, E> {
                u32::try_from(v)
                    .map(Crc32)
                    .map_err(|_| E::custom(format!("crc32 out of range: {v}")))
            }
        }

        deserializer.deserialize_any(CrcVisitor)
    }
}
