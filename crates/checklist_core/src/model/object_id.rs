//! Store-native document identifier and its external string codec.
//!
//! # Responsibility
//! - Model the store's 12-byte identifier as a distinct value type.
//! - Convert between the external 24-hex-character form and raw bytes.
//!
//! # Invariants
//! - `ObjectId::encode()` is total; `ObjectId::parse()` accepts exactly 24
//!   hex characters (either case) and nothing else.
//! - Ordering follows the raw bytes, so ids sort by creation second first.
//! - Identifiers are assigned by the store at insert time, never by callers.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const OBJECT_ID_LEN: usize = 12;
const COUNTER_MASK: u32 = 0x00ff_ffff;

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| rand::random());
static COUNTER: Lazy<AtomicU32> =
    Lazy::new(|| AtomicU32::new(rand::random::<u32>() & COUNTER_MASK));

/// Opaque, totally-ordered 12-byte document identifier.
///
/// Layout: 4-byte big-endian creation seconds, 5 bytes of per-process
/// randomness, 3-byte big-endian counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

/// Rejected external identifier text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidObjectId {
    input: String,
}

impl InvalidObjectId {
    /// The text that failed to decode.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl Display for InvalidObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid identifier `{}`: expected 24 hexadecimal characters",
            self.input
        )
    }
}

impl Error for InvalidObjectId {}

impl ObjectId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or(0);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Decodes the external string form.
    ///
    /// # Errors
    /// - Returns `InvalidObjectId` for anything other than 24 hex characters.
    pub fn parse(external: &str) -> Result<Self, InvalidObjectId> {
        let invalid = || InvalidObjectId {
            input: external.to_string(),
        };
        if external.len() != OBJECT_ID_LEN * 2 {
            return Err(invalid());
        }
        let mut bytes = [0u8; OBJECT_ID_LEN];
        hex::decode_to_slice(external, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// Encodes to the external lowercase hex form.
    pub fn encode(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
