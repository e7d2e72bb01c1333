//! Document ID type definition.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Error;

const ID_LENGTH: usize = 12;

/// An opaque, store generated identifier for a document.
///
/// The first four bytes hold the creation time in seconds since the Unix
/// epoch (big-endian) and the remaining eight bytes are random. IDs are
/// exchanged as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId([u8; ID_LENGTH]);

impl DocumentId {
    /// Generate a new, unique ID.
    pub fn new() -> Self {
        let seconds = OffsetDateTime::now_utc().unix_timestamp() as u32;
        let random = Uuid::new_v4();

        let mut bytes = [0; ID_LENGTH];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..8]);

        Self(bytes)
    }

    /// Parse an ID from its hex representation.
    ///
    /// # Errors
    /// Returns [Error::InvalidId] if `text` is not exactly 24 hex digits.
    pub fn parse(text: &str) -> Result<Self, Error> {
        if text.len() != ID_LENGTH * 2 {
            return Err(Error::InvalidId(text.to_owned()));
        }

        let mut bytes = [0; ID_LENGTH];
        hex::decode_to_slice(text, &mut bytes).map_err(|_| Error::InvalidId(text.to_owned()))?;

        Ok(Self(bytes))
    }

    /// The 24 character, lowercase hex representation of the ID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
