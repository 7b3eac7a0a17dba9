//! The `UniqueId` value and its canonical text form.

use crate::errors::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of a unique identifier in bytes.
pub const UNIQUE_ID_LEN: usize = 16;

/// Length of the canonical text form: four groups of eight hex digits.
pub const FORMATTED_LEN: usize = 35;

const GROUP_LEN: usize = 8;

/// Fixed-size identifier assigned to directory entries.
///
/// Ordering and equality are bytewise, so they are total and identical on
/// every server.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UniqueId([u8; UNIQUE_ID_LEN]);

impl UniqueId {
    /// The all-zero identifier, used as the default derivation base.
    pub const NIL: UniqueId = UniqueId([0u8; UNIQUE_ID_LEN]);

    pub const fn from_bytes(bytes: [u8; UNIQUE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; UNIQUE_ID_LEN] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; UNIQUE_ID_LEN]
    }

    /// Layout version carried in the high nibble of byte 6
    /// (1 for time/node ids, 5 for name-based ids).
    pub fn version(&self) -> u8 {
        self.0[6] >> 4
    }

    /// Render as `xxxxxxxx-xxxxxxxx-xxxxxxxx-xxxxxxxx` in lowercase hex.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(FORMATTED_LEN);
        for (i, chunk) in self.0.chunks(4).enumerate() {
            if i > 0 {
                out.push('-');
            }
            out.push_str(&hex::encode(chunk));
        }
        out
    }

    /// Parse the canonical text form. Hex digits may be either case.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() != FORMATTED_LEN {
            return Err(UniqueIdError::bad_data(format!(
                "unique id must be {FORMATTED_LEN} characters, got {}",
                text.len()
            )));
        }

        let mut bytes = [0u8; UNIQUE_ID_LEN];
        for (i, group) in text.split('-').enumerate() {
            if i >= 4 || group.len() != GROUP_LEN {
                return Err(UniqueIdError::bad_data(format!(
                    "malformed unique id `{text}`"
                )));
            }
            hex::decode_to_slice(group, &mut bytes[i * 4..i * 4 + 4]).map_err(|e| {
                UniqueIdError::bad_data(format!("invalid hex in unique id `{text}`: {e}"))
            })?;
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self.format())
    }
}

impl FromStr for UniqueId {
    type Err = UniqueIdError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UniqueId {
    type Error = UniqueIdError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<UniqueId> for String {
    fn from(id: UniqueId) -> Self {
        id.format()
    }
}
