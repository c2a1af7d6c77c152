//! Voter identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// Longest identity accepted, in bytes.
pub const MAX_IDENTITY_LEN: usize = 256;

/// An opaque, unique voter credential (wallet address, national id hash, ...).
///
/// Only used as a lookup key. Identities are compared after trimming and
/// ASCII lower-casing, so `0xAbC` and `0xabc` are the same voter.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoterIdentity(String);

impl VoterIdentity {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, Error> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidIdentity("identity is empty".to_string()));
        }
        if trimmed.len() > MAX_IDENTITY_LEN {
            return Err(Error::InvalidIdentity(format!(
                "identity is longer than {MAX_IDENTITY_LEN} bytes"
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VoterIdentity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VoterIdentity> for String {
    fn from(value: VoterIdentity) -> Self {
        value.0
    }
}

impl AsRef<str> for VoterIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
