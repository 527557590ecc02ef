use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder values some clients send when they have no venue selected
const NULL_MARKERS: [&str; 2] = ["null", "undefined"];

const MAX_LEN: usize = 64;

/// Validated venue (masjid) identifier.
///
/// The id is used both as a directory name under the HLS root and as a URL
/// path segment, so only `[A-Za-z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VenueId(String);

impl VenueId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
            return Err(RelayError::InvalidVenue(raw.to_string()));
        }

        let safe = trimmed.len() <= MAX_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(RelayError::InvalidVenue(raw.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Parse an optional query/body value, treating absence as invalid
    pub fn from_optional(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Err(RelayError::InvalidVenue(String::new())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VenueId {
    type Error = RelayError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<VenueId> for String {
    fn from(venue: VenueId) -> Self {
        venue.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
