//! Courts and the allow-list of court types the lottery form accepts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Court type labels exactly as the booking site's classification selector shows them.
pub const VALID_COURT_TYPES: &[&str] = &["テニス（人工芝）", "テニス（ハード）"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CourtType {
    /// テニス（人工芝）
    ArtificialTurf,
    /// テニス（ハード）
    Hard,
}

impl CourtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArtificialTurf => VALID_COURT_TYPES[0],
            Self::Hard => VALID_COURT_TYPES[1],
        }
    }
}

impl FromStr for CourtType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            t if t == VALID_COURT_TYPES[0] => Ok(Self::ArtificialTurf),
            t if t == VALID_COURT_TYPES[1] => Ok(Self::Hard),
            other => Err(ConfigError::InvalidCourtType(other.to_string())),
        }
    }
}

impl TryFrom<String> for CourtType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CourtType> for String {
    fn from(value: CourtType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CourtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A park whose tennis facility can be entered in the lottery.
///
/// `name` doubles as the favorite-registration name and the quick-select
/// button label on the application page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Court {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CourtType,
}
