//! Observed real-world status of an actor or target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedStatus {
    Okay,
    Traveling,
    Abroad,
    Hospital,
    Jail,
}

impl ObservedStatus {
    /// Whether a claim involving this party can no longer be acted on.
    pub fn voids_claims(&self) -> bool {
        !matches!(self, ObservedStatus::Okay)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObservedStatus::Okay => "okay",
            ObservedStatus::Traveling => "traveling",
            ObservedStatus::Abroad => "abroad",
            ObservedStatus::Hospital => "hospital",
            ObservedStatus::Jail => "jail",
        }
    }
}

impl fmt::Display for ObservedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedStatusParseError(pub String);

impl fmt::Display for ObservedStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown status: {}", self.0)
    }
}

impl std::error::Error for ObservedStatusParseError {}

impl FromStr for ObservedStatus {
    type Err = ObservedStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "okay" | "ok" => Ok(ObservedStatus::Okay),
            "traveling" | "travelling" => Ok(ObservedStatus::Traveling),
            "abroad" => Ok(ObservedStatus::Abroad),
            "hospital" => Ok(ObservedStatus::Hospital),
            "jail" | "federal" => Ok(ObservedStatus::Jail),
            _ => Err(ObservedStatusParseError(s.to_string())),
        }
    }
}
