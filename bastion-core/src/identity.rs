//! Identity types for Bastion entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Claim identifier using UUIDv7 for timestamp-sortable IDs.
pub type ClaimId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds for TTL and timeout values.
pub type DurationMs = i64;

/// Generate a new UUIDv7 ClaimId (timestamp-sortable).
pub fn new_claim_id() -> ClaimId {
    Uuid::now_v7()
}

/// Shift a timestamp forward by a std duration, saturating at the maximum
/// representable instant.
pub fn offset(ts: Timestamp, by: Duration) -> Timestamp {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| ts.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(n.to_string())
            }
        }
    };
}

string_id!(
    /// A participant acting on targets (one per client instance).
    ActorId
);

string_id!(
    /// A shared target that claims arbitrate over.
    TargetId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_ids_roundtrip_as_plain_strings() {
        let target = TargetId::from(42u64);
        assert_eq!(target.as_str(), "42");
        let json = serde_json::to_string(&target).expect("serialize");
        assert_eq!(json, "\"42\"");
        let actor: ActorId = serde_json::from_str("\"A\"").expect("deserialize");
        assert_eq!(actor, ActorId::from("A"));
    }

    #[test]
    fn test_blank_id_is_empty() {
        assert!(ActorId::new("  ").is_empty());
        assert!(!ActorId::new("A").is_empty());
    }

    #[test]
    fn test_offset_saturates() {
        let now = Utc::now();
        assert_eq!(offset(now, Duration::from_secs(2)) - now, chrono::Duration::seconds(2));
        assert_eq!(offset(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_claim_ids_are_v7() {
        let id = new_claim_id();
        assert_eq!(id.get_version_num(), 7);
    }
}
