//! Authority snapshot types.

use std::collections::BTreeMap;

use bastion_core::{Claim, TargetId, TargetNote, Timestamp, WarConfig};
use serde::{Deserialize, Serialize};

/// Per-collection "changed since" timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinceMarks {
    #[serde(default)]
    pub claims_ts: Option<Timestamp>,
    #[serde(default)]
    pub war_ts: Option<Timestamp>,
    #[serde(default)]
    pub notes_ts: Option<Timestamp>,
}

impl SinceMarks {
    /// Move each mark forward to `reported` where it is newer.
    pub fn advance(&mut self, reported: &SinceMarks) {
        fn newer(current: &mut Option<Timestamp>, reported: Option<Timestamp>) {
            if let Some(reported) = reported {
                if current.map_or(true, |current| reported > current) {
                    *current = Some(reported);
                }
            }
        }
        newer(&mut self.claims_ts, reported.claims_ts);
        newer(&mut self.war_ts, reported.war_ts);
        newer(&mut self.notes_ts, reported.notes_ts);
    }
}

/// What the authority returned. `None` means "unchanged since your mark".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub claims: Option<Vec<Claim>>,
    #[serde(default)]
    pub war_config: Option<WarConfig>,
    #[serde(default)]
    pub notes: Option<BTreeMap<TargetId, TargetNote>>,
    #[serde(default)]
    pub marks: SinceMarks,
}

impl Bundle {
    /// A bundle with nothing changed.
    pub fn unchanged(marks: SinceMarks) -> Self {
        Self {
            marks,
            ..Self::default()
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.claims.is_none() && self.war_config.is_none() && self.notes.is_none()
    }
}
