//! Per-target notes shared through the authority.

use crate::identity::{ActorId, TargetId, Timestamp};
use serde::{Deserialize, Serialize};

/// Free-text note attached to a target. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNote {
    pub target_id: TargetId,
    pub text: String,
    pub author_id: ActorId,
    pub updated_at: Timestamp,
}
