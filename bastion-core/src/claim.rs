//! Claim model and status machine.
//!
//! A claim is a time-bounded exclusive assertion that one actor intends to
//! act on a target. Claims are never deleted, only transitioned:
//!
//! ```text
//!            ┌──→ completed
//!            ├──→ cancelled
//! active ────┼──→ expired
//!            ├──→ released
//!            └──→ superseded
//! ```
//!
//! Every state except `active` is terminal.

use crate::identity::{new_claim_id, offset, ActorId, ClaimId, TargetId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// CLAIM KIND
// ============================================================================

/// Category of claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// Attack dib
    Hit,
    /// Med deal
    Med,
    /// Support on someone else's hit
    Assist,
    /// Retaliation
    Retal,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 4] = [
        ClaimKind::Hit,
        ClaimKind::Med,
        ClaimKind::Assist,
        ClaimKind::Retal,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            ClaimKind::Hit => "hit",
            ClaimKind::Med => "med",
            ClaimKind::Assist => "assist",
            ClaimKind::Retal => "retal",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ClaimKindParseError> {
        match s.to_lowercase().as_str() {
            "hit" | "dib" => Ok(ClaimKind::Hit),
            "med" | "med_deal" => Ok(ClaimKind::Med),
            "assist" => Ok(ClaimKind::Assist),
            "retal" | "retaliation" => Ok(ClaimKind::Retal),
            _ => Err(ClaimKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ClaimKind {
    type Err = ClaimKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid claim kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimKindParseError(pub String);

impl fmt::Display for ClaimKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid claim kind: {}", self.0)
    }
}

impl std::error::Error for ClaimKindParseError {}

// ============================================================================
// CLAIM STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
    Released,
    Superseded,
}

impl ClaimStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Active)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            ClaimStatus::Active => "active",
            ClaimStatus::Completed => "completed",
            ClaimStatus::Cancelled => "cancelled",
            ClaimStatus::Expired => "expired",
            ClaimStatus::Released => "released",
            ClaimStatus::Superseded => "superseded",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

// ============================================================================
// CLAIM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: ClaimId,
    pub target_id: TargetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub actor_id: ActorId,
    pub actor_name: String,
    pub kind: ClaimKind,
    pub status: ClaimStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    /// When the claim left `active`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub meta: Map<String, JsonValue>,
}

impl Claim {
    /// Build a new active claim expiring `ttl` after `now`.
    pub fn open(request: &CreateClaim, now: Timestamp, ttl: Duration) -> Self {
        Self {
            claim_id: new_claim_id(),
            target_id: request.target_id.clone(),
            target_name: request.target_name.clone(),
            actor_id: request.actor_id.clone(),
            actor_name: request
                .actor_name
                .clone()
                .unwrap_or_else(|| request.actor_id.to_string()),
            kind: request.kind,
            status: ClaimStatus::Active,
            created_at: now,
            expires_at: offset(now, ttl),
            resolved_at: None,
            note: request.note.clone(),
            meta: request.meta.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ClaimStatus::Active
    }

    pub fn is_owned_by(&self, actor: &ActorId) -> bool {
        &self.actor_id == actor
    }

    /// Move an active claim to a terminal status. Returns `false` and leaves
    /// the claim untouched when it is already terminal.
    pub fn transition(
        &mut self,
        status: ClaimStatus,
        at: Timestamp,
        meta: Option<&Map<String, JsonValue>>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.resolved_at = Some(at);
        if let Some(meta) = meta {
            for (key, value) in meta {
                self.meta.insert(key.clone(), value.clone());
            }
        }
        true
    }
}

/// A request to open a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateClaim {
    pub target_id: TargetId,
    pub target_name: Option<String>,
    pub actor_id: ActorId,
    pub actor_name: Option<String>,
    pub kind: ClaimKind,
    pub note: Option<String>,
    pub meta: Map<String, JsonValue>,
}

impl CreateClaim {
    pub fn new(target_id: impl Into<TargetId>, actor_id: impl Into<ActorId>, kind: ClaimKind) -> Self {
        Self {
            target_id: target_id.into(),
            target_name: None,
            actor_id: actor_id.into(),
            actor_name: None,
            kind,
            note: None,
            meta: Map::new(),
        }
    }

    pub fn with_actor_name(mut self, name: impl Into<String>) -> Self {
        self.actor_name = Some(name.into());
        self
    }

    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_meta(mut self, meta: Map<String, JsonValue>) -> Self {
        self.meta = meta;
        self
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Why a claim mutation was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRejection {
    AlreadyClaimed,
    QuotaReached,
    NotOwner,
    NotFound,
    ModeDisallowsClaims,
}

impl ClaimRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimRejection::AlreadyClaimed => "already_claimed",
            ClaimRejection::QuotaReached => "quota_reached",
            ClaimRejection::NotOwner => "not_owner",
            ClaimRejection::NotFound => "not_found",
            ClaimRejection::ModeDisallowsClaims => "mode_disallows_claims",
        }
    }
}

impl fmt::Display for ClaimRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of a claim operation.
///
/// `claim` is the affected claim on success, or the conflicting claim on
/// `already_claimed` so the caller can show who holds the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ClaimRejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<Claim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<ActorId>,
    /// Claims auto-released as a side effect of this operation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub released: Vec<Claim>,
    /// False when an idempotent call found nothing to change.
    #[serde(default)]
    pub changed: bool,
}

impl ClaimOutcome {
    pub fn applied(claim: Claim) -> Self {
        Self {
            success: true,
            reason: None,
            claim: Some(claim),
            claimed_by: None,
            released: Vec::new(),
            changed: true,
        }
    }

    pub fn unchanged(claim: Claim) -> Self {
        Self {
            changed: false,
            ..Self::applied(claim)
        }
    }

    pub fn rejected(reason: ClaimRejection, conflicting: Option<Claim>) -> Self {
        let claimed_by = match reason {
            ClaimRejection::AlreadyClaimed | ClaimRejection::NotOwner => {
                conflicting.as_ref().map(|c| c.actor_id.clone())
            }
            _ => None,
        };
        Self {
            success: false,
            reason: Some(reason),
            claim: conflicting,
            claimed_by,
            released: Vec::new(),
            changed: false,
        }
    }

    pub fn with_released(mut self, released: Vec<Claim>) -> Self {
        self.released = released;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn hit_claim() -> Claim {
        let request = CreateClaim::new("42", "A", ClaimKind::Hit).with_actor_name("Alice");
        Claim::open(&request, Utc::now(), Duration::from_secs(120))
    }

    #[test]
    fn test_claim_kind_roundtrip() {
        for kind in ClaimKind::ALL {
            let parsed: ClaimKind = kind.as_db_str().parse().expect("kind should parse");
            assert_eq!(parsed, kind);
        }
        assert_eq!(ClaimKind::from_db_str("DIB"), Ok(ClaimKind::Hit));
        assert!(ClaimKind::from_db_str("bounty").is_err());
    }

    #[test]
    fn test_only_active_is_non_terminal() {
        assert!(!ClaimStatus::Active.is_terminal());
        for status in [
            ClaimStatus::Completed,
            ClaimStatus::Cancelled,
            ClaimStatus::Expired,
            ClaimStatus::Released,
            ClaimStatus::Superseded,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn test_open_claim_sets_expiry_from_ttl() {
        let claim = hit_claim();
        assert!(claim.is_active());
        assert_eq!(claim.actor_name, "Alice");
        assert_eq!(claim.expires_at - claim.created_at, chrono::Duration::seconds(120));
    }

    #[test]
    fn test_actor_name_defaults_to_id() {
        let request = CreateClaim::new("7", "B", ClaimKind::Med);
        let claim = Claim::open(&request, Utc::now(), Duration::from_secs(1));
        assert_eq!(claim.actor_name, "B");
    }

    #[test]
    fn test_transition_merges_meta_once() {
        let mut claim = hit_claim();
        let at = Utc::now();
        let mut meta = Map::new();
        meta.insert("result".to_string(), json!("mugged"));

        assert!(claim.transition(ClaimStatus::Completed, at, Some(&meta)));
        assert_eq!(claim.status, ClaimStatus::Completed);
        assert_eq!(claim.resolved_at, Some(at));
        assert_eq!(claim.meta.get("result"), Some(&json!("mugged")));

        // Terminal claims do not move again.
        assert!(!claim.transition(ClaimStatus::Cancelled, Utc::now(), None));
        assert_eq!(claim.status, ClaimStatus::Completed);
    }

    #[test]
    fn test_transition_to_active_is_refused() {
        let mut claim = hit_claim();
        assert!(!claim.transition(ClaimStatus::Active, Utc::now(), None));
        assert!(claim.resolved_at.is_none());
    }

    #[test]
    fn test_rejected_outcome_reports_holder() {
        let holder = hit_claim();
        let outcome = ClaimOutcome::rejected(ClaimRejection::AlreadyClaimed, Some(holder));
        assert!(!outcome.success);
        assert_eq!(outcome.claimed_by, Some(ActorId::from("A")));

        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["reason"], json!("already_claimed"));
        assert_eq!(json["claimed_by"], json!("A"));
    }

    #[test]
    fn test_quota_outcome_has_no_holder() {
        let outcome = ClaimOutcome::rejected(ClaimRejection::QuotaReached, None);
        assert_eq!(outcome.reason, Some(ClaimRejection::QuotaReached));
        assert!(outcome.claimed_by.is_none());
        assert_eq!(ClaimRejection::QuotaReached.to_string(), "quota_reached");
    }
}
