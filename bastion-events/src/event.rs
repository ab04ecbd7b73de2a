//! Event types published by the engine.

use bastion_core::{
    ChainState, Claim, RiskAssessment, RiskLevel, TargetNote, WarConfig, WarMode,
};
use serde::{Deserialize, Serialize};

/// Events for external consumers (UI, alerting) and for internal wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BastionEvent {
    // ========================================================================
    // CLAIM EVENTS
    // ========================================================================
    ClaimCreated {
        claim: Claim,
    },

    ClaimReleased {
        claim: Claim,
    },

    ClaimCompleted {
        claim: Claim,
    },

    ClaimCancelled {
        claim: Claim,
    },

    ClaimExpired {
        claim: Claim,
    },

    /// Bulk-cleared by a war mode change or replaced by a sync pull.
    ClaimSuperseded {
        claim: Claim,
    },

    NoteUpdated {
        note: TargetNote,
    },

    WarConfigUpdated {
        config: WarConfig,
        previous_mode: WarMode,
    },

    /// Authoritative state replaced local collections.
    SyncApplied {
        claims: usize,
        notes: usize,
        config_changed: bool,
    },

    // ========================================================================
    // CHAIN EVENTS
    // ========================================================================
    ChainTick {
        state: ChainState,
    },

    RiskLevelChanged {
        previous: RiskLevel,
        assessment: RiskAssessment,
    },

    /// Raised on a change into `warning` or `critical`.
    RiskWarning {
        assessment: RiskAssessment,
    },

    // ========================================================================
    // SYSTEM EVENTS
    // ========================================================================
    QuotaStuck {
        key: String,
        waits: u32,
    },

    CredentialInvalid {
        reason: String,
    },

    /// Persistence failed; the in-memory state is still serving.
    StorageDegraded {
        message: String,
    },
}

impl BastionEvent {
    /// Stable event name, also the serde tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            BastionEvent::ClaimCreated { .. } => "ClaimCreated",
            BastionEvent::ClaimReleased { .. } => "ClaimReleased",
            BastionEvent::ClaimCompleted { .. } => "ClaimCompleted",
            BastionEvent::ClaimCancelled { .. } => "ClaimCancelled",
            BastionEvent::ClaimExpired { .. } => "ClaimExpired",
            BastionEvent::ClaimSuperseded { .. } => "ClaimSuperseded",
            BastionEvent::NoteUpdated { .. } => "NoteUpdated",
            BastionEvent::WarConfigUpdated { .. } => "WarConfigUpdated",
            BastionEvent::SyncApplied { .. } => "SyncApplied",
            BastionEvent::ChainTick { .. } => "ChainTick",
            BastionEvent::RiskLevelChanged { .. } => "RiskLevelChanged",
            BastionEvent::RiskWarning { .. } => "RiskWarning",
            BastionEvent::QuotaStuck { .. } => "QuotaStuck",
            BastionEvent::CredentialInvalid { .. } => "CredentialInvalid",
            BastionEvent::StorageDegraded { .. } => "StorageDegraded",
        }
    }

    /// Events a human should be told about.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            BastionEvent::RiskWarning { .. }
                | BastionEvent::QuotaStuck { .. }
                | BastionEvent::CredentialInvalid { .. }
                | BastionEvent::StorageDegraded { .. }
        )
    }

    /// The claim carried by a claim lifecycle event.
    pub fn claim(&self) -> Option<&Claim> {
        match self {
            BastionEvent::ClaimCreated { claim }
            | BastionEvent::ClaimReleased { claim }
            | BastionEvent::ClaimCompleted { claim }
            | BastionEvent::ClaimCancelled { claim }
            | BastionEvent::ClaimExpired { claim }
            | BastionEvent::ClaimSuperseded { claim } => Some(claim),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{ClaimKind, CreateClaim};
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_event_tag_matches_event_type() {
        let event = BastionEvent::QuotaStuck {
            key: "user/1".to_string(),
            waits: 5,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["waits"], 5);

        let back: BastionEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn test_claim_accessor() {
        let claim = Claim::open(
            &CreateClaim::new("42", "A", ClaimKind::Hit),
            Utc::now(),
            Duration::from_secs(60),
        );
        let event = BastionEvent::ClaimExpired { claim: claim.clone() };
        assert_eq!(event.claim(), Some(&claim));
        assert!(!event.needs_attention());
        assert!(BastionEvent::CredentialInvalid {
            reason: "bad key".to_string()
        }
        .needs_attention());
        assert!(BastionEvent::SyncApplied {
            claims: 0,
            notes: 0,
            config_changed: false
        }
        .claim()
        .is_none());
    }
}
