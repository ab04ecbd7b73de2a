//! Pure accept/reject logic for claim mutations.

use bastion_core::{ActorId, Claim, ClaimId, ClaimRejection, CreateClaim, WarConfig};

use crate::store::ClaimStore;

/// Verdict on a `create_claim` request.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateDecision {
    Reject {
        reason: ClaimRejection,
        conflicting: Option<Claim>,
    },
    /// The requester already holds this `(target, kind)`.
    AlreadyHeld(Claim),
    /// Create the claim, first releasing `release_first` (one-at-a-time mode).
    Accept { release_first: Vec<ClaimId> },
}

/// Verdict on a release/complete/cancel request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionDecision {
    NotFound,
    NotOwner(Claim),
    /// Already terminal: succeed without touching it.
    Unchanged(Claim),
    Apply(Claim),
}

/// Decision logic over a [`ClaimStore`] and a [`WarConfig`]. Holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictArbiter;

impl ConflictArbiter {
    pub fn evaluate_create(
        store: &ClaimStore,
        config: &WarConfig,
        request: &CreateClaim,
    ) -> CreateDecision {
        if !config.accepts_claims() {
            return CreateDecision::Reject {
                reason: ClaimRejection::ModeDisallowsClaims,
                conflicting: None,
            };
        }

        if let Some(existing) = store.active_for(&request.target_id, request.kind) {
            if existing.is_owned_by(&request.actor_id) {
                return CreateDecision::AlreadyHeld(existing.clone());
            }
            return CreateDecision::Reject {
                reason: ClaimRejection::AlreadyClaimed,
                conflicting: Some(existing.clone()),
            };
        }

        let held = store.active_by_actor(&request.actor_id);
        if config.enforces_one_at_a_time() {
            return CreateDecision::Accept {
                release_first: held.iter().map(|c| c.claim_id).collect(),
            };
        }
        if held.len() >= config.quota() as usize {
            return CreateDecision::Reject {
                reason: ClaimRejection::QuotaReached,
                conflicting: None,
            };
        }
        CreateDecision::Accept {
            release_first: Vec::new(),
        }
    }

    pub fn evaluate_transition(
        store: &ClaimStore,
        claim_id: &ClaimId,
        actor: &ActorId,
    ) -> TransitionDecision {
        let Some(claim) = store.get(claim_id) else {
            return TransitionDecision::NotFound;
        };
        if !claim.is_owned_by(actor) {
            return TransitionDecision::NotOwner(claim.clone());
        }
        if claim.status.is_terminal() {
            return TransitionDecision::Unchanged(claim.clone());
        }
        TransitionDecision::Apply(claim.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{ClaimKind, ClaimStatus, WarMode};
    use chrono::Utc;
    use std::time::Duration;

    fn store_with(claims: &[(&str, &str, ClaimKind)]) -> ClaimStore {
        let mut store = ClaimStore::new();
        for (target, actor, kind) in claims {
            let claim = Claim::open(
                &CreateClaim::new(*target, *actor, *kind),
                Utc::now(),
                Duration::from_secs(120),
            );
            store.insert(claim).expect("insert");
        }
        store
    }

    #[test]
    fn test_conflict_names_the_holder() {
        let store = store_with(&[("42", "A", ClaimKind::Hit)]);
        let decision = ConflictArbiter::evaluate_create(
            &store,
            &WarConfig::default(),
            &CreateClaim::new("42", "B", ClaimKind::Hit),
        );
        match decision {
            CreateDecision::Reject {
                reason: ClaimRejection::AlreadyClaimed,
                conflicting: Some(claim),
            } => assert_eq!(claim.actor_id, ActorId::from("A")),
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_same_actor_reclaim_is_held() {
        let store = store_with(&[("42", "A", ClaimKind::Hit)]);
        let decision = ConflictArbiter::evaluate_create(
            &store,
            &WarConfig::default(),
            &CreateClaim::new("42", "A", ClaimKind::Hit),
        );
        assert!(matches!(decision, CreateDecision::AlreadyHeld(_)));
    }

    #[test]
    fn test_quota_per_mode() {
        let store = store_with(&[("1", "A", ClaimKind::Hit), ("2", "A", ClaimKind::Hit)]);
        let request = CreateClaim::new("3", "A", ClaimKind::Hit);

        let cooperative = WarConfig::default();
        assert_eq!(
            ConflictArbiter::evaluate_create(&store, &cooperative, &request),
            CreateDecision::Reject {
                reason: ClaimRejection::QuotaReached,
                conflicting: None
            }
        );

        let raised = WarConfig::default().with_quota(3);
        assert_eq!(
            ConflictArbiter::evaluate_create(&store, &raised, &request),
            CreateDecision::Accept {
                release_first: Vec::new()
            }
        );

        let coordinated = WarConfig::default().with_mode(WarMode::Coordinated);
        match ConflictArbiter::evaluate_create(&store, &coordinated, &request) {
            CreateDecision::Accept { release_first } => assert_eq!(release_first.len(), 2),
            other => panic!("unexpected decision: {:?}", other),
        }

        let off = WarConfig::default().with_mode(WarMode::FreeForAll);
        assert!(matches!(
            ConflictArbiter::evaluate_create(&store, &off, &request),
            CreateDecision::Reject {
                reason: ClaimRejection::ModeDisallowsClaims,
                ..
            }
        ));
    }

    #[test]
    fn test_transition_checks_owner_then_status() {
        let mut store = store_with(&[("42", "A", ClaimKind::Hit)]);
        let id = store.active_claims()[0].claim_id;

        assert!(matches!(
            ConflictArbiter::evaluate_transition(&store, &id, &"B".into()),
            TransitionDecision::NotOwner(_)
        ));
        assert!(matches!(
            ConflictArbiter::evaluate_transition(&store, &id, &"A".into()),
            TransitionDecision::Apply(_)
        ));
        store.transition(&id, ClaimStatus::Completed, Utc::now(), None);
        assert!(matches!(
            ConflictArbiter::evaluate_transition(&store, &id, &"A".into()),
            TransitionDecision::Unchanged(_)
        ));
        assert_eq!(
            ConflictArbiter::evaluate_transition(&store, &bastion_core::new_claim_id(), &"A".into()),
            TransitionDecision::NotFound
        );
    }
}
