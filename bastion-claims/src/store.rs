//! In-memory claim storage.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use bastion_core::{ActorId, Claim, ClaimId, ClaimKind, ClaimStatus, TargetId, Timestamp};
use serde_json::{Map, Value as JsonValue};

/// Every claim this client knows about.
///
/// At most one claim per `(target, kind)` is active; [`insert`](Self::insert)
/// refuses a second one.
#[derive(Debug, Default, Clone)]
pub struct ClaimStore {
    claims: HashMap<ClaimId, Claim>,
    active: HashMap<(TargetId, ClaimKind), ClaimId>,
    /// Lazily cleaned: entries whose claim is no longer active are skipped.
    expiries: BinaryHeap<Reverse<(Timestamp, ClaimId)>>,
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim. An active claim is refused (returned) when its
    /// `(target, kind)` already has an active holder.
    pub fn insert(&mut self, claim: Claim) -> Result<(), Claim> {
        if claim.is_active() {
            let slot = (claim.target_id.clone(), claim.kind);
            if let Some(holder) = self.active.get(&slot) {
                if *holder != claim.claim_id {
                    return Err(claim);
                }
            }
            self.active.insert(slot, claim.claim_id);
            self.expiries.push(Reverse((claim.expires_at, claim.claim_id)));
        }
        self.claims.insert(claim.claim_id, claim);
        Ok(())
    }

    pub fn get(&self, id: &ClaimId) -> Option<&Claim> {
        self.claims.get(id)
    }

    pub fn active_for(&self, target: &TargetId, kind: ClaimKind) -> Option<&Claim> {
        self.active
            .get(&(target.clone(), kind))
            .and_then(|id| self.claims.get(id))
    }

    /// Active claims, oldest first.
    pub fn active_claims(&self) -> Vec<&Claim> {
        let mut claims: Vec<&Claim> = self
            .active
            .values()
            .filter_map(|id| self.claims.get(id))
            .collect();
        claims.sort_by_key(|c| (c.created_at, c.claim_id));
        claims
    }

    pub fn active_by_actor(&self, actor: &ActorId) -> Vec<&Claim> {
        self.active_claims()
            .into_iter()
            .filter(|c| c.is_owned_by(actor))
            .collect()
    }

    /// Every claim ever made on `target`, oldest first.
    pub fn history(&self, target: &TargetId) -> Vec<&Claim> {
        let mut claims: Vec<&Claim> = self
            .claims
            .values()
            .filter(|c| &c.target_id == target)
            .collect();
        claims.sort_by_key(|c| (c.created_at, c.claim_id));
        claims
    }

    /// Move a claim out of `active`. Returns the updated claim only when the
    /// status actually changed.
    pub fn transition(
        &mut self,
        id: &ClaimId,
        status: ClaimStatus,
        at: Timestamp,
        meta: Option<&Map<String, JsonValue>>,
    ) -> Option<Claim> {
        let claim = self.claims.get_mut(id)?;
        if !claim.transition(status, at, meta) {
            return None;
        }
        let slot = (claim.target_id.clone(), claim.kind);
        if self.active.get(&slot) == Some(id) {
            self.active.remove(&slot);
        }
        Some(claim.clone())
    }

    /// Ids of active claims whose expiry is at or before `now`.
    pub fn due_for_expiry(&mut self, now: Timestamp) -> Vec<ClaimId> {
        let mut due = Vec::new();
        while let Some(Reverse((expires_at, id))) = self.expiries.peek().copied() {
            if expires_at > now {
                break;
            }
            self.expiries.pop();
            let still_due = self
                .claims
                .get(&id)
                .is_some_and(|c| c.is_active() && c.expires_at == expires_at);
            if still_due {
                due.push(id);
            }
        }
        due
    }

    /// Replace every claim with `claims`.
    ///
    /// If the input holds several active claims for one `(target, kind)` the
    /// oldest keeps the slot; the others are returned as rejects.
    pub fn replace_all(&mut self, claims: Vec<Claim>) -> Vec<Claim> {
        self.claims.clear();
        self.active.clear();
        self.expiries.clear();

        let mut claims = claims;
        claims.sort_by_key(|c| (c.created_at, c.claim_id));
        claims
            .into_iter()
            .filter_map(|claim| self.insert(claim).err())
            .collect()
    }

    pub fn all(&self) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self.claims.values().cloned().collect();
        claims.sort_by_key(|c| (c.created_at, c.claim_id));
        claims
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::CreateClaim;
    use chrono::Utc;
    use std::time::Duration;

    fn open(target: &str, actor: &str, kind: ClaimKind, at: Timestamp, ttl_secs: u64) -> Claim {
        Claim::open(
            &CreateClaim::new(target, actor, kind),
            at,
            Duration::from_secs(ttl_secs),
        )
    }

    #[test]
    fn test_second_active_claim_is_refused() {
        let now = Utc::now();
        let mut store = ClaimStore::new();
        let first = open("42", "A", ClaimKind::Hit, now, 120);
        store.insert(first.clone()).expect("first claim");

        let second = open("42", "B", ClaimKind::Hit, now, 120);
        assert_eq!(store.insert(second.clone()), Err(second));
        assert_eq!(store.active_for(&"42".into(), ClaimKind::Hit), Some(&first));

        // A different kind on the same target is a separate slot.
        store
            .insert(open("42", "B", ClaimKind::Med, now, 3600))
            .expect("med claim");
        assert_eq!(store.active_count(), 2);
    }

    #[test]
    fn test_transition_frees_slot_and_keeps_history() {
        let now = Utc::now();
        let mut store = ClaimStore::new();
        let claim = open("42", "A", ClaimKind::Hit, now, 120);
        store.insert(claim.clone()).expect("insert");

        let released = store
            .transition(&claim.claim_id, ClaimStatus::Released, now, None)
            .expect("changed");
        assert_eq!(released.status, ClaimStatus::Released);
        assert!(store.active_for(&"42".into(), ClaimKind::Hit).is_none());
        assert!(store
            .transition(&claim.claim_id, ClaimStatus::Completed, now, None)
            .is_none());

        store
            .insert(open("42", "B", ClaimKind::Hit, now, 120))
            .expect("slot is free again");
        assert_eq!(store.history(&"42".into()).len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_due_for_expiry_skips_resolved_claims() {
        let start = Utc::now();
        let mut store = ClaimStore::new();
        let short = open("1", "A", ClaimKind::Hit, start, 10);
        let resolved = open("2", "A", ClaimKind::Hit, start, 10);
        let long = open("3", "A", ClaimKind::Med, start, 600);
        for claim in [&short, &resolved, &long] {
            store.insert(claim.clone()).expect("insert");
        }
        store.transition(&resolved.claim_id, ClaimStatus::Completed, start, None);

        assert!(store.due_for_expiry(start).is_empty());
        let later = start + chrono::Duration::seconds(10);
        assert_eq!(store.due_for_expiry(later), vec![short.claim_id]);
        // Heap entries are consumed.
        assert!(store.due_for_expiry(later).is_empty());
    }

    #[test]
    fn test_replace_all_keeps_oldest_active() {
        let now = Utc::now();
        let mut store = ClaimStore::new();
        store.insert(open("9", "Z", ClaimKind::Hit, now, 60)).expect("insert");

        let older = open("42", "A", ClaimKind::Hit, now, 120);
        let newer = open("42", "B", ClaimKind::Hit, now + chrono::Duration::seconds(1), 120);
        let rejects = store.replace_all(vec![newer.clone(), older.clone()]);
        assert_eq!(rejects, vec![newer]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.active_for(&"42".into(), ClaimKind::Hit), Some(&older));
        assert!(store.active_for(&"9".into(), ClaimKind::Hit).is_none());
    }
}
