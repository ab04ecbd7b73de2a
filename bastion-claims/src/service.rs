//! The claim arbiter service: applies accepted mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bastion_core::{
    ActorId, Claim, ClaimError, ClaimId, ClaimKind, ClaimOutcome, ClaimRejection, ClaimStatus,
    Clock, ConfigError, CreateClaim, TargetId, TargetNote, Timestamp, WarConfig,
};
use bastion_events::{BastionEvent, EventBus};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::arbiter::{ConflictArbiter, CreateDecision, TransitionDecision};
use crate::board::ClaimBoard;
use crate::outbox::{ClaimMutation, Outbox};
use crate::status::ObservedStatus;
use crate::store::ClaimStore;

pub(crate) struct Board {
    pub(crate) store: ClaimStore,
    pub(crate) config: WarConfig,
    pub(crate) notes: HashMap<TargetId, TargetNote>,
}

/// Side effects collected under the board lock, released after it.
#[derive(Default)]
struct Effects {
    events: Vec<BastionEvent>,
    mutations: Vec<ClaimMutation>,
}

impl Effects {
    /// A local change: announce it and queue it for the authority.
    fn local(&mut self, claim: &Claim) {
        self.events.push(lifecycle_event(claim.clone()));
        self.mutations.push(ClaimMutation::ClaimUpserted {
            claim: claim.clone(),
        });
    }
}

fn lifecycle_event(claim: Claim) -> BastionEvent {
    match claim.status {
        ClaimStatus::Active => BastionEvent::ClaimCreated { claim },
        ClaimStatus::Released => BastionEvent::ClaimReleased { claim },
        ClaimStatus::Completed => BastionEvent::ClaimCompleted { claim },
        ClaimStatus::Cancelled => BastionEvent::ClaimCancelled { claim },
        ClaimStatus::Expired => BastionEvent::ClaimExpired { claim },
        ClaimStatus::Superseded => BastionEvent::ClaimSuperseded { claim },
    }
}

fn meta(key: &str, value: &str) -> Map<String, JsonValue> {
    let mut map = Map::new();
    map.insert(key.to_string(), JsonValue::String(value.to_string()));
    map
}

fn require(field: &str, missing: bool) -> Result<(), ClaimError> {
    if missing {
        return Err(ClaimError::MissingId {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Owns this client's view of claims, war config and notes.
///
/// Every accepted mutation publishes a lifecycle event and is appended to the
/// outbox. Expected conflicts come back as `ClaimOutcome { success: false }`;
/// only a missing id is an error.
pub struct ClaimArbiter {
    board: Mutex<Board>,
    outbox: Mutex<Outbox>,
    outbox_ready: Notify,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl ClaimArbiter {
    pub fn new(config: WarConfig, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            board: Mutex::new(Board {
                store: ClaimStore::new(),
                config,
                notes: HashMap::new(),
            }),
            outbox: Mutex::new(Outbox::new()),
            outbox_ready: Notify::new(),
            clock,
            events,
        }
    }

    pub(crate) fn lock_board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, effects: Effects) {
        if !effects.mutations.is_empty() {
            let mut outbox = self.lock_outbox();
            for mutation in effects.mutations {
                outbox.push(mutation);
            }
            drop(outbox);
            self.outbox_ready.notify_one();
        }
        for event in effects.events {
            self.events.publish(event);
        }
    }

    // ========================================================================
    // CLAIM MUTATIONS
    // ========================================================================

    pub fn create_claim(&self, request: CreateClaim) -> Result<ClaimOutcome, ClaimError> {
        require("target_id", request.target_id.is_empty())?;
        require("actor_id", request.actor_id.is_empty())?;

        let now = self.clock.now();
        let mut effects = Effects::default();
        let outcome = {
            let mut board = self.lock_board();
            expire_due(&mut board.store, now, &mut effects);

            match ConflictArbiter::evaluate_create(&board.store, &board.config, &request) {
                CreateDecision::Reject {
                    reason,
                    conflicting,
                } => {
                    debug!(
                        target_id = %request.target_id,
                        actor_id = %request.actor_id,
                        kind = %request.kind,
                        reason = %reason,
                        "Claim rejected"
                    );
                    ClaimOutcome::rejected(reason, conflicting)
                }
                CreateDecision::AlreadyHeld(claim) => ClaimOutcome::unchanged(claim),
                CreateDecision::Accept { release_first } => {
                    let mut released = Vec::new();
                    let reason = meta("released_by", "one_at_a_time");
                    for id in release_first {
                        if let Some(claim) =
                            board
                                .store
                                .transition(&id, ClaimStatus::Released, now, Some(&reason))
                        {
                            effects.local(&claim);
                            released.push(claim);
                        }
                    }

                    let ttl = board.config.ttl_for(request.kind);
                    let claim = Claim::open(&request, now, ttl);
                    match board.store.insert(claim.clone()) {
                        Ok(()) => {
                            info!(
                                claim_id = %claim.claim_id,
                                target_id = %claim.target_id,
                                actor_id = %claim.actor_id,
                                kind = %claim.kind,
                                expires_at = %claim.expires_at,
                                "Claim created"
                            );
                            effects.local(&claim);
                            ClaimOutcome::applied(claim).with_released(released)
                        }
                        Err(_) => ClaimOutcome::rejected(
                            ClaimRejection::AlreadyClaimed,
                            board.store.active_for(&request.target_id, request.kind).cloned(),
                        ),
                    }
                }
            }
        };
        self.flush(effects);
        Ok(outcome)
    }

    /// Release every active claim `actor` holds on `target`.
    pub fn release_claim(
        &self,
        target: &TargetId,
        actor: &ActorId,
    ) -> Result<ClaimOutcome, ClaimError> {
        require("target_id", target.is_empty())?;
        require("actor_id", actor.is_empty())?;

        let now = self.clock.now();
        let mut effects = Effects::default();
        let outcome = {
            let mut board = self.lock_board();
            let history: Vec<Claim> = board.store.history(target).into_iter().cloned().collect();
            let mine: Vec<ClaimId> = history
                .iter()
                .filter(|c| c.is_active() && c.is_owned_by(actor))
                .map(|c| c.claim_id)
                .collect();

            if mine.is_empty() {
                if let Some(held) = history.iter().find(|c| c.is_active()) {
                    ClaimOutcome::rejected(ClaimRejection::NotOwner, Some(held.clone()))
                } else if let Some(last) = history.iter().rev().find(|c| c.is_owned_by(actor)) {
                    ClaimOutcome::unchanged(last.clone())
                } else {
                    ClaimOutcome::rejected(ClaimRejection::NotFound, None)
                }
            } else {
                let released: Vec<Claim> = mine
                    .iter()
                    .filter_map(|id| board.store.transition(id, ClaimStatus::Released, now, None))
                    .collect();
                for claim in &released {
                    info!(claim_id = %claim.claim_id, target_id = %target, actor_id = %actor, "Claim released");
                    effects.local(claim);
                }
                let mut released = released.into_iter();
                match released.next() {
                    Some(first) => ClaimOutcome::applied(first).with_released(released.collect()),
                    None => ClaimOutcome::rejected(ClaimRejection::NotFound, None),
                }
            }
        };
        self.flush(effects);
        Ok(outcome)
    }

    pub fn complete_claim(
        &self,
        claim_id: &ClaimId,
        actor: &ActorId,
        meta: Option<Map<String, JsonValue>>,
    ) -> Result<ClaimOutcome, ClaimError> {
        self.finish(claim_id, actor, ClaimStatus::Completed, meta)
    }

    pub fn cancel_claim(
        &self,
        claim_id: &ClaimId,
        actor: &ActorId,
        meta: Option<Map<String, JsonValue>>,
    ) -> Result<ClaimOutcome, ClaimError> {
        self.finish(claim_id, actor, ClaimStatus::Cancelled, meta)
    }

    fn finish(
        &self,
        claim_id: &ClaimId,
        actor: &ActorId,
        status: ClaimStatus,
        meta: Option<Map<String, JsonValue>>,
    ) -> Result<ClaimOutcome, ClaimError> {
        require("claim_id", claim_id.is_nil())?;
        require("actor_id", actor.is_empty())?;

        let now = self.clock.now();
        let mut effects = Effects::default();
        let outcome = {
            let mut board = self.lock_board();
            match ConflictArbiter::evaluate_transition(&board.store, claim_id, actor) {
                TransitionDecision::NotFound => ClaimOutcome::rejected(ClaimRejection::NotFound, None),
                TransitionDecision::NotOwner(claim) => {
                    ClaimOutcome::rejected(ClaimRejection::NotOwner, Some(claim))
                }
                TransitionDecision::Unchanged(claim) => ClaimOutcome::unchanged(claim),
                TransitionDecision::Apply(claim) => {
                    match board.store.transition(claim_id, status, now, meta.as_ref()) {
                        Some(updated) => {
                            info!(claim_id = %claim_id, status = %status, "Claim resolved");
                            effects.local(&updated);
                            ClaimOutcome::applied(updated)
                        }
                        None => ClaimOutcome::unchanged(claim),
                    }
                }
            }
        };
        self.flush(effects);
        Ok(outcome)
    }

    /// Expire every active claim past its `expires_at`.
    pub fn expire_sweep(&self) -> Vec<Claim> {
        let now = self.clock.now();
        let mut effects = Effects::default();
        let expired = expire_due(&mut self.lock_board().store, now, &mut effects);
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired claims");
        }
        self.flush(effects);
        expired
    }

    /// Release claims made meaningless by `subject`'s observed status.
    ///
    /// `subject` is matched against both the actor and the target of every
    /// active claim.
    pub fn observe_status(&self, subject: &str, status: ObservedStatus) -> Vec<Claim> {
        let now = self.clock.now();
        let mut effects = Effects::default();
        let released = {
            let mut board = self.lock_board();
            if !status.voids_claims() || !board.config.auto_release_on_status {
                return Vec::new();
            }
            let ids: Vec<ClaimId> = board
                .store
                .active_claims()
                .into_iter()
                .filter(|c| c.actor_id.as_str() == subject || c.target_id.as_str() == subject)
                .map(|c| c.claim_id)
                .collect();
            let reason = meta("released_on_status", status.as_str());
            let released: Vec<Claim> = ids
                .iter()
                .filter_map(|id| board.store.transition(id, ClaimStatus::Released, now, Some(&reason)))
                .collect();
            for claim in &released {
                effects.local(claim);
            }
            released
        };
        if !released.is_empty() {
            info!(subject, status = %status, count = released.len(), "Released claims on status change");
        }
        self.flush(effects);
        released
    }

    // ========================================================================
    // WAR CONFIG
    // ========================================================================

    /// Replace the war config. Leaving the cooperative family supersedes every
    /// active claim. Returns the superseded claims.
    pub fn update_war_config(&self, mut config: WarConfig) -> Result<Vec<Claim>, ConfigError> {
        config.validate()?;
        let now = self.clock.now();
        config.updated_at = Some(now);

        let mut effects = Effects::default();
        let superseded = {
            let mut board = self.lock_board();
            let previous_mode = board.config.mode;
            board.config = config.clone();
            let superseded = supersede_if_closed(&mut board, now);
            for claim in &superseded {
                effects.local(claim);
            }
            info!(
                previous_mode = previous_mode.as_str(),
                mode = config.mode.as_str(),
                superseded = superseded.len(),
                "War config updated"
            );
            effects.events.push(BastionEvent::WarConfigUpdated {
                config: config.clone(),
                previous_mode,
            });
            effects.mutations.push(ClaimMutation::WarConfigSet { config });
            superseded
        };
        self.flush(effects);
        Ok(superseded)
    }

    pub fn war_config(&self) -> WarConfig {
        self.lock_board().config.clone()
    }

    // ========================================================================
    // NOTES
    // ========================================================================

    pub fn set_note(
        &self,
        target: &TargetId,
        author: &ActorId,
        text: impl Into<String>,
    ) -> Result<TargetNote, ClaimError> {
        require("target_id", target.is_empty())?;
        require("actor_id", author.is_empty())?;

        let note = TargetNote {
            target_id: target.clone(),
            text: text.into(),
            author_id: author.clone(),
            updated_at: self.clock.now(),
        };
        self.lock_board().notes.insert(target.clone(), note.clone());
        debug!(target_id = %target, author_id = %author, "Note updated");
        self.flush(Effects {
            events: vec![BastionEvent::NoteUpdated { note: note.clone() }],
            mutations: vec![ClaimMutation::NoteSet { note: note.clone() }],
        });
        Ok(note)
    }

    pub fn note(&self, target: &TargetId) -> Option<TargetNote> {
        self.lock_board().notes.get(target).cloned()
    }

    pub fn notes(&self) -> Vec<TargetNote> {
        let mut notes: Vec<TargetNote> = self.lock_board().notes.values().cloned().collect();
        notes.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        notes
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn claim(&self, id: &ClaimId) -> Option<Claim> {
        self.lock_board().store.get(id).cloned()
    }

    pub fn active_claim(&self, target: &TargetId, kind: ClaimKind) -> Option<Claim> {
        self.lock_board().store.active_for(target, kind).cloned()
    }

    pub fn active_claims(&self) -> Vec<Claim> {
        self.lock_board()
            .store
            .active_claims()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Active claims held by `actor`.
    pub fn claims_by_actor(&self, actor: &ActorId) -> Vec<Claim> {
        self.lock_board()
            .store
            .active_by_actor(actor)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn history(&self, target: &TargetId) -> Vec<Claim> {
        self.lock_board()
            .store
            .history(target)
            .into_iter()
            .cloned()
            .collect()
    }

    // ========================================================================
    // AUTHORITATIVE STATE
    // ========================================================================

    /// Replace all claims with the authority's collection. Nothing is queued
    /// for push. Returns the number of claims now held.
    pub fn apply_authoritative_claims(&self, claims: Vec<Claim>) -> usize {
        let now = self.clock.now();
        let mut board = self.lock_board();
        adopt_claims(&mut board.store, claims, now);
        let superseded = supersede_if_closed(&mut board, now);
        let count = board.store.len();
        drop(board);
        for claim in superseded {
            self.events.publish(BastionEvent::ClaimSuperseded { claim });
        }
        count
    }

    /// Adopt the authority's war config. Returns whether anything changed.
    pub fn apply_authoritative_config(&self, config: WarConfig) -> bool {
        let now = self.clock.now();
        let mut events = Vec::new();
        {
            let mut board = self.lock_board();
            if board.config == config {
                return false;
            }
            let previous_mode = board.config.mode;
            board.config = config.clone();
            for claim in supersede_if_closed(&mut board, now) {
                events.push(BastionEvent::ClaimSuperseded { claim });
            }
            events.push(BastionEvent::WarConfigUpdated {
                config,
                previous_mode,
            });
        }
        for event in events {
            self.events.publish(event);
        }
        true
    }

    /// Replace all notes with the authority's collection.
    pub fn apply_authoritative_notes(&self, notes: Vec<TargetNote>) -> usize {
        let mut board = self.lock_board();
        board.notes = notes
            .into_iter()
            .map(|note| (note.target_id.clone(), note))
            .collect();
        board.notes.len()
    }

    // ========================================================================
    // OUTBOX
    // ========================================================================

    pub fn drain_outbox(&self) -> Vec<ClaimMutation> {
        self.lock_outbox().drain()
    }

    pub fn requeue_front(&self, batch: Vec<ClaimMutation>) {
        self.lock_outbox().requeue_front(batch);
    }

    pub fn outbox_len(&self) -> usize {
        self.lock_outbox().len()
    }

    /// Resolves once a mutation has been queued since the last wake-up.
    /// A mutation queued while nobody waits still wakes the next waiter.
    pub async fn outbox_ready(&self) {
        self.outbox_ready.notified().await;
    }

    // ========================================================================
    // SNAPSHOT
    // ========================================================================

    pub fn board(&self) -> ClaimBoard {
        let board = self.lock_board();
        let mut notes: Vec<TargetNote> = board.notes.values().cloned().collect();
        notes.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        ClaimBoard {
            claims: board.store.all(),
            war_config: board.config.clone(),
            notes,
        }
    }

    /// Replace local state with a saved board, without events or pushes.
    pub fn restore_board(&self, saved: ClaimBoard) {
        let mut board = self.lock_board();
        board.config = saved.war_config;
        let duplicates = adopt_claims(&mut board.store, saved.claims, self.clock.now());
        if !duplicates.is_empty() {
            warn!(count = duplicates.len(), "Saved board held duplicate active claims, superseded");
        }
        board.notes = saved
            .notes
            .into_iter()
            .map(|note| (note.target_id.clone(), note))
            .collect();
    }
}

impl std::fmt::Debug for ClaimArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let board = self.lock_board();
        f.debug_struct("ClaimArbiter")
            .field("mode", &board.config.mode)
            .field("claims", &board.store.len())
            .field("active", &board.store.active_count())
            .finish()
    }
}

fn expire_due(store: &mut ClaimStore, now: Timestamp, effects: &mut Effects) -> Vec<Claim> {
    let expired: Vec<Claim> = store
        .due_for_expiry(now)
        .iter()
        .filter_map(|id| store.transition(id, ClaimStatus::Expired, now, None))
        .collect();
    for claim in &expired {
        debug!(claim_id = %claim.claim_id, target_id = %claim.target_id, "Claim expired");
        effects.local(claim);
    }
    expired
}

/// Supersede every active claim when the mode no longer accepts claims.
fn supersede_if_closed(board: &mut Board, now: Timestamp) -> Vec<Claim> {
    if board.config.accepts_claims() {
        return Vec::new();
    }
    let reason = meta("superseded_by", board.config.mode.as_str());
    let ids: Vec<ClaimId> = board
        .store
        .active_claims()
        .into_iter()
        .map(|c| c.claim_id)
        .collect();
    ids.iter()
        .filter_map(|id| board.store.transition(id, ClaimStatus::Superseded, now, Some(&reason)))
        .collect()
}

/// Replace the store's contents with `claims`. Extra active claims on an
/// occupied `(target, kind)` stay in the log as superseded; those are
/// returned.
fn adopt_claims(store: &mut ClaimStore, claims: Vec<Claim>, now: Timestamp) -> Vec<Claim> {
    let reason = meta("superseded_by", "duplicate");
    let mut superseded = Vec::new();
    for mut duplicate in store.replace_all(claims) {
        duplicate.transition(ClaimStatus::Superseded, now, Some(&reason));
        match store.insert(duplicate.clone()) {
            Ok(()) => superseded.push(duplicate),
            Err(refused) => {
                warn!(claim_id = %refused.claim_id, target_id = %refused.target_id, "Duplicate claim refused by store");
            }
        }
    }
    superseded
}
