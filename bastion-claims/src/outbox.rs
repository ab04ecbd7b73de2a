//! Local mutations waiting to be pushed to the authority.

use std::collections::VecDeque;

use bastion_core::{Claim, TargetNote, WarConfig};
use serde::{Deserialize, Serialize};

/// One accepted local change, carried as the full new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClaimMutation {
    ClaimUpserted { claim: Claim },
    NoteSet { note: TargetNote },
    WarConfigSet { config: WarConfig },
}

impl ClaimMutation {
    pub fn op(&self) -> &'static str {
        match self {
            ClaimMutation::ClaimUpserted { .. } => "claim_upserted",
            ClaimMutation::NoteSet { .. } => "note_set",
            ClaimMutation::WarConfigSet { .. } => "war_config_set",
        }
    }
}

/// FIFO of pending mutations.
#[derive(Debug, Default, Clone)]
pub struct Outbox {
    queue: VecDeque<ClaimMutation>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: ClaimMutation) {
        self.queue.push_back(mutation);
    }

    pub fn drain(&mut self) -> Vec<ClaimMutation> {
        self.queue.drain(..).collect()
    }

    /// Put a failed batch back ahead of anything queued since.
    pub fn requeue_front(&mut self, batch: Vec<ClaimMutation>) {
        for mutation in batch.into_iter().rev() {
            self.queue.push_front(mutation);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
