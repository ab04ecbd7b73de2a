//! Claim board persistence.

use bastion_core::{Claim, StorageError, TargetNote, WarConfig};
use bastion_storage::records::{CLAIMS_KEY, NOTES_KEY, WAR_CONFIG_KEY};
use bastion_storage::{load_record, save_record, DurableStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::service::ClaimArbiter;

/// Everything the arbiter persists: claims, war config and notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimBoard {
    pub claims: Vec<Claim>,
    pub war_config: WarConfig,
    pub notes: Vec<TargetNote>,
}

impl ClaimArbiter {
    /// Write claims, war config and notes as three records.
    pub async fn save_board(&self, store: &dyn DurableStore) -> Result<(), StorageError> {
        let board = self.board();
        save_record(store, CLAIMS_KEY, &board.claims).await?;
        save_record(store, WAR_CONFIG_KEY, &board.war_config).await?;
        save_record(store, NOTES_KEY, &board.notes).await?;
        Ok(())
    }

    /// Load a saved board. Returns `false` when nothing was saved; missing
    /// records fall back to the current local value.
    pub async fn load_board(&self, store: &dyn DurableStore) -> Result<bool, StorageError> {
        let claims: Option<Vec<Claim>> = load_record(store, CLAIMS_KEY).await?;
        let war_config: Option<WarConfig> = load_record(store, WAR_CONFIG_KEY).await?;
        let notes: Option<Vec<TargetNote>> = load_record(store, NOTES_KEY).await?;
        if claims.is_none() && war_config.is_none() && notes.is_none() {
            return Ok(false);
        }

        let current = self.board();
        let board = ClaimBoard {
            claims: claims.unwrap_or(current.claims),
            war_config: war_config.unwrap_or(current.war_config),
            notes: notes.unwrap_or(current.notes),
        };
        info!(
            claims = board.claims.len(),
            notes = board.notes.len(),
            mode = board.war_config.mode.as_str(),
            "Claim board restored"
        );
        self.restore_board(board);
        Ok(true)
    }
}
