//! Cosmetic Unlock Queue
//!
//! After a roster save, characters fielded at the unlock level may unlock
//! their avatar or portrait. The check runs off the request path: the
//! engine hands an [`UnlockTask`] to the [`UnlockQueue`] and returns, and a
//! supervised [`UnlockWorker`] applies it. Every task produces an
//! [`UnlockReport`] on the report channel; failures are also logged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::store::{
    with_transaction, CharacterId, CosmeticUnlock, MatchId, OwnerId, Store, StoreError, UnlockKind,
    UNLOCK_BY_MAX_LEVEL,
};

/// Unlock work for one roster save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockTask {
    /// Lineup owner.
    pub owner: OwnerId,
    /// Match the lineup was saved in.
    pub match_id: MatchId,
    /// (character, level) of every fielded slot.
    pub fielded: Vec<(CharacterId, u8)>,
}

/// Unlock failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnlockError {
    /// Fielded character missing from the catalog.
    #[error("unknown character {0}")]
    UnknownCharacter(CharacterId),
    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The blocking job panicked or was cancelled.
    #[error("unlock job aborted: {0}")]
    Aborted(String),
}

/// Outcome of one processed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockReport {
    /// Task applied; lists newly recorded unlocks (possibly none).
    Applied {
        /// Lineup owner.
        owner: OwnerId,
        /// New unlocks.
        unlocked: Vec<CosmeticUnlock>,
    },
    /// Task failed; nothing was written.
    Failed {
        /// Lineup owner.
        owner: OwnerId,
        /// Failure.
        error: UnlockError,
    },
}

/// Apply one task in a single transaction.
pub fn apply_unlocks(
    store: &dyn Store,
    task: &UnlockTask,
    unlock_level: u8,
) -> Result<Vec<CosmeticUnlock>, UnlockError> {
    with_transaction(store, |tx| -> Result<Vec<CosmeticUnlock>, UnlockError> {
        let mut unlocked = Vec::new();
        for &(character_id, level) in &task.fielded {
            if level != unlock_level {
                continue;
            }
            let character = tx
                .character(character_id)?
                .ok_or(UnlockError::UnknownCharacter(character_id))?;

            let kinds = [
                (UnlockKind::Avatar, character.avatar_unlock_type),
                (UnlockKind::Portrait, character.portrait_unlock_type),
            ];
            for (kind, unlock_type) in kinds {
                if unlock_type != UNLOCK_BY_MAX_LEVEL {
                    continue;
                }
                let unlock = CosmeticUnlock {
                    owner: task.owner.clone(),
                    kind,
                    character_id,
                };
                if !tx.has_cosmetic_unlock(&unlock)? {
                    tx.insert_cosmetic_unlock(unlock.clone())?;
                    unlocked.push(unlock);
                }
            }
        }
        Ok(unlocked)
    })
}

/// Sending half handed to the engine.
#[derive(Debug, Clone)]
pub struct UnlockQueue {
    tasks: mpsc::UnboundedSender<UnlockTask>,
}

impl UnlockQueue {
    /// Create a queue, its worker, and the worker's report channel.
    pub fn channel(
        store: Arc<dyn Store>,
        unlock_level: u8,
    ) -> (UnlockQueue, UnlockWorker, mpsc::UnboundedReceiver<UnlockReport>) {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let worker = UnlockWorker {
            store,
            unlock_level,
            tasks: task_rx,
            reports: report_tx,
        };
        (UnlockQueue { tasks: task_tx }, worker, report_rx)
    }

    /// Hand a task to the worker without waiting. Returns false if the
    /// worker is gone; the task is dropped and a warning logged.
    pub fn dispatch(&self, task: UnlockTask) -> bool {
        match self.tasks.send(task) {
            Ok(()) => true,
            Err(mpsc::error::SendError(task)) => {
                warn!(owner = %task.owner, match_id = %task.match_id, "unlock worker unavailable, task dropped");
                false
            }
        }
    }
}

/// Receiving half; runs tasks one at a time until every queue handle is dropped.
pub struct UnlockWorker {
    store: Arc<dyn Store>,
    unlock_level: u8,
    tasks: mpsc::UnboundedReceiver<UnlockTask>,
    reports: mpsc::UnboundedSender<UnlockReport>,
}

impl UnlockWorker {
    /// Run on the current task.
    pub async fn run(mut self) {
        debug!("unlock worker started");
        while let Some(task) = self.tasks.recv().await {
            let report = self.process(task).await;
            // Nobody listening is fine; the failure was already logged.
            let _ = self.reports.send(report);
        }
        info!("unlock worker stopped");
    }

    /// Spawn onto the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn process(&self, task: UnlockTask) -> UnlockReport {
        let owner = task.owner.clone();
        let match_id = task.match_id;
        let store = self.store.clone();
        let unlock_level = self.unlock_level;

        let result =
            tokio::task::spawn_blocking(move || apply_unlocks(store.as_ref(), &task, unlock_level))
                .await
                .unwrap_or_else(|e| Err(UnlockError::Aborted(e.to_string())));

        match result {
            Ok(unlocked) => {
                if !unlocked.is_empty() {
                    info!(owner = %owner, match_id = %match_id, count = unlocked.len(), "cosmetics unlocked");
                }
                UnlockReport::Applied { owner, unlocked }
            }
            Err(error) => {
                error!(owner = %owner, match_id = %match_id, error = %error, "cosmetic unlock failed");
                UnlockReport::Failed { owner, error }
            }
        }
    }
}
