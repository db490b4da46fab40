//! Per-server setup records
//!
//! Presence of a record marks that initial channel setup completed for that
//! server. A rerun can be requested explicitly; the flag survives restarts
//! and clears when setup completes again.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::models::setup::{ChannelSetupConfig, SetupRecord};
use crate::storage::SharedStorage;

const RECORD_PREFIX: &str = "retune_setup_v1";

pub struct SetupRecordStore {
    storage: SharedStorage,
}

impl SetupRecordStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    fn record_key(server_id: &str) -> String {
        format!("{RECORD_PREFIX}:{server_id}")
    }

    fn rerun_key(server_id: &str) -> String {
        format!("{RECORD_PREFIX}:{server_id}:rerun")
    }

    /// Record setup completion, preserving the original `created_at` across
    /// reruns, and clear any pending rerun request.
    pub async fn mark_setup_complete(
        &self,
        config: &ChannelSetupConfig,
        now: DateTime<Utc>,
    ) -> Result<SetupRecord, StorageError> {
        let mut record = SetupRecord::from_config(config, now);
        if let Some(previous) = self.load(&config.server_id).await {
            record.created_at = previous.created_at;
        }
        let raw = serde_json::to_string(&record)?;
        self.storage
            .put(&Self::record_key(&config.server_id), &raw)
            .await?;
        self.storage
            .remove(&Self::rerun_key(&config.server_id))
            .await?;
        debug!(server_id = %config.server_id, "setup marked complete");
        Ok(record)
    }

    /// Load the record for a server; an unreadable record reads as absent.
    pub async fn load(&self, server_id: &str) -> Option<SetupRecord> {
        let raw = match self.storage.get(&Self::record_key(server_id)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(server_id, error = %e, "failed to read setup record");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(server_id, error = %e, "setup record is invalid; treating as absent");
                None
            }
        }
    }

    /// Ask for setup to run again on the next opportunity.
    pub async fn request_rerun(&self, server_id: &str) -> Result<(), StorageError> {
        self.storage.put(&Self::rerun_key(server_id), "1").await
    }

    pub async fn rerun_requested(&self, server_id: &str) -> bool {
        matches!(
            self.storage.get(&Self::rerun_key(server_id)).await,
            Ok(Some(_))
        )
    }

    /// Whether initial setup should run: no ready manager, an empty lineup,
    /// no (valid) record, or an explicit rerun request.
    pub async fn should_run_channel_setup(
        &self,
        server_id: &str,
        manager_ready: bool,
        channel_count: usize,
    ) -> bool {
        if !manager_ready || channel_count == 0 {
            return true;
        }
        if self.rerun_requested(server_id).await {
            return true;
        }
        self.load(server_id).await.is_none()
    }
}
