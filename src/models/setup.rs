//! Channel setup model
//!
//! Bulk channel creation: a setup run plans candidate channels from the
//! catalog by strategy, diffs against the existing lineup, builds into an
//! ephemeral store and applies under a build mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumString};

use crate::models::channel::{ChannelContentSource, ContentFilter, PlaybackMode, SortOrder};

/// Channel-generation strategies, applied in this order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SetupStrategy {
    Playlists,
    Collections,
    LibraryFallback,
    Genres,
    Directors,
    Decades,
    RuntimeBuckets,
    RecentlyAdded,
    Studios,
    Actors,
}

/// How studio and actor directory scans are combined.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorStudioCombineMode {
    /// Studios and actors each get their own channel pool
    #[default]
    Separate,
    /// One merged tag pool, capped together
    Combined,
}

/// Semantics of applying a built plan to the existing lineup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BuildMode {
    /// The built list becomes the lineup verbatim
    #[default]
    Replace,
    /// Existing channels kept; new ones appended on free numbers
    Append,
    /// Identity-matched channels rewritten in place, the rest appended
    Merge,
}

/// Normalized configuration for one setup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSetupConfig {
    pub server_id: String,
    pub selected_library_ids: Vec<String>,
    pub enabled_strategies: BTreeSet<SetupStrategy>,
    #[serde(default)]
    pub actor_studio_combine_mode: ActorStudioCombineMode,
    #[serde(default)]
    pub build_mode: BuildMode,
    pub max_channels: usize,
    pub min_items_per_channel: usize,
}

impl ChannelSetupConfig {
    pub fn strategy_enabled(&self, strategy: SetupStrategy) -> bool {
        self.enabled_strategies.contains(&strategy)
    }
}

/// A candidate channel produced by the planner, not yet in any store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChannel {
    pub name: String,
    pub content_source: ChannelContentSource,
    pub playback_mode: PlaybackMode,
    /// Derived by FNV-1a over a stable strategy key, so reruns produce the
    /// same shuffle order for the same source
    pub shuffle_seed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_filters: Vec<ContentFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    pub strategy: SetupStrategy,
    pub is_auto_generated: bool,
}

/// Per-strategy channel counts for the preview surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupEstimates {
    pub by_strategy: Vec<(SetupStrategy, usize)>,
    pub total: usize,
}

impl SetupEstimates {
    pub fn record(&mut self, strategy: SetupStrategy, count: usize) {
        if count == 0 {
            return;
        }
        match self.by_strategy.iter_mut().find(|(s, _)| *s == strategy) {
            Some((_, existing)) => *existing += count,
            None => self.by_strategy.push((strategy, count)),
        }
        self.total += count;
    }
}

/// Planner output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelPlan {
    pub pending: Vec<PendingChannel>,
    pub estimates: SetupEstimates,
    pub warnings: Vec<String>,
    pub reached_max_channels: bool,
}

/// Pairing of an existing channel with the plan entry it matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMatch {
    pub existing_id: uuid::Uuid,
    pub pending_index: usize,
}

/// Diff of a plan against the current lineup, keyed by content identity.
/// Playback-mode or sort-order changes alone do not mark a channel created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanDiff {
    /// Pending indexes with no existing counterpart
    pub created: Vec<usize>,
    /// Existing channel ids with no planned counterpart
    pub removed: Vec<uuid::Uuid>,
    /// Existing channel ids whose identity also appears in the plan
    pub unchanged: Vec<uuid::Uuid>,
    pub matched_pairs: Vec<PlanMatch>,
}

/// Phases a setup run reports progress for, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SetupTask {
    FetchPlaylists,
    FetchCollections,
    ScanLibraryItems,
    BuildPending,
    CreateChannels,
    ApplyChannels,
    RefreshEpg,
    Done,
}

/// One progress event from the setup coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupProgress {
    pub task: SetupTask,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub current: u64,
    /// `None` when the total is not yet known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Outcome of a setup run, including cancelled ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBuildSummary {
    pub canceled: bool,
    pub last_task: SetupTask,
    pub created: usize,
    pub skipped: usize,
    pub error_count: usize,
}

/// Per-server marker that initial setup completed, with the config used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupRecord {
    pub server_id: String,
    pub selected_library_ids: Vec<String>,
    pub enabled_strategies: BTreeSet<SetupStrategy>,
    pub actor_studio_combine_mode: ActorStudioCombineMode,
    pub build_mode: BuildMode,
    pub max_channels: usize,
    pub min_items_per_channel: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SetupRecord {
    pub fn from_config(config: &ChannelSetupConfig, now: DateTime<Utc>) -> Self {
        Self {
            server_id: config.server_id.clone(),
            selected_library_ids: config.selected_library_ids.clone(),
            enabled_strategies: config.enabled_strategies.clone(),
            actor_studio_combine_mode: config.actor_studio_combine_mode,
            build_mode: config.build_mode,
            max_channels: config.max_channels,
            min_items_per_channel: config.min_items_per_channel,
            created_at: now,
            updated_at: now,
        }
    }
}
