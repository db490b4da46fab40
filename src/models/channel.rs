//! Channel configuration model
//!
//! A channel is a user-configured, looping 24-hour schedule synthesized from
//! a content source. The content source is a recursive tagged description;
//! it is validated structurally on import and on load, and malformed entries
//! are pruned rather than repaired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ChannelError;
use crate::utils::hash::{phase_seed_from_id, seed_from_id};

/// Maximum nesting depth of `Mixed` sources. Cyclic JSON-equivalent
/// structures cannot express within this bound and are rejected.
pub const MAX_SOURCE_DEPTH: usize = 25;

/// How resolved items are ordered onto the loop.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlaybackMode {
    /// Preserve resolved order
    #[default]
    Sequential,
    /// Deterministic seeded shuffle
    Shuffle,
    /// Reshuffled from the wall clock on every resolve
    Random,
}

/// How a mixed source combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MixMode {
    /// Round-robin by position across child lists
    #[default]
    Interleave,
    /// Concatenate child lists in order
    Sequential,
}

/// Library flavors a channel can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelLibraryType {
    Movie,
    Show,
}

/// A pre-resolved item carried inside a manual source. No upstream call is
/// made for these; `added_at` is deliberately not part of the tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualItem {
    pub rating_key: String,
    pub title: String,
    pub duration_ms: i64,
}

/// Tagged description of where a channel's items come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelContentSource {
    Library {
        library_id: String,
        library_type: ChannelLibraryType,
        #[serde(default)]
        include_watched: bool,
        /// Optional upstream filter fragment, e.g. `studio=310`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        library_filter: Option<String>,
    },
    Collection {
        collection_key: String,
        collection_name: String,
    },
    Show {
        show_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        season_filter: Option<BTreeSet<u32>>,
    },
    Playlist {
        playlist_key: String,
    },
    Manual {
        items: Vec<ManualItem>,
    },
    Mixed {
        sources: Vec<ChannelContentSource>,
        #[serde(default)]
        mix_mode: MixMode,
    },
}

impl ChannelContentSource {
    /// Structural validation with depth accounting.
    ///
    /// The same validator runs at import and at load; entries that fail are
    /// pruned by the caller, never repaired.
    pub fn validate(&self) -> Result<(), ChannelError> {
        self.validate_at_depth(0)
    }

    fn validate_at_depth(&self, depth: usize) -> Result<(), ChannelError> {
        if depth > MAX_SOURCE_DEPTH {
            return Err(ChannelError::invalid_source(format!(
                "mixed source nesting exceeds depth {MAX_SOURCE_DEPTH}"
            )));
        }
        match self {
            Self::Library { library_id, .. } => {
                if library_id.trim().is_empty() {
                    return Err(ChannelError::invalid_source("library source has no id"));
                }
            }
            Self::Collection { collection_key, .. } => {
                if collection_key.trim().is_empty() {
                    return Err(ChannelError::invalid_source("collection source has no key"));
                }
            }
            Self::Show { show_key, .. } => {
                if show_key.trim().is_empty() {
                    return Err(ChannelError::invalid_source("show source has no key"));
                }
            }
            Self::Playlist { playlist_key } => {
                if playlist_key.trim().is_empty() {
                    return Err(ChannelError::invalid_source("playlist source has no key"));
                }
            }
            Self::Manual { .. } => {}
            Self::Mixed { sources, .. } => {
                if sources.is_empty() {
                    return Err(ChannelError::invalid_source("mixed source has no children"));
                }
                for child in sources {
                    child.validate_at_depth(depth + 1)?;
                }
            }
        }
        Ok(())
    }

    /// Stable identity of what this source points at, ignoring presentation
    /// fields (names, playback mode). Used for plan diffing and merge
    /// matching.
    pub fn essence(&self) -> String {
        match self {
            Self::Library {
                library_id,
                library_type,
                library_filter,
                ..
            } => match library_filter {
                Some(filter) => format!("library:{library_id}:{library_type}:{filter}"),
                None => format!("library:{library_id}:{library_type}"),
            },
            Self::Collection { collection_key, .. } => format!("collection:{collection_key}"),
            Self::Show {
                show_key,
                season_filter,
            } => match season_filter {
                Some(seasons) => {
                    let seasons: Vec<String> = seasons.iter().map(u32::to_string).collect();
                    format!("show:{show_key}:s={}", seasons.join(","))
                }
                None => format!("show:{show_key}"),
            },
            Self::Playlist { playlist_key } => format!("playlist:{playlist_key}"),
            Self::Manual { items } => {
                let keys: Vec<&str> = items.iter().map(|i| i.rating_key.as_str()).collect();
                format!("manual:{}", keys.join(","))
            }
            Self::Mixed { sources, mix_mode } => {
                let parts: Vec<String> = sources.iter().map(Self::essence).collect();
                format!("mixed:{mix_mode}:[{}]", parts.join("|"))
            }
        }
    }
}

/// Fields a content filter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterField {
    Year,
    Rating,
    ContentRating,
    Genre,
    Director,
    Duration,
    Watched,
    AddedAt,
}

/// Comparison operators for content filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
}

/// Filter operand. Untagged so persisted filters read naturally
/// (`{"field":"year","op":"gte","value":1990}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

/// One predicate over a resolved item. Multiple filters AND together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFilter {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// Total orders available for resolved item lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortOrder {
    TitleAsc,
    TitleDesc,
    YearAsc,
    YearDesc,
    DurationAsc,
    DurationDesc,
    AddedAsc,
    AddedDesc,
    /// Season ascending, then episode ascending; missing components sort as 0
    EpisodeOrder,
}

/// A stored channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: Uuid,
    pub number: u16,
    pub name: String,
    pub content_source: ChannelContentSource,
    #[serde(default)]
    pub playback_mode: PlaybackMode,
    #[serde(default)]
    pub shuffle_seed: u32,
    #[serde(default)]
    pub phase_seed: u32,
    /// Absolute millisecond timestamp the schedule is referenced to
    #[serde(default)]
    pub start_time_anchor: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_filters: Vec<ContentFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_episode_runtime_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_episode_runtime_ms: Option<i64>,
    #[serde(default)]
    pub skip_intros: bool,
    #[serde(default)]
    pub skip_credits: bool,
    #[serde(default)]
    pub is_auto_generated: bool,
    /// Derived caches, refreshed on resolve
    #[serde(default)]
    pub item_count: usize,
    #[serde(default)]
    pub total_duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_content_refresh: Option<DateTime<Utc>>,
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ChannelConfig {
    /// Build a fully hydrated channel from a draft, deriving seeds from the
    /// id when the draft leaves them unset.
    pub fn from_draft(draft: ChannelDraft, number: u16, now: DateTime<Utc>) -> Result<Self, ChannelError> {
        let id = Uuid::new_v4();
        let source = draft
            .content_source
            .ok_or(ChannelError::ContentSourceRequired)?;
        let name = draft
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Channel {number}"));
        Ok(Self {
            id,
            number,
            name,
            content_source: source,
            playback_mode: draft.playback_mode.unwrap_or_default(),
            shuffle_seed: draft.shuffle_seed.unwrap_or_else(|| seed_from_id(&id)),
            phase_seed: draft.phase_seed.unwrap_or_else(|| phase_seed_from_id(&id)),
            start_time_anchor: draft.start_time_anchor.unwrap_or(0),
            content_filters: draft.content_filters,
            sort_order: draft.sort_order,
            min_episode_runtime_ms: draft.min_episode_runtime_ms,
            max_episode_runtime_ms: draft.max_episode_runtime_ms,
            skip_intros: draft.skip_intros,
            skip_credits: draft.skip_credits,
            is_auto_generated: draft.is_auto_generated,
            item_count: 0,
            total_duration_ms: 0,
            last_content_refresh: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Re-derive missing seeds. Used by the tolerant loader and import path.
    pub fn normalize_seeds(&mut self, shuffle_present: bool, phase_present: bool) {
        if !shuffle_present {
            self.shuffle_seed = seed_from_id(&self.id);
        }
        if !phase_present {
            self.phase_seed = phase_seed_from_id(&self.id);
        }
    }
}

/// Creation request; everything except the content source is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_source: Option<ChannelContentSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_mode: Option<PlaybackMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_seed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_anchor: Option<i64>,
    #[serde(default)]
    pub content_filters: Vec<ContentFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_episode_runtime_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_episode_runtime_ms: Option<i64>,
    #[serde(default)]
    pub skip_intros: bool,
    #[serde(default)]
    pub skip_credits: bool,
    #[serde(default)]
    pub is_auto_generated: bool,
}

/// Partial update applied by `update_channel`. `id` and `created_at` are not
/// patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_source: Option<ChannelContentSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_mode: Option<PlaybackMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_seed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_anchor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filters: Option<Vec<ContentFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<Option<SortOrder>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_episode_runtime_ms: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_episode_runtime_ms: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_intros: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_credits: Option<bool>,
}
