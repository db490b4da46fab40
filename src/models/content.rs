//! Resolved content model
//!
//! The resolver turns a content source into [`ResolvedContentItem`]s; the
//! channel manager wraps the filtered, ordered list in a
//! [`ResolvedChannelContent`] and caches it per channel.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kind of a playable (or container) media entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Show,
    Episode,
    Track,
    Clip,
}

/// Technical stream details surfaced to the player UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTechInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub hdr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_track_title: Option<String>,
}

/// One playable item on a channel. Show containers are never emitted; the
/// resolver expands them to episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContentItem {
    pub rating_key: String,
    pub kind: MediaKind,
    pub title: String,
    /// `"Show - SxxEyy - Episode"` for episodes, plain title otherwise
    pub full_title: String,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_rating: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
    /// Unix milliseconds the item was added to the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
    /// Final zero-based position in the ordered list
    #[serde(default)]
    pub scheduled_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_info: Option<MediaTechInfo>,
}

impl ResolvedContentItem {
    /// Compose the display title for an episode from its parent metadata.
    pub fn episode_full_title(show: &str, season: u32, episode: u32, title: &str) -> String {
        format!("{show} - S{season:02}E{episode:02} - {title}")
    }
}

/// Why cached content was (or was not) served.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CacheReason {
    #[default]
    Fresh,
    NetworkError,
    ContentUnavailable,
}

/// The filtered, sorted, ordered item list for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedChannelContent {
    pub channel_id: Uuid,
    /// Unix milliseconds the resolve completed
    pub resolved_at: i64,
    /// Items after filtering and sorting, before playback-mode ordering
    pub items: Vec<ResolvedContentItem>,
    /// Items after playback-mode ordering; this is what schedules consume
    pub ordered_items: Vec<ResolvedContentItem>,
    pub total_duration_ms: i64,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default)]
    pub is_stale: bool,
    #[serde(default)]
    pub cache_reason: CacheReason,
}

impl ResolvedChannelContent {
    /// Age of this result relative to `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.resolved_at)
    }
}
