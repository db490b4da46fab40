//! Media catalog collaborator
//!
//! The engine never talks HTTP or parses server responses; it consumes this
//! trait. Implementations map their transport failures onto
//! [`CatalogError`] variants so the manager's fallback tiers can classify
//! them. Every field on [`MediaItem`] may be absent; consumers fall back
//! per the resolver rules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::errors::CatalogError;
use crate::models::content::MediaKind;

/// Library flavor as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LibraryKind {
    Movie,
    Show,
    Music,
    Photo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub id: String,
    pub title: String,
    pub kind: LibraryKind,
    /// Item count cached by the server; may be stale
    #[serde(default)]
    pub content_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub rating_key: String,
    pub title: String,
    #[serde(default)]
    pub child_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub rating_key: String,
    pub title: String,
    /// Number of leaf (playable) items
    #[serde(default)]
    pub leaf_count: usize,
    #[serde(default)]
    pub duration_ms: i64,
}

/// One entry from a tag directory endpoint (studios, actors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDirectoryItem {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub count: usize,
    /// Server-relative shortcut URL; carries the filter query for the tag
    #[serde(default)]
    pub fast_key: Option<String>,
}

/// One stream within a media part.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamInfo {
    /// 1 = video, 2 = audio, 3 = subtitle (catalog convention)
    pub stream_type: u8,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub channels: Option<u16>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub hdr: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaPart {
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

/// Technical description of one version of a media item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaVersion {
    #[serde(default)]
    pub video_resolution: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
    #[serde(default)]
    pub audio_channels: Option<u16>,
    #[serde(default)]
    pub parts: Vec<MediaPart>,
}

/// A catalog media entry. Everything beyond `rating_key`/`kind`/`title` is
/// optional and tolerated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub rating_key: String,
    pub kind: MediaKind,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub thumb: Option<String>,
    /// Show title for an episode
    #[serde(default)]
    pub grandparent_title: Option<String>,
    /// Season title for an episode
    #[serde(default)]
    pub parent_title: Option<String>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub content_rating: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Unix milliseconds
    #[serde(default)]
    pub added_at: Option<i64>,
    #[serde(default)]
    pub grandparent_rating_key: Option<String>,
    #[serde(default)]
    pub parent_rating_key: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaVersion>,
}

impl MediaItem {
    pub fn is_watched(&self) -> Option<bool> {
        self.view_count.map(|count| count > 0)
    }
}

/// Options for library item listing.
#[derive(Debug, Clone, Default)]
pub struct LibraryItemsQuery {
    /// Upstream filter fragment, e.g. `studio=310` or `type=4`
    pub filter: Option<String>,
    pub limit: Option<usize>,
}

/// The upstream media catalog.
///
/// All calls accept a cancellation token; implementations abandon in-flight
/// work when it fires and return promptly (the returned error is ignored on
/// that path).
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn get_libraries(&self, token: &CancellationToken)
    -> Result<Vec<LibraryInfo>, CatalogError>;

    async fn get_library_items(
        &self,
        library_id: &str,
        query: &LibraryItemsQuery,
        token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError>;

    async fn get_library_item_count(
        &self,
        library_id: &str,
        filter: Option<&str>,
        token: &CancellationToken,
    ) -> Result<usize, CatalogError>;

    async fn get_collections(
        &self,
        library_id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Collection>, CatalogError>;

    async fn get_collection_items(
        &self,
        collection_key: &str,
        token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError>;

    async fn get_playlists(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<PlaylistInfo>, CatalogError>;

    async fn get_playlist_items(
        &self,
        playlist_key: &str,
        token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError>;

    async fn get_show_episodes(
        &self,
        show_rating_key: &str,
        token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError>;

    /// Actor tag directory for a library. Servers without the endpoint
    /// return [`CatalogError::Unsupported`].
    async fn get_actors(
        &self,
        library_id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<TagDirectoryItem>, CatalogError>;

    /// Studio tag directory for a library.
    async fn get_studios(
        &self,
        library_id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<TagDirectoryItem>, CatalogError>;
}
