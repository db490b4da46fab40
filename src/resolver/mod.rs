//! Content resolution
//!
//! Turns a channel's content-source description into a normalized list of
//! playable items. Show containers are always expanded to episodes (or
//! dropped); episodes missing parent metadata are decorated from a bounded,
//! TTL'd show-list fetch per library section. Catalog errors propagate
//! unchanged so the manager's fallback tiers can classify them.

pub mod filters;
pub mod playback;
pub mod sort;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::{CatalogProvider, LibraryItemsQuery, MediaItem};
use crate::clock::SharedClock;
use crate::errors::ContentError;
use crate::models::channel::{ChannelContentSource, ChannelLibraryType, ManualItem, MixMode};
use crate::models::content::{MediaKind, MediaTechInfo, ResolvedContentItem};

/// Upper bound on one show-decoration fetch per library section.
const SHOW_DECORATION_FETCH_LIMIT: usize = 500;

/// Parent-show metadata propagated onto episodes that lack it.
#[derive(Debug, Clone, Default)]
struct ShowMeta {
    year: Option<i32>,
    content_rating: Option<String>,
    genres: Vec<String>,
    directors: Vec<String>,
}

impl ShowMeta {
    fn from_media(item: &MediaItem) -> Self {
        Self {
            year: item.year,
            content_rating: item.content_rating.clone(),
            genres: item.genres.clone(),
            directors: item.directors.clone(),
        }
    }
}

#[derive(Debug)]
struct DecorationEntry {
    fetched_at_ms: i64,
    shows: HashMap<String, ShowMeta>,
}

/// Resolves content sources against a catalog.
pub struct ContentResolver<C: CatalogProvider> {
    catalog: Arc<C>,
    clock: SharedClock,
    decoration_ttl: Duration,
    decorations: Mutex<HashMap<String, DecorationEntry>>,
}

impl<C: CatalogProvider> ContentResolver<C> {
    pub fn new(catalog: Arc<C>, clock: SharedClock, decoration_ttl: Duration) -> Self {
        Self {
            catalog,
            clock,
            decoration_ttl,
            decorations: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a source into playable items.
    ///
    /// The returned list is normalized: no show containers, positive
    /// durations, `scheduled_index` rewritten to a dense `0..n`.
    pub async fn resolve_source(
        &self,
        source: &ChannelContentSource,
        token: &CancellationToken,
    ) -> Result<Vec<ResolvedContentItem>, ContentError> {
        source
            .validate()
            .map_err(|e| ContentError::invalid_source(e.to_string()))?;
        ensure_live(token)?;

        let mut items = self.resolve_at_depth(source, token, 0).await?;

        // Second-pass safety net: anything still shaped like a container is
        // dropped rather than scheduled.
        items.retain(|item| {
            if item.kind == MediaKind::Show {
                warn!(rating_key = %item.rating_key, title = %item.title,
                      "dropping unexpanded show container from resolved list");
                false
            } else {
                true
            }
        });
        playback::reindex(&mut items);
        Ok(items)
    }

    async fn resolve_at_depth(
        &self,
        source: &ChannelContentSource,
        token: &CancellationToken,
        depth: usize,
    ) -> Result<Vec<ResolvedContentItem>, ContentError> {
        ensure_live(token)?;
        match source {
            ChannelContentSource::Library {
                library_id,
                library_type,
                include_watched,
                library_filter,
            } => {
                self.resolve_library(
                    library_id,
                    *library_type,
                    *include_watched,
                    library_filter.as_deref(),
                    token,
                )
                .await
            }
            ChannelContentSource::Collection { collection_key, .. } => {
                self.resolve_collection(collection_key, token).await
            }
            ChannelContentSource::Show {
                show_key,
                season_filter,
            } => {
                let episodes = self.catalog.get_show_episodes(show_key, token).await?;
                ensure_live(token)?;
                let retained = episodes.iter().filter(|ep| match season_filter {
                    Some(seasons) => ep
                        .season_number
                        .map(|s| seasons.contains(&s))
                        .unwrap_or(false),
                    None => true,
                });
                Ok(retained.filter_map(|ep| media_to_item(ep, None)).collect())
            }
            ChannelContentSource::Playlist { playlist_key } => {
                let items = self.catalog.get_playlist_items(playlist_key, token).await?;
                ensure_live(token)?;
                Ok(items.iter().filter_map(|i| media_to_item(i, None)).collect())
            }
            ChannelContentSource::Manual { items } => Ok(synthesize_manual(items)),
            ChannelContentSource::Mixed { sources, mix_mode } => {
                let mut children = Vec::with_capacity(sources.len());
                for child in sources {
                    let resolved =
                        Box::pin(self.resolve_at_depth(child, token, depth + 1)).await?;
                    children.push(resolved);
                }
                Ok(match mix_mode {
                    MixMode::Sequential => children.into_iter().flatten().collect(),
                    MixMode::Interleave => interleave(children),
                })
            }
        }
    }

    async fn resolve_library(
        &self,
        library_id: &str,
        library_type: ChannelLibraryType,
        include_watched: bool,
        library_filter: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Vec<ResolvedContentItem>, ContentError> {
        let filter = match library_type {
            ChannelLibraryType::Show => Some(merge_filter(library_filter, "type=episode")),
            ChannelLibraryType::Movie => library_filter.map(str::to_string),
        };
        let query = LibraryItemsQuery {
            filter,
            limit: None,
        };
        let fetched = self
            .catalog
            .get_library_items(library_id, &query, token)
            .await?;
        ensure_live(token)?;

        let decorations = if library_type == ChannelLibraryType::Show {
            self.show_decorations(library_id, token).await?
        } else {
            HashMap::new()
        };

        let mut out = Vec::with_capacity(fetched.len());
        for media in &fetched {
            if !include_watched && media.is_watched() == Some(true) {
                continue;
            }
            let meta = media
                .grandparent_rating_key
                .as_deref()
                .and_then(|key| decorations.get(key));
            if let Some(item) = media_to_item(media, meta) {
                out.push(item);
            }
        }
        debug!(
            library_id,
            fetched = fetched.len(),
            resolved = out.len(),
            "resolved library source"
        );
        Ok(out)
    }

    async fn resolve_collection(
        &self,
        collection_key: &str,
        token: &CancellationToken,
    ) -> Result<Vec<ResolvedContentItem>, ContentError> {
        let members = self
            .catalog
            .get_collection_items(collection_key, token)
            .await?;
        ensure_live(token)?;

        let mut out = Vec::with_capacity(members.len());
        for member in &members {
            if member.kind == MediaKind::Show {
                let meta = ShowMeta::from_media(member);
                let episodes = self
                    .catalog
                    .get_show_episodes(&member.rating_key, token)
                    .await?;
                ensure_live(token)?;
                out.extend(
                    episodes
                        .iter()
                        .filter_map(|ep| media_to_item(ep, Some(&meta))),
                );
            } else if let Some(item) = media_to_item(member, None) {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Parent-show metadata for one library, fetched at most once per TTL.
    /// Decoration failures degrade to undecorated episodes; cancellation
    /// still aborts.
    async fn show_decorations(
        &self,
        library_id: &str,
        token: &CancellationToken,
    ) -> Result<HashMap<String, ShowMeta>, ContentError> {
        let now_ms = self.clock.now_ms();
        let ttl_ms = self.decoration_ttl.as_millis() as i64;

        {
            let cache = self.decorations.lock().await;
            if let Some(entry) = cache.get(library_id)
                && now_ms - entry.fetched_at_ms <= ttl_ms
            {
                return Ok(entry.shows.clone());
            }
        }

        let query = LibraryItemsQuery {
            filter: Some("type=show".to_string()),
            limit: Some(SHOW_DECORATION_FETCH_LIMIT),
        };
        let shows = match self
            .catalog
            .get_library_items(library_id, &query, token)
            .await
        {
            Ok(shows) => shows,
            Err(e) => {
                ensure_live(token)?;
                warn!(library_id, error = %e, "show decoration fetch failed; episodes stay undecorated");
                return Ok(HashMap::new());
            }
        };
        ensure_live(token)?;

        let map: HashMap<String, ShowMeta> = shows
            .iter()
            .map(|show| (show.rating_key.clone(), ShowMeta::from_media(show)))
            .collect();
        self.decorations.lock().await.insert(
            library_id.to_string(),
            DecorationEntry {
                fetched_at_ms: now_ms,
                shows: map.clone(),
            },
        );
        Ok(map)
    }
}

fn ensure_live(token: &CancellationToken) -> Result<(), ContentError> {
    if token.is_cancelled() {
        Err(ContentError::Aborted)
    } else {
        Ok(())
    }
}

fn merge_filter(existing: Option<&str>, extra: &str) -> String {
    match existing {
        Some(existing) if !existing.is_empty() => format!("{existing}&{extra}"),
        _ => extra.to_string(),
    }
}

/// Round-robin by position across child lists.
fn interleave(children: Vec<Vec<ResolvedContentItem>>) -> Vec<ResolvedContentItem> {
    let total: usize = children.iter().map(Vec::len).sum();
    let longest = children.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(total);
    let mut iters: Vec<_> = children.into_iter().map(Vec::into_iter).collect();
    for _ in 0..longest {
        for iter in &mut iters {
            if let Some(item) = iter.next() {
                out.push(item);
            }
        }
    }
    out
}

/// Manual tuples carry no media type; they surface as clips.
fn synthesize_manual(items: &[ManualItem]) -> Vec<ResolvedContentItem> {
    items
        .iter()
        .filter(|entry| {
            !entry.rating_key.trim().is_empty()
                && !entry.title.trim().is_empty()
                && entry.duration_ms > 0
        })
        .map(|entry| ResolvedContentItem {
            rating_key: entry.rating_key.clone(),
            kind: MediaKind::Clip,
            title: entry.title.clone(),
            full_title: entry.title.clone(),
            duration_ms: entry.duration_ms,
            thumb: None,
            year: None,
            season_number: None,
            episode_number: None,
            rating: None,
            content_rating: None,
            genres: vec![],
            directors: vec![],
            watched: None,
            added_at: None,
            scheduled_index: 0,
            media_info: None,
        })
        .collect()
}

/// Convert a catalog entry into a resolved item, applying parent-show
/// decoration where the entry's own metadata is missing. Entries without a
/// positive duration are dropped.
fn media_to_item(media: &MediaItem, meta: Option<&ShowMeta>) -> Option<ResolvedContentItem> {
    let duration_ms = media.duration_ms.filter(|d| *d > 0)?;

    let full_title = match (media.kind, &media.grandparent_title) {
        (MediaKind::Episode, Some(show)) => {
            let season = media.season_number.unwrap_or(0);
            let episode = media.episode_number.unwrap_or(0);
            ResolvedContentItem::episode_full_title(show, season, episode, &media.title)
        }
        _ => media.title.clone(),
    };

    let genres = if media.genres.is_empty() {
        meta.map(|m| m.genres.clone()).unwrap_or_default()
    } else {
        media.genres.clone()
    };
    let directors = if media.directors.is_empty() {
        meta.map(|m| m.directors.clone()).unwrap_or_default()
    } else {
        media.directors.clone()
    };
    let content_rating = media
        .content_rating
        .clone()
        .or_else(|| meta.and_then(|m| m.content_rating.clone()));
    let year = media.year.or_else(|| meta.and_then(|m| m.year));

    Some(ResolvedContentItem {
        rating_key: media.rating_key.clone(),
        kind: media.kind,
        title: media.title.clone(),
        full_title,
        duration_ms,
        thumb: media.thumb.clone(),
        year,
        season_number: media.season_number,
        episode_number: media.episode_number,
        rating: media.rating,
        content_rating,
        genres,
        directors,
        watched: media.is_watched(),
        added_at: media.added_at,
        scheduled_index: 0,
        media_info: extract_media_info(media),
    })
}

fn extract_media_info(media: &MediaItem) -> Option<MediaTechInfo> {
    let version = media.media.first()?;
    let streams = version.parts.first().map(|p| p.streams.as_slice()).unwrap_or(&[]);
    let hdr = streams.iter().any(|s| s.stream_type == 1 && s.hdr);
    let audio_track_title = streams
        .iter()
        .find(|s| s.stream_type == 2)
        .and_then(|s| s.title.clone());
    Some(MediaTechInfo {
        resolution: version.video_resolution.clone(),
        hdr,
        audio_codec: version.audio_codec.clone(),
        audio_channels: version.audio_channels,
        audio_track_title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(rating_key: &str, title: &str, duration_ms: i64) -> ManualItem {
        ManualItem {
            rating_key: rating_key.into(),
            title: title.into(),
            duration_ms,
        }
    }

    #[test]
    fn manual_synthesis_drops_invalid_tuples() {
        let items = synthesize_manual(&[
            manual("a", "Good", 60_000),
            manual("", "No key", 60_000),
            manual("b", " ", 60_000),
            manual("c", "Zero length", 0),
            manual("d", "Negative", -5),
        ]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].rating_key, "a");
        assert_eq!(items[0].kind, MediaKind::Clip);
    }

    #[test]
    fn interleave_round_robins_by_position() {
        let mk = |keys: &[&str]| -> Vec<ResolvedContentItem> {
            synthesize_manual(
                &keys
                    .iter()
                    .map(|k| manual(k, k, 60_000))
                    .collect::<Vec<_>>(),
            )
        };
        let merged = interleave(vec![mk(&["a1", "a2", "a3"]), mk(&["b1"]), mk(&["c1", "c2"])]);
        let keys: Vec<&str> = merged.iter().map(|i| i.rating_key.as_str()).collect();
        assert_eq!(keys, ["a1", "b1", "c1", "a2", "c2", "a3"]);
    }

    #[test]
    fn episode_conversion_decorates_missing_metadata() {
        let media = MediaItem {
            rating_key: "ep1".into(),
            kind: MediaKind::Episode,
            title: "The Constant".into(),
            year: None,
            duration_ms: Some(2_580_000),
            thumb: None,
            grandparent_title: Some("Lost".into()),
            parent_title: None,
            season_number: Some(4),
            episode_number: Some(5),
            rating: None,
            content_rating: None,
            genres: vec![],
            directors: vec![],
            summary: None,
            view_count: Some(0),
            added_at: None,
            grandparent_rating_key: Some("show1".into()),
            parent_rating_key: None,
            media: vec![],
        };
        let meta = ShowMeta {
            year: Some(2004),
            content_rating: Some("TV-14".into()),
            genres: vec!["Drama".into()],
            directors: vec![],
        };
        let item = media_to_item(&media, Some(&meta)).unwrap();
        assert_eq!(item.full_title, "Lost - S04E05 - The Constant");
        assert_eq!(item.year, Some(2004));
        assert_eq!(item.content_rating.as_deref(), Some("TV-14"));
        assert_eq!(item.genres, vec!["Drama".to_string()]);
        assert_eq!(item.watched, Some(false));
    }

    #[test]
    fn zero_duration_media_is_dropped() {
        let media = MediaItem {
            rating_key: "m1".into(),
            kind: MediaKind::Movie,
            title: "Broken".into(),
            year: None,
            duration_ms: Some(0),
            thumb: None,
            grandparent_title: None,
            parent_title: None,
            season_number: None,
            episode_number: None,
            rating: None,
            content_rating: None,
            genres: vec![],
            directors: vec![],
            summary: None,
            view_count: None,
            added_at: None,
            grandparent_rating_key: None,
            parent_rating_key: None,
            media: vec![],
        };
        assert!(media_to_item(&media, None).is_none());
    }
}
