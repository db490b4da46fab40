//! Shared test fixtures: an in-memory catalog, a recording player and an
//! error sink that captures reported kinds.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use retune::catalog::{
    CatalogProvider, Collection, LibraryInfo, LibraryItemsQuery, LibraryKind, MediaItem,
    PlaylistInfo, TagDirectoryItem,
};
use retune::clock::ManualClock;
use retune::config::RetuneConfig;
use retune::errors::CatalogError;
use retune::manager::ChannelManager;
use retune::models::channel::{ChannelContentSource, ChannelDraft};
use retune::models::content::MediaKind;
use retune::models::schedule::ScheduledProgram;
use retune::storage::{MemoryStorage, SharedStorage};
use retune::store::ChannelStore;
use retune::tuning::{ErrorSink, PlayerAdapter};

pub const MINUTE: i64 = 60_000;

pub fn movie(title: &str, year: i32, duration_min: i64) -> MediaItem {
    MediaItem {
        rating_key: format!("movie-{}", title.to_lowercase().replace(' ', "-")),
        kind: MediaKind::Movie,
        title: title.to_string(),
        year: Some(year),
        duration_ms: Some(duration_min * MINUTE),
        thumb: None,
        grandparent_title: None,
        parent_title: None,
        season_number: None,
        episode_number: None,
        rating: Some(7.0),
        content_rating: Some("PG".into()),
        genres: vec!["Drama".into()],
        directors: vec![],
        summary: None,
        view_count: Some(0),
        added_at: Some(1_700_000_000_000),
        grandparent_rating_key: None,
        parent_rating_key: None,
        media: vec![],
    }
}

pub fn episode(show: &str, season: u32, number: u32, duration_min: i64) -> MediaItem {
    MediaItem {
        rating_key: format!("ep-{show}-{season}-{number}"),
        kind: MediaKind::Episode,
        title: format!("Episode {number}"),
        year: None,
        duration_ms: Some(duration_min * MINUTE),
        thumb: None,
        grandparent_title: Some(show.to_string()),
        parent_title: Some(format!("Season {season}")),
        season_number: Some(season),
        episode_number: Some(number),
        rating: None,
        content_rating: None,
        genres: vec![],
        directors: vec![],
        summary: None,
        view_count: Some(0),
        added_at: None,
        grandparent_rating_key: Some(format!("show-{show}")),
        parent_rating_key: None,
        media: vec![],
    }
}

pub fn show_container(show: &str) -> MediaItem {
    MediaItem {
        rating_key: format!("show-{show}"),
        kind: MediaKind::Show,
        title: show.to_string(),
        year: Some(2004),
        duration_ms: Some(60 * MINUTE),
        thumb: None,
        grandparent_title: None,
        parent_title: None,
        season_number: None,
        episode_number: None,
        rating: None,
        content_rating: Some("TV-14".into()),
        genres: vec!["Adventure".into()],
        directors: vec![],
        summary: None,
        view_count: None,
        added_at: None,
        grandparent_rating_key: None,
        parent_rating_key: None,
        media: vec![],
    }
}

/// Scriptable in-memory catalog. `fail_network` makes every call time out;
/// `call_delay` inserts an await point so concurrency tests can interleave.
#[derive(Default)]
pub struct MockCatalog {
    pub libraries: Vec<LibraryInfo>,
    pub movies_by_library: HashMap<String, Vec<MediaItem>>,
    pub shows_by_library: HashMap<String, Vec<MediaItem>>,
    pub episodes_by_library: HashMap<String, Vec<MediaItem>>,
    pub collections_by_library: HashMap<String, Vec<Collection>>,
    pub collection_items: HashMap<String, Vec<MediaItem>>,
    pub playlists: Vec<PlaylistInfo>,
    pub playlist_items: HashMap<String, Vec<MediaItem>>,
    pub show_episodes: HashMap<String, Vec<MediaItem>>,
    pub studios_by_library: HashMap<String, Vec<TagDirectoryItem>>,
    pub actors_by_library: HashMap<String, Vec<TagDirectoryItem>>,
    pub directories_unsupported: bool,
    pub fail_network: AtomicBool,
    /// When set, playlist items resolve to nothing, as if deleted upstream.
    pub playlists_vanished: AtomicBool,
    pub call_delay: Option<Duration>,
    pub item_calls: AtomicUsize,
}

impl MockCatalog {
    pub fn with_movie_library(movies: Vec<MediaItem>) -> Self {
        let mut catalog = Self::default();
        catalog.libraries.push(LibraryInfo {
            id: "1".into(),
            title: "Movies".into(),
            kind: LibraryKind::Movie,
            content_count: Some(movies.len()),
        });
        catalog.movies_by_library.insert("1".into(), movies);
        catalog
    }

    pub fn set_network_down(&self, down: bool) {
        self.fail_network.store(down, Ordering::SeqCst);
    }

    pub fn item_call_count(&self) -> usize {
        self.item_calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), CatalogError> {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(CatalogError::timeout("injected network failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogProvider for MockCatalog {
    async fn get_libraries(
        &self,
        _token: &CancellationToken,
    ) -> Result<Vec<LibraryInfo>, CatalogError> {
        self.gate().await?;
        Ok(self.libraries.clone())
    }

    async fn get_library_items(
        &self,
        library_id: &str,
        query: &LibraryItemsQuery,
        _token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError> {
        self.gate().await?;
        self.item_calls.fetch_add(1, Ordering::SeqCst);
        let filter = query.filter.as_deref().unwrap_or("");
        let source = if filter.contains("type=show") {
            &self.shows_by_library
        } else if filter.contains("type=episode") {
            &self.episodes_by_library
        } else {
            &self.movies_by_library
        };
        let mut items = source.get(library_id).cloned().unwrap_or_default();
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn get_library_item_count(
        &self,
        library_id: &str,
        _filter: Option<&str>,
        _token: &CancellationToken,
    ) -> Result<usize, CatalogError> {
        self.gate().await?;
        Ok(self
            .movies_by_library
            .get(library_id)
            .map(Vec::len)
            .unwrap_or_default())
    }

    async fn get_collections(
        &self,
        library_id: &str,
        _token: &CancellationToken,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.gate().await?;
        Ok(self
            .collections_by_library
            .get(library_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_collection_items(
        &self,
        collection_key: &str,
        _token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError> {
        self.gate().await?;
        Ok(self
            .collection_items
            .get(collection_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_playlists(
        &self,
        _token: &CancellationToken,
    ) -> Result<Vec<PlaylistInfo>, CatalogError> {
        self.gate().await?;
        Ok(self.playlists.clone())
    }

    async fn get_playlist_items(
        &self,
        playlist_key: &str,
        _token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError> {
        self.gate().await?;
        if self.playlists_vanished.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self
            .playlist_items
            .get(playlist_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_show_episodes(
        &self,
        show_rating_key: &str,
        _token: &CancellationToken,
    ) -> Result<Vec<MediaItem>, CatalogError> {
        self.gate().await?;
        Ok(self
            .show_episodes
            .get(show_rating_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_actors(
        &self,
        library_id: &str,
        _token: &CancellationToken,
    ) -> Result<Vec<TagDirectoryItem>, CatalogError> {
        self.gate().await?;
        if self.directories_unsupported {
            return Err(CatalogError::unsupported("actor directory"));
        }
        Ok(self
            .actors_by_library
            .get(library_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_studios(
        &self,
        library_id: &str,
        _token: &CancellationToken,
    ) -> Result<Vec<TagDirectoryItem>, CatalogError> {
        self.gate().await?;
        if self.directories_unsupported {
            return Err(CatalogError::unsupported("studio directory"));
        }
        Ok(self
            .studios_by_library
            .get(library_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records the order of player interactions.
#[derive(Default)]
pub struct RecordingPlayer {
    pub calls: std::sync::Mutex<Vec<String>>,
}

impl RecordingPlayer {
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.call_log().iter().filter(|c| *c == "stop").count()
    }
}

#[async_trait]
impl PlayerAdapter for RecordingPlayer {
    async fn stop_transcode_session(&self) {
        self.calls.lock().unwrap().push("stop_transcode".into());
    }

    async fn show_transition_hint(&self, hint: &str) {
        self.calls.lock().unwrap().push(format!("hint:{hint}"));
    }

    async fn stop(&self) {
        self.calls.lock().unwrap().push("stop".into());
    }

    async fn notify_now_playing(&self, _channel: &retune::models::channel::ChannelConfig, program: &ScheduledProgram) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("now_playing:{}", program.item.rating_key));
    }
}

#[derive(Default)]
pub struct RecordingErrorSink {
    pub reports: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingErrorSink {
    pub fn kinds(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(kind, _)| kind.clone())
            .collect()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, kind: &'static str, message: String) {
        self.reports
            .lock()
            .unwrap()
            .push((kind.to_string(), message));
    }
}

pub struct Harness {
    pub catalog: Arc<MockCatalog>,
    pub clock: Arc<ManualClock>,
    pub memory: Arc<MemoryStorage>,
    pub storage: SharedStorage,
    pub manager: Arc<ChannelManager<MockCatalog>>,
}

/// Wire a manager over in-memory storage and a manual clock starting at a
/// round wall-clock instant.
pub fn harness(catalog: MockCatalog) -> Harness {
    let catalog = Arc::new(catalog);
    let clock = Arc::new(ManualClock::new(1_750_000_000_000));
    let memory = Arc::new(MemoryStorage::new());
    let storage: SharedStorage = memory.clone();
    let store = ChannelStore::new(storage.clone(), "retune_channels_v1:test:live");
    let manager = ChannelManager::new(
        store,
        catalog.clone(),
        clock.clone(),
        RetuneConfig::default(),
    );
    Harness {
        catalog,
        clock,
        memory,
        storage,
        manager,
    }
}

pub fn movie_library_draft() -> ChannelDraft {
    ChannelDraft {
        name: Some("Movies".into()),
        content_source: Some(ChannelContentSource::Library {
            library_id: "1".into(),
            library_type: retune::models::channel::ChannelLibraryType::Movie,
            include_watched: true,
            library_filter: None,
        }),
        ..Default::default()
    }
}
