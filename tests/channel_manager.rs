//! Channel manager behavior: lineup invariants, the content-resolution
//! pipeline and its tiered cache fallback.

mod common;

use common::{MINUTE, MockCatalog, episode, harness, movie, movie_library_draft, show_container};
use retune::Clock;
use retune::errors::{ChannelError, ContentError, RetuneError};
use retune::manager::ChannelEvent;
use retune::models::channel::{
    ChannelContentSource, ChannelDraft, ChannelPatch, ContentFilter, FilterField, FilterOp,
    FilterValue,
};
use retune::models::content::{CacheReason, MediaKind};
use tokio_util::sync::CancellationToken;

fn forty_two_movies() -> Vec<retune::catalog::MediaItem> {
    (0..42).map(|i| movie(&format!("Film {i:02}"), 1990 + (i % 20), 90)).collect()
}

#[tokio::test]
async fn created_channels_have_unique_numbers_in_range() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let first = h.manager.create_channel(movie_library_draft()).await.unwrap();
    let second = h
        .manager
        .create_channel(ChannelDraft {
            number: Some(7),
            ..movie_library_draft()
        })
        .await
        .unwrap();
    assert_eq!(first.number, 1);
    assert_eq!(second.number, 7);

    let dup = h
        .manager
        .create_channel(ChannelDraft {
            number: Some(7),
            ..movie_library_draft()
        })
        .await;
    assert!(matches!(dup, Err(ChannelError::DuplicateNumber { number: 7 })));

    let out_of_range = h
        .manager
        .create_channel(ChannelDraft {
            number: Some(0),
            ..movie_library_draft()
        })
        .await;
    assert!(matches!(out_of_range, Err(ChannelError::InvalidNumber { .. })));

    let channels = h.manager.list_channels().await;
    let mut numbers: Vec<u16> = channels.iter().map(|c| c.number).collect();
    numbers.sort_unstable();
    numbers.dedup();
    assert_eq!(numbers.len(), channels.len());
    assert!(numbers.iter().all(|n| (1..=999).contains(n)));
}

#[tokio::test]
async fn create_requires_a_content_source() {
    let h = harness(MockCatalog::default());
    let result = h.manager.create_channel(ChannelDraft::default()).await;
    assert!(matches!(result, Err(ChannelError::ContentSourceRequired)));
}

#[tokio::test]
async fn create_resolves_content_and_updates_derived_fields() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let mut events = h.manager.subscribe();
    let channel = h.manager.create_channel(movie_library_draft()).await.unwrap();
    assert_eq!(channel.item_count, 42);
    assert_eq!(channel.total_duration_ms, 42 * 90 * MINUTE);
    assert!(channel.last_content_refresh.is_some());

    assert!(matches!(events.recv().await.unwrap(), ChannelEvent::Created(_)));
    assert!(matches!(
        events.recv().await.unwrap(),
        ChannelEvent::ContentResolved { item_count: 42, .. }
    ));
}

#[tokio::test]
async fn delete_reassigns_current_and_drops_cache() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let a = h.manager.create_channel(movie_library_draft()).await.unwrap();
    let b = h.manager.create_channel(movie_library_draft()).await.unwrap();
    h.manager.set_current_channel(a.id).await.unwrap();

    h.manager.delete_channel(a.id).await.unwrap();
    assert_eq!(h.manager.current_channel().await.unwrap().id, b.id);
    assert!(matches!(
        h.manager.delete_channel(a.id).await,
        Err(ChannelError::NotFound { .. })
    ));
}

#[tokio::test]
async fn fresh_cache_serves_without_hitting_the_catalog() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let channel = h.manager.create_channel(movie_library_draft()).await.unwrap();
    let calls_after_create = h.catalog.item_call_count();

    let content = h
        .manager
        .resolve_channel_content(channel.id, &CancellationToken::new())
        .await
        .unwrap();
    assert!(content.from_cache);
    assert_eq!(content.cache_reason, CacheReason::Fresh);
    assert_eq!(h.catalog.item_call_count(), calls_after_create);
}

#[tokio::test(start_paused = true)]
async fn network_failure_serves_cache_and_queues_one_retry() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let channel = h.manager.create_channel(movie_library_draft()).await.unwrap();

    // Expire the cache, then take the catalog down.
    h.clock.advance_ms(2 * 3_600_000);
    h.catalog.set_network_down(true);

    let content = h
        .manager
        .resolve_channel_content(channel.id, &CancellationToken::new())
        .await
        .unwrap();
    assert!(content.from_cache);
    assert!(content.is_stale);
    assert_eq!(content.cache_reason, CacheReason::NetworkError);
    assert_eq!(content.ordered_items.len(), 42);
    assert!(h.manager.has_pending_retry(&channel.id));

    // A second failing resolve coalesces instead of stacking retries.
    let again = h
        .manager
        .resolve_channel_content(channel.id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.cache_reason, CacheReason::NetworkError);

    // The catalog is not polled again before the retry delay elapses.
    let calls_before = h.catalog.item_call_count();
    tokio::time::sleep(std::time::Duration::from_secs(29)).await;
    assert_eq!(h.catalog.item_call_count(), calls_before);

    // Once the delay passes the queued retry fires.
    h.catalog.set_network_down(false);
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!(h.catalog.item_call_count() > calls_before);
}

#[tokio::test]
async fn network_failure_without_cache_is_surfaced() {
    let catalog = MockCatalog::with_movie_library(forty_two_movies());
    catalog.set_network_down(true);
    let h = harness(catalog);
    // Bypass create (which would fail to resolve anyway) by replacing the
    // lineup directly.
    let draft_channel = retune::models::channel::ChannelConfig::from_draft(
        movie_library_draft(),
        1,
        h.clock.now_utc(),
    )
    .unwrap();
    let id = draft_channel.id;
    h.manager.replace_all_channels(vec![draft_channel], None).await;

    let result = h
        .manager
        .resolve_channel_content(id, &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(RetuneError::Content(ContentError::Catalog(_)))
    ));
}

#[tokio::test]
async fn empty_after_filtering_is_never_masked_by_cache() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let channel = h.manager.create_channel(movie_library_draft()).await.unwrap();

    // A filter no item can satisfy invalidates the cache and surfaces the
    // empty-channel error even though a cached list exists on disk.
    h.manager
        .update_channel(
            channel.id,
            ChannelPatch {
                content_filters: Some(vec![ContentFilter {
                    field: FilterField::Year,
                    op: FilterOp::Eq,
                    value: FilterValue::Number(1800.0),
                }]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = h
        .manager
        .resolve_channel_content(channel.id, &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(RetuneError::Content(ContentError::EmptyChannel))
    ));
}

#[tokio::test]
async fn vanished_source_returns_stale_cache() {
    let mut catalog = MockCatalog::default();
    catalog
        .playlist_items
        .insert("pl1".into(), forty_two_movies());
    let h = harness(catalog);
    let channel = h
        .manager
        .create_channel(ChannelDraft {
            name: Some("Playlist".into()),
            content_source: Some(ChannelContentSource::Playlist {
                playlist_key: "pl1".into(),
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    // The playlist disappears upstream; the cache goes stale but keeps the
    // channel on the air. No retry is queued for a vanished source.
    h.clock.advance_ms(2 * 3_600_000);
    h.catalog
        .playlists_vanished
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let content = h
        .manager
        .resolve_channel_content(channel.id, &CancellationToken::new())
        .await
        .unwrap();
    assert!(content.from_cache);
    assert!(content.is_stale);
    assert_eq!(content.cache_reason, CacheReason::ContentUnavailable);
    assert_eq!(content.ordered_items.len(), 42);
    assert!(!h.manager.has_pending_retry(&channel.id));
}

#[tokio::test]
async fn show_containers_are_expanded_to_episodes() {
    let mut catalog = MockCatalog::default();
    catalog
        .collection_items
        .insert("col1".into(), vec![show_container("Lost"), movie("Heat", 1995, 170)]);
    catalog.show_episodes.insert(
        "show-Lost".into(),
        vec![episode("Lost", 1, 1, 43), episode("Lost", 1, 2, 43)],
    );
    let h = harness(catalog);
    let channel = h
        .manager
        .create_channel(ChannelDraft {
            name: Some("Collection".into()),
            content_source: Some(ChannelContentSource::Collection {
                collection_key: "col1".into(),
                collection_name: "Island Stories".into(),
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    let content = h
        .manager
        .resolve_channel_content(channel.id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(content.ordered_items.len(), 3);
    assert!(content.ordered_items.iter().all(|i| i.kind != MediaKind::Show));
    let lost = content
        .ordered_items
        .iter()
        .find(|i| i.rating_key == "ep-Lost-1-1")
        .unwrap();
    // Parent metadata propagated from the show container.
    assert_eq!(lost.genres, vec!["Adventure".to_string()]);
    assert_eq!(lost.content_rating.as_deref(), Some("TV-14"));
    assert_eq!(lost.full_title, "Lost - S01E01 - Episode 1");
}

#[tokio::test]
async fn export_import_round_trips_the_lineup() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let a = h.manager.create_channel(movie_library_draft()).await.unwrap();
    let _b = h.manager.create_channel(movie_library_draft()).await.unwrap();
    h.manager.set_current_channel(a.id).await.unwrap();

    let exported = h.manager.export_channels().await;
    let imported = h.manager.import_channels(&exported).await.unwrap();
    assert_eq!(imported, 2);
    assert_eq!(h.manager.current_channel().await.unwrap().id, a.id);

    let garbage = serde_json::json!({"channels": "nope"});
    assert!(matches!(
        h.manager.import_channels(&garbage).await,
        Err(ChannelError::InvalidImportData { .. })
    ));
}

#[tokio::test]
async fn next_and_previous_wrap_around_the_lineup() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let a = h.manager.create_channel(movie_library_draft()).await.unwrap();
    let b = h.manager.create_channel(movie_library_draft()).await.unwrap();
    let c = h.manager.create_channel(movie_library_draft()).await.unwrap();
    h.manager.set_current_channel(c.id).await.unwrap();

    assert_eq!(h.manager.get_next_channel().await.unwrap().id, a.id);
    assert_eq!(h.manager.get_previous_channel().await.unwrap().id, b.id);
}

#[tokio::test]
async fn duplicate_channel_gets_fresh_identity() {
    let h = harness(MockCatalog::with_movie_library(forty_two_movies()));
    let original = h.manager.create_channel(movie_library_draft()).await.unwrap();
    let copy = h.manager.duplicate_channel(original.id).await.unwrap();
    assert_ne!(copy.id, original.id);
    assert_ne!(copy.number, original.number);
    assert_ne!(copy.shuffle_seed, original.shuffle_seed);
    assert!(copy.name.ends_with("(Copy)"));
}
