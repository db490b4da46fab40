//! Setup planner
//!
//! Enumerates candidate channels from pre-fetched catalog inputs, strategy
//! by strategy, in a fixed order. Planning is pure: the coordinator fetches,
//! the planner buckets and emits. Identity collisions resolve
//! first-strategy-wins.

use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{Collection, LibraryInfo, MediaItem, PlaylistInfo, TagDirectoryItem};
use crate::models::channel::{
    ChannelConfig, ChannelContentSource, ChannelLibraryType, ContentFilter, FilterField, FilterOp,
    FilterValue, PlaybackMode, SortOrder,
};
use crate::models::setup::{
    ActorStudioCombineMode, ChannelPlan, ChannelSetupConfig, PendingChannel, PlanDiff, PlanMatch,
    SetupStrategy,
};
use crate::utils::hash::fnv1a_32;

/// Fixed runtime bands, in minutes, for the runtime-bucket strategy.
const RUNTIME_BANDS: [(Option<i64>, Option<i64>, &str); 5] = [
    (None, Some(30), "Under 30 Minutes"),
    (Some(30), Some(60), "30-60 Minutes"),
    (Some(60), Some(90), "60-90 Minutes"),
    (Some(90), Some(120), "90-120 Minutes"),
    (Some(120), None, "Over 2 Hours"),
];

/// Everything the planner needs for one library.
#[derive(Debug, Clone)]
pub struct LibraryPlanInput {
    pub info: LibraryInfo,
    pub collections: Vec<Collection>,
    /// Bounded scan used for tag counting (movies, or shows for TV)
    pub tag_items: Vec<MediaItem>,
    /// Bounded scan used for year/runtime bucketing (movies, or episodes)
    pub leaf_items: Vec<MediaItem>,
    /// Item count from the cached library info or a count probe
    pub item_count: Option<usize>,
    pub studios: Vec<TagDirectoryItem>,
    pub actors: Vec<TagDirectoryItem>,
    pub library_type: ChannelLibraryType,
}

#[derive(Debug, Clone, Default)]
pub struct PlanInputs {
    pub playlists: Vec<PlaylistInfo>,
    pub libraries: Vec<LibraryPlanInput>,
    /// Warnings carried over from the fetch phase (unsupported endpoints)
    pub warnings: Vec<String>,
}

/// Stable identity of what a channel plays: source essence plus filter
/// essence. Presentation (name, playback mode, sort order) is excluded, so
/// a mode change alone never reads as a new channel.
pub fn identity_key(source: &ChannelContentSource, filters: &[ContentFilter]) -> String {
    let mut filter_parts: Vec<String> = filters
        .iter()
        .map(|f| {
            let value = match &f.value {
                FilterValue::Number(n) => n.to_string(),
                FilterValue::Text(s) => s.to_lowercase(),
                FilterValue::Flag(b) => b.to_string(),
            };
            format!("{}:{}:{}", f.field, f.op, value)
        })
        .collect();
    filter_parts.sort();
    format!("{}|{}", source.essence(), filter_parts.join(","))
}

/// Build the channel plan for a setup configuration.
pub fn build_plan(config: &ChannelSetupConfig, inputs: &PlanInputs) -> ChannelPlan {
    let mut plan = ChannelPlan {
        warnings: inputs.warnings.clone(),
        ..Default::default()
    };
    // Dedupe within the plan is identity plus sort order, so a
    // recently-added channel survives next to a plain library channel over
    // the same section.
    let mut seen: HashSet<String> = HashSet::new();
    let min_items = config.min_items_per_channel;

    let mut push = |plan: &mut ChannelPlan, pending: PendingChannel| {
        if plan.pending.len() >= config.max_channels {
            plan.reached_max_channels = true;
            return false;
        }
        let dedupe_key = format!(
            "{}|{}",
            identity_key(&pending.content_source, &pending.content_filters),
            pending
                .sort_order
                .map(|s| s.to_string())
                .unwrap_or_default()
        );
        if !seen.insert(dedupe_key) {
            debug!(name = %pending.name, "dropping duplicate pending channel");
            return true;
        }
        let strategy = pending.strategy;
        plan.pending.push(pending);
        plan.estimates.record(strategy, 1);
        true
    };

    // 1. Server-wide playlists.
    if config.strategy_enabled(SetupStrategy::Playlists) {
        for playlist in &inputs.playlists {
            if playlist.leaf_count < min_items {
                continue;
            }
            let pending = PendingChannel {
                name: playlist.title.clone(),
                content_source: ChannelContentSource::Playlist {
                    playlist_key: playlist.rating_key.clone(),
                },
                playback_mode: PlaybackMode::Shuffle,
                shuffle_seed: fnv1a_32(&format!("playlist:{}", playlist.rating_key)),
                content_filters: vec![],
                sort_order: None,
                strategy: SetupStrategy::Playlists,
                is_auto_generated: true,
            };
            if !push(&mut plan, pending) {
                return plan;
            }
        }
    }

    // 2. Per library, in title order.
    let mut libraries: Vec<&LibraryPlanInput> = inputs.libraries.iter().collect();
    libraries.sort_by(|a, b| a.info.title.cmp(&b.info.title));

    for library in libraries {
        let library_id = &library.info.id;
        let mut collections_emitted = false;

        // 2.1 Collections.
        if config.strategy_enabled(SetupStrategy::Collections) {
            for collection in &library.collections {
                if collection.child_count < min_items {
                    continue;
                }
                let pending = PendingChannel {
                    name: collection.title.clone(),
                    content_source: ChannelContentSource::Collection {
                        collection_key: collection.rating_key.clone(),
                        collection_name: collection.title.clone(),
                    },
                    playback_mode: PlaybackMode::Shuffle,
                    shuffle_seed: fnv1a_32(&format!("collection:{}", collection.rating_key)),
                    content_filters: vec![],
                    sort_order: None,
                    strategy: SetupStrategy::Collections,
                    is_auto_generated: true,
                };
                if !push(&mut plan, pending) {
                    return plan;
                }
                collections_emitted = true;
            }
        }

        // 2.2 Library-wide fallback when no collection channel fired.
        if !collections_emitted && config.strategy_enabled(SetupStrategy::LibraryFallback) {
            let count = library.item_count.or(library.info.content_count);
            if count.is_some_and(|c| c >= min_items) {
                let pending = PendingChannel {
                    name: library.info.title.clone(),
                    content_source: library_source(library, None),
                    playback_mode: PlaybackMode::Shuffle,
                    shuffle_seed: fnv1a_32(&format!("library:{library_id}")),
                    content_filters: vec![],
                    sort_order: None,
                    strategy: SetupStrategy::LibraryFallback,
                    is_auto_generated: true,
                };
                if !push(&mut plan, pending) {
                    return plan;
                }
            }
        }

        // 2.3 Tag and bucket strategies over the bounded scans.
        if config.strategy_enabled(SetupStrategy::Genres) {
            for (tag, count) in count_tags(&library.tag_items, |item| &item.genres) {
                if count < min_items {
                    continue;
                }
                let pending = tag_filter_channel(
                    library,
                    &tag,
                    FilterField::Genre,
                    SetupStrategy::Genres,
                    format!("genre:{library_id}:{tag}"),
                );
                if !push(&mut plan, pending) {
                    return plan;
                }
            }
        }
        if config.strategy_enabled(SetupStrategy::Directors) {
            for (tag, count) in count_tags(&library.tag_items, |item| &item.directors) {
                if count < min_items {
                    continue;
                }
                let pending = tag_filter_channel(
                    library,
                    &tag,
                    FilterField::Director,
                    SetupStrategy::Directors,
                    format!("director:{library_id}:{tag}"),
                );
                if !push(&mut plan, pending) {
                    return plan;
                }
            }
        }
        if config.strategy_enabled(SetupStrategy::Decades) {
            for (decade, count) in count_decades(&library.leaf_items) {
                if count < min_items {
                    continue;
                }
                let pending = PendingChannel {
                    name: format!("{decade}s"),
                    content_source: library_source(library, None),
                    playback_mode: PlaybackMode::Shuffle,
                    shuffle_seed: fnv1a_32(&format!("decade:{library_id}:{decade}")),
                    content_filters: vec![
                        ContentFilter {
                            field: FilterField::Year,
                            op: FilterOp::Gte,
                            value: FilterValue::Number(f64::from(decade)),
                        },
                        ContentFilter {
                            field: FilterField::Year,
                            op: FilterOp::Lt,
                            value: FilterValue::Number(f64::from(decade + 10)),
                        },
                    ],
                    sort_order: None,
                    strategy: SetupStrategy::Decades,
                    is_auto_generated: true,
                };
                if !push(&mut plan, pending) {
                    return plan;
                }
            }
        }
        if config.strategy_enabled(SetupStrategy::RuntimeBuckets) {
            for (min_minutes, max_minutes, label) in RUNTIME_BANDS {
                let count = library
                    .leaf_items
                    .iter()
                    .filter(|item| in_runtime_band(item, min_minutes, max_minutes))
                    .count();
                if count < min_items {
                    continue;
                }
                let mut content_filters = Vec::new();
                if let Some(min) = min_minutes {
                    content_filters.push(ContentFilter {
                        field: FilterField::Duration,
                        op: FilterOp::Gte,
                        value: FilterValue::Number((min * 60_000) as f64),
                    });
                }
                if let Some(max) = max_minutes {
                    content_filters.push(ContentFilter {
                        field: FilterField::Duration,
                        op: FilterOp::Lt,
                        value: FilterValue::Number((max * 60_000) as f64),
                    });
                }
                let pending = PendingChannel {
                    name: label.to_string(),
                    content_source: library_source(library, None),
                    playback_mode: PlaybackMode::Shuffle,
                    shuffle_seed: fnv1a_32(&format!("runtime:{library_id}:{label}")),
                    content_filters,
                    sort_order: None,
                    strategy: SetupStrategy::RuntimeBuckets,
                    is_auto_generated: true,
                };
                if !push(&mut plan, pending) {
                    return plan;
                }
            }
        }

        // 2.4 Recently added.
        if config.strategy_enabled(SetupStrategy::RecentlyAdded) {
            let pending = PendingChannel {
                name: format!("Recently Added - {}", library.info.title),
                content_source: library_source(library, None),
                playback_mode: PlaybackMode::Sequential,
                shuffle_seed: fnv1a_32(&format!("recent:{library_id}")),
                content_filters: vec![],
                sort_order: Some(SortOrder::AddedDesc),
                strategy: SetupStrategy::RecentlyAdded,
                is_auto_generated: true,
            };
            if !push(&mut plan, pending) {
                return plan;
            }
        }

        // 2.5 Studio and actor directories.
        let studio_enabled = config.strategy_enabled(SetupStrategy::Studios);
        let actor_enabled = config.strategy_enabled(SetupStrategy::Actors);
        let mut directory: Vec<(&TagDirectoryItem, &str, SetupStrategy)> = Vec::new();
        if studio_enabled {
            directory.extend(library.studios.iter().map(|t| (t, "studio", SetupStrategy::Studios)));
        }
        if actor_enabled {
            directory.extend(library.actors.iter().map(|t| (t, "actor", SetupStrategy::Actors)));
        }
        if config.actor_studio_combine_mode == ActorStudioCombineMode::Combined {
            // One pool ordered by tag weight, so the cap lands on the most
            // represented names regardless of which directory they came from.
            directory.sort_by(|a, b| b.0.count.cmp(&a.0.count));
        }
        for (tag, filter_name, strategy) in directory {
            if tag.count < min_items {
                continue;
            }
            let filter_fragment = tag
                .fast_key
                .as_deref()
                .and_then(sanitize_fast_key)
                .unwrap_or_else(|| format!("{filter_name}={}", tag.key));
            let pending = PendingChannel {
                name: tag.title.clone(),
                content_source: library_source(library, Some(filter_fragment)),
                playback_mode: PlaybackMode::Shuffle,
                shuffle_seed: fnv1a_32(&format!("{filter_name}:{library_id}:{}", tag.key)),
                content_filters: vec![],
                sort_order: None,
                strategy,
                is_auto_generated: true,
            };
            if !push(&mut plan, pending) {
                return plan;
            }
        }
    }

    plan
}

/// Diff a plan against the existing lineup by content identity.
pub fn plan_diff(existing: &[ChannelConfig], pending: &[PendingChannel]) -> PlanDiff {
    let mut diff = PlanDiff::default();
    let existing_by_identity: BTreeMap<String, Uuid> = existing
        .iter()
        .map(|c| (identity_key(&c.content_source, &c.content_filters), c.id))
        .collect();

    let mut matched: HashSet<Uuid> = HashSet::new();
    for (index, candidate) in pending.iter().enumerate() {
        let key = identity_key(&candidate.content_source, &candidate.content_filters);
        match existing_by_identity.get(&key) {
            Some(id) if !matched.contains(id) => {
                matched.insert(*id);
                diff.unchanged.push(*id);
                diff.matched_pairs.push(PlanMatch {
                    existing_id: *id,
                    pending_index: index,
                });
            }
            _ => diff.created.push(index),
        }
    }
    diff.removed = existing
        .iter()
        .filter(|c| !matched.contains(&c.id))
        .map(|c| c.id)
        .collect();
    diff
}

fn library_source(
    library: &LibraryPlanInput,
    library_filter: Option<String>,
) -> ChannelContentSource {
    ChannelContentSource::Library {
        library_id: library.info.id.clone(),
        library_type: library.library_type,
        include_watched: true,
        library_filter,
    }
}

fn tag_filter_channel(
    library: &LibraryPlanInput,
    tag: &str,
    field: FilterField,
    strategy: SetupStrategy,
    seed_key: String,
) -> PendingChannel {
    PendingChannel {
        name: tag.to_string(),
        content_source: library_source(library, None),
        playback_mode: PlaybackMode::Shuffle,
        shuffle_seed: fnv1a_32(&seed_key),
        content_filters: vec![ContentFilter {
            field,
            op: FilterOp::Eq,
            value: FilterValue::Text(tag.to_string()),
        }],
        sort_order: None,
        strategy,
        is_auto_generated: true,
    }
}

/// Count tag occurrences across a scan, preserving first-seen casing and
/// emitting in alphabetical order for stable plans.
fn count_tags<'a>(
    items: &'a [MediaItem],
    extract: impl Fn(&'a MediaItem) -> &'a Vec<String>,
) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for item in items {
        for tag in extract(item) {
            let normalized = tag.to_lowercase();
            let entry = counts.entry(normalized).or_insert_with(|| (tag.clone(), 0));
            entry.1 += 1;
        }
    }
    counts.into_values().collect()
}

fn count_decades(items: &[MediaItem]) -> Vec<(i32, usize)> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for item in items {
        if let Some(year) = item.year.filter(|y| *y > 0) {
            *counts.entry((year / 10) * 10).or_default() += 1;
        }
    }
    counts.into_iter().collect()
}

fn in_runtime_band(item: &MediaItem, min_minutes: Option<i64>, max_minutes: Option<i64>) -> bool {
    let Some(duration) = item.duration_ms.filter(|d| *d > 0) else {
        return false;
    };
    let minutes = duration / 60_000;
    min_minutes.is_none_or(|min| minutes >= min) && max_minutes.is_none_or(|max| minutes < max)
}

/// Reduce a tag-directory `fast_key` to a bare filter fragment: the query
/// string with the library path and any credential-bearing parameters
/// stripped.
pub fn sanitize_fast_key(fast_key: &str) -> Option<String> {
    let query = fast_key
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or(fast_key);
    let params: Vec<&str> = query
        .split('&')
        .filter(|param| {
            let name = param.split('=').next().unwrap_or("").to_lowercase();
            !name.is_empty() && !name.contains("token") && !name.starts_with("x-plex")
        })
        .collect();
    if params.iter().any(|p| p.contains('=')) {
        Some(params.join("&"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LibraryKind;
    use crate::models::content::MediaKind;
    use std::collections::BTreeSet;

    fn movie(title: &str, year: i32, duration_min: i64, genres: &[&str]) -> MediaItem {
        MediaItem {
            rating_key: format!("rk-{title}"),
            kind: MediaKind::Movie,
            title: title.into(),
            year: Some(year),
            duration_ms: Some(duration_min * 60_000),
            thumb: None,
            grandparent_title: None,
            parent_title: None,
            season_number: None,
            episode_number: None,
            rating: None,
            content_rating: None,
            genres: genres.iter().map(|s| s.to_string()).collect(),
            directors: vec![],
            summary: None,
            view_count: None,
            added_at: None,
            grandparent_rating_key: None,
            parent_rating_key: None,
            media: vec![],
        }
    }

    fn library(id: &str, title: &str, items: Vec<MediaItem>) -> LibraryPlanInput {
        LibraryPlanInput {
            info: LibraryInfo {
                id: id.into(),
                title: title.into(),
                kind: LibraryKind::Movie,
                content_count: Some(items.len()),
            },
            collections: vec![],
            tag_items: items.clone(),
            leaf_items: items,
            item_count: None,
            studios: vec![],
            actors: vec![],
            library_type: ChannelLibraryType::Movie,
        }
    }

    fn setup(strategies: &[SetupStrategy]) -> ChannelSetupConfig {
        ChannelSetupConfig {
            server_id: "srv".into(),
            selected_library_ids: vec!["1".into()],
            enabled_strategies: strategies.iter().copied().collect::<BTreeSet<_>>(),
            actor_studio_combine_mode: ActorStudioCombineMode::Separate,
            build_mode: Default::default(),
            max_channels: 25,
            min_items_per_channel: 2,
        }
    }

    #[test]
    fn playlists_respect_min_items() {
        let inputs = PlanInputs {
            playlists: vec![
                PlaylistInfo {
                    rating_key: "pl1".into(),
                    title: "Favorites".into(),
                    leaf_count: 10,
                    duration_ms: 0,
                },
                PlaylistInfo {
                    rating_key: "pl2".into(),
                    title: "Tiny".into(),
                    leaf_count: 1,
                    duration_ms: 0,
                },
            ],
            ..Default::default()
        };
        let plan = build_plan(&setup(&[SetupStrategy::Playlists]), &inputs);
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].name, "Favorites");
        assert_eq!(plan.pending[0].playback_mode, PlaybackMode::Shuffle);
    }

    #[test]
    fn genre_buckets_meet_threshold() {
        let items = vec![
            movie("A", 1994, 100, &["Drama"]),
            movie("B", 1995, 100, &["Drama", "Crime"]),
            movie("C", 1996, 100, &["Comedy"]),
        ];
        let inputs = PlanInputs {
            libraries: vec![library("1", "Movies", items)],
            ..Default::default()
        };
        let plan = build_plan(&setup(&[SetupStrategy::Genres]), &inputs);
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].name, "Drama");
        assert_eq!(plan.pending[0].content_filters.len(), 1);
    }

    #[test]
    fn decade_channels_carry_year_range_filters() {
        let items = vec![
            movie("A", 1984, 100, &[]),
            movie("B", 1987, 100, &[]),
            movie("C", 2001, 100, &[]),
        ];
        let inputs = PlanInputs {
            libraries: vec![library("1", "Movies", items)],
            ..Default::default()
        };
        let plan = build_plan(&setup(&[SetupStrategy::Decades]), &inputs);
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].name, "1980s");
        let filters = &plan.pending[0].content_filters;
        assert_eq!(filters[0].op, FilterOp::Gte);
        assert_eq!(filters[1].op, FilterOp::Lt);
    }

    #[test]
    fn plan_caps_at_max_channels() {
        let playlists: Vec<PlaylistInfo> = (0..30)
            .map(|i| PlaylistInfo {
                rating_key: format!("pl{i}"),
                title: format!("Playlist {i}"),
                leaf_count: 10,
                duration_ms: 0,
            })
            .collect();
        let mut config = setup(&[SetupStrategy::Playlists]);
        config.max_channels = 5;
        let plan = build_plan(
            &config,
            &PlanInputs {
                playlists,
                ..Default::default()
            },
        );
        assert_eq!(plan.pending.len(), 5);
        assert!(plan.reached_max_channels);
    }

    #[test]
    fn seeds_are_stable_across_replans() {
        let inputs = PlanInputs {
            playlists: vec![PlaylistInfo {
                rating_key: "pl1".into(),
                title: "Favorites".into(),
                leaf_count: 10,
                duration_ms: 0,
            }],
            ..Default::default()
        };
        let config = setup(&[SetupStrategy::Playlists]);
        let first = build_plan(&config, &inputs);
        let second = build_plan(&config, &inputs);
        assert_eq!(first.pending[0].shuffle_seed, second.pending[0].shuffle_seed);
    }

    #[test]
    fn sanitize_fast_key_strips_path_and_credentials() {
        assert_eq!(
            sanitize_fast_key("/library/sections/1/all?studio=310&X-Plex-Token=secret"),
            Some("studio=310".to_string())
        );
        assert_eq!(
            sanitize_fast_key("http://host:32400/library/sections/1/all?actor=42&authToken=x"),
            Some("actor=42".to_string())
        );
        assert_eq!(sanitize_fast_key("/library/sections/1/all"), None);
    }

    #[test]
    fn diff_ignores_playback_mode_changes() {
        let mut channel = ChannelConfig::from_draft(
            crate::models::channel::ChannelDraft {
                content_source: Some(ChannelContentSource::Playlist {
                    playlist_key: "pl1".into(),
                }),
                ..Default::default()
            },
            1,
            chrono::Utc::now(),
        )
        .unwrap();
        channel.playback_mode = PlaybackMode::Sequential;

        let pending = vec![PendingChannel {
            name: "Favorites".into(),
            content_source: ChannelContentSource::Playlist {
                playlist_key: "pl1".into(),
            },
            playback_mode: PlaybackMode::Shuffle,
            shuffle_seed: 7,
            content_filters: vec![],
            sort_order: None,
            strategy: SetupStrategy::Playlists,
            is_auto_generated: true,
        }];

        let diff = plan_diff(&[channel.clone()], &pending);
        assert!(diff.created.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.unchanged, vec![channel.id]);
        assert_eq!(diff.matched_pairs.len(), 1);
    }
}
