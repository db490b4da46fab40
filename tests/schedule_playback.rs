//! Schedule math end to end: tune-in scenarios, loop wrap, determinism and
//! the coverage/partition properties.

use proptest::prelude::*;
use rstest::rstest;
use retune::models::channel::PlaybackMode;
use retune::models::content::{MediaKind, ResolvedContentItem};
use retune::models::schedule::ScheduleConfig;
use retune::scheduler::calculator::{build_schedule_index, next_program, program_at_time, window};
use retune::utils::prng::shuffle_with_seed;
use uuid::Uuid;

const MINUTE: i64 = 60_000;

fn item(key: &str, duration_ms: i64) -> ResolvedContentItem {
    ResolvedContentItem {
        rating_key: key.to_string(),
        kind: MediaKind::Movie,
        title: key.to_string(),
        full_title: key.to_string(),
        duration_ms,
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
    }
}

fn config(items: Vec<ResolvedContentItem>, mode: PlaybackMode, seed: u32) -> ScheduleConfig {
    ScheduleConfig {
        channel_id: Uuid::new_v4(),
        ordered_items: items,
        anchor_ms: 0,
        playback_mode: mode,
        shuffle_seed: seed,
    }
}

fn abc_config() -> ScheduleConfig {
    config(
        vec![
            item("a", 30 * MINUTE),
            item("b", 60 * MINUTE),
            item("c", 30 * MINUTE),
        ],
        PlaybackMode::Sequential,
        0,
    )
}

#[test]
fn tune_in_mid_program() {
    let index = build_schedule_index(&abc_config()).unwrap();
    let program = program_at_time(45 * MINUTE, &index, 0).unwrap();
    assert_eq!(program.item.rating_key, "b");
    assert_eq!(program.elapsed_ms, 15 * MINUTE);
    assert_eq!(program.remaining_ms, 45 * MINUTE);
    assert_eq!(program.scheduled_start_ms, 30 * MINUTE);
    assert_eq!(program.scheduled_end_ms, 90 * MINUTE);
    assert_eq!(program.loop_number, 0);
    assert_eq!(program.schedule_index, 1);
}

#[test]
fn tune_in_after_loop_wrap() {
    let index = build_schedule_index(&abc_config()).unwrap();
    let program = program_at_time(125 * MINUTE, &index, 0).unwrap();
    assert_eq!(program.item.rating_key, "a");
    assert_eq!(program.loop_number, 1);
    assert_eq!(program.schedule_index, 0);
    assert_eq!(program.scheduled_start_ms, 120 * MINUTE);
    assert_eq!(program.elapsed_ms, 5 * MINUTE);
}

#[test]
fn shuffled_schedule_is_reproducible() {
    let items = vec![
        item("a", 10 * MINUTE),
        item("b", 20 * MINUTE),
        item("c", 30 * MINUTE),
        item("d", 40 * MINUTE),
        item("e", 50 * MINUTE),
    ];
    let config = config(items, PlaybackMode::Shuffle, 42);
    let first = build_schedule_index(&config).unwrap();
    let second = build_schedule_index(&config).unwrap();
    let keys = |index: &retune::models::schedule::ScheduleIndex| -> Vec<String> {
        index
            .ordered_items
            .iter()
            .map(|i| i.rating_key.clone())
            .collect()
    };
    assert_eq!(keys(&first), keys(&second));
    assert_eq!(first.item_start_offsets, second.item_start_offsets);
    assert_eq!(first.total_loop_duration_ms, 150 * MINUTE);
}

#[rstest]
#[case(0, "a", 0, 0)]
#[case(29 * MINUTE, "a", 0, 0)]
#[case(30 * MINUTE, "b", 1, 0)]
#[case(90 * MINUTE, "c", 2, 0)]
#[case(119 * MINUTE, "c", 2, 0)]
#[case(120 * MINUTE, "a", 0, 1)]
fn boundaries_are_start_inclusive_end_exclusive(
    #[case] t: i64,
    #[case] expected_key: &str,
    #[case] expected_index: usize,
    #[case] expected_loop: i64,
) {
    let index = build_schedule_index(&abc_config()).unwrap();
    let program = program_at_time(t, &index, 0).unwrap();
    assert_eq!(program.item.rating_key, expected_key);
    assert_eq!(program.schedule_index, expected_index);
    assert_eq!(program.loop_number, expected_loop);
}

#[test]
fn window_spans_loop_boundaries() {
    let index = build_schedule_index(&abc_config()).unwrap();
    let programs = window(100 * MINUTE, 250 * MINUTE, &index, 0).unwrap();
    let keys: Vec<&str> = programs.iter().map(|p| p.item.rating_key.as_str()).collect();
    // c finishes loop 0, then a full loop 1, then a of loop 2.
    assert_eq!(keys, ["c", "a", "b", "c", "a"]);
    for pair in programs.windows(2) {
        assert_eq!(pair[0].scheduled_end_ms, pair[1].scheduled_start_ms);
    }
}

proptest! {
    /// Fisher-Yates with a fixed seed is a stable permutation.
    #[test]
    fn shuffle_is_deterministic_permutation(
        items in proptest::collection::vec(0u32..1000, 0..40),
        seed in any::<u32>(),
    ) {
        let first = shuffle_with_seed(&items, seed);
        let second = shuffle_with_seed(&items, seed);
        prop_assert_eq!(&first, &second);
        let mut sorted_input = items.clone();
        sorted_input.sort_unstable();
        let mut sorted_output = first;
        sorted_output.sort_unstable();
        prop_assert_eq!(sorted_input, sorted_output);
    }

    /// Exactly one program covers any instant, and elapsed plus remaining
    /// always equals the item duration.
    #[test]
    fn schedule_partitions_time(
        durations in proptest::collection::vec(1i64..10_000, 1..20),
        anchor in -1_000_000i64..1_000_000,
        probe in 0i64..50_000_000,
    ) {
        let items: Vec<ResolvedContentItem> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| item(&format!("i{i}"), *d))
            .collect();
        let index = build_schedule_index(&config(items, PlaybackMode::Sequential, 0)).unwrap();
        let t = anchor + probe;
        let program = program_at_time(t, &index, anchor).unwrap();
        prop_assert!(program.covers(t));
        prop_assert_eq!(program.elapsed_ms + program.remaining_ms, program.item.duration_ms);
        prop_assert!(program.elapsed_ms >= 0);
        prop_assert!(program.remaining_ms > 0);

        // Loop periodicity: one full loop later is the same airing
        // coordinates with the loop number bumped.
        let later = program_at_time(t + index.total_loop_duration_ms, &index, anchor).unwrap();
        prop_assert_eq!(later.schedule_index, program.schedule_index);
        prop_assert_eq!(later.loop_number, program.loop_number + 1);
        prop_assert_eq!(later.elapsed_ms, program.elapsed_ms);
    }

    /// Walking next_program from any instant tiles the timeline without
    /// gaps or overlaps.
    #[test]
    fn next_program_tiles_the_timeline(
        durations in proptest::collection::vec(1i64..5_000, 1..10),
        probe in 0i64..1_000_000,
    ) {
        let items: Vec<ResolvedContentItem> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| item(&format!("i{i}"), *d))
            .collect();
        let index = build_schedule_index(&config(items, PlaybackMode::Sequential, 0)).unwrap();
        let mut cursor = program_at_time(probe, &index, 0).unwrap();
        for _ in 0..25 {
            let following = next_program(&cursor, &index, 0).unwrap();
            prop_assert_eq!(following.scheduled_start_ms, cursor.scheduled_end_ms);
            cursor = following;
        }
    }
}
