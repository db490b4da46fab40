//! Playback-mode ordering
//!
//! The final reorder before a list becomes a schedule. Sequential preserves
//! the resolved order; shuffle is the deterministic seeded permutation;
//! random reshuffles from the wall clock on every resolve and is the only
//! intentionally nondeterministic path.

use crate::models::channel::PlaybackMode;
use crate::models::content::ResolvedContentItem;
use crate::utils::prng::shuffle_with_seed;

/// Order items per the playback mode and rewrite `scheduled_index` densely.
pub fn apply_playback_mode(
    items: Vec<ResolvedContentItem>,
    mode: PlaybackMode,
    seed: u32,
    now_ms: i64,
) -> Vec<ResolvedContentItem> {
    let mut ordered = match mode {
        PlaybackMode::Sequential => items,
        PlaybackMode::Shuffle => shuffle_with_seed(&items, seed),
        PlaybackMode::Random => shuffle_with_seed(&items, now_ms as u32),
    };
    reindex(&mut ordered);
    ordered
}

/// Rewrite `scheduled_index` to a dense `0..n`.
pub fn reindex(items: &mut [ResolvedContentItem]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.scheduled_index = index;
    }
}
