//! Schedule model
//!
//! A channel's schedule is a loop: items laid end to end, repeated from an
//! anchor timestamp. The index precomputes prefix sums so "what airs at T"
//! is a binary search.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ScheduleError;
use crate::models::channel::PlaybackMode;
use crate::models::content::ResolvedContentItem;

/// Input to the schedule calculator: the ordered items of one channel plus
/// the anchor the loop is referenced to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub channel_id: Uuid,
    pub ordered_items: Vec<ResolvedContentItem>,
    /// Absolute unix-millisecond timestamp of loop position zero
    pub anchor_ms: i64,
    #[serde(default)]
    pub playback_mode: PlaybackMode,
    #[serde(default)]
    pub shuffle_seed: u32,
}

/// Precomputed lookup structure for one channel's loop.
///
/// Invariants: `item_start_offsets[0] == 0`, offsets strictly increase, and
/// the implicit end offset equals `total_loop_duration_ms`.
#[derive(Debug, Clone)]
pub struct ScheduleIndex {
    pub channel_id: Uuid,
    pub ordered_items: Vec<ResolvedContentItem>,
    pub item_start_offsets: Vec<i64>,
    pub total_loop_duration_ms: i64,
}

impl ScheduleIndex {
    pub fn len(&self) -> usize {
        self.ordered_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_items.is_empty()
    }

    /// Offset of the item *after* `index`, i.e. its exclusive end offset.
    pub fn end_offset(&self, index: usize) -> Result<i64, ScheduleError> {
        let start = self
            .item_start_offsets
            .get(index)
            .copied()
            .ok_or_else(|| ScheduleError::invalid(format!("index {index} out of range")))?;
        let item = &self.ordered_items[index];
        Ok(start + item.duration_ms)
    }
}

/// One concrete airing of an item: an `(loop_number, schedule_index)`
/// coordinate materialized into wall-clock times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledProgram {
    pub item: ResolvedContentItem,
    pub scheduled_start_ms: i64,
    pub scheduled_end_ms: i64,
    pub elapsed_ms: i64,
    pub remaining_ms: i64,
    pub schedule_index: usize,
    pub loop_number: i64,
    pub is_current: bool,
}

impl ScheduledProgram {
    /// The airing identity used to dedupe program-start emissions.
    pub fn airing_key(&self) -> (i64, usize) {
        (self.loop_number, self.schedule_index)
    }

    /// Whether this airing covers the instant `t_ms` (start inclusive, end
    /// exclusive).
    pub fn covers(&self, t_ms: i64) -> bool {
        self.scheduled_start_ms <= t_ms && t_ms < self.scheduled_end_ms
    }
}
