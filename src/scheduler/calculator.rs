//! Schedule calculation
//!
//! Pure functions from `(ordered items, anchor, time)` to concrete airings.
//! All arithmetic is integer milliseconds with floored division, so times
//! before the anchor resolve to negative loop numbers instead of panicking.
//! Boundary tie-break: an item's start offset is inclusive, its end offset
//! exclusive.

use chrono::{Datelike, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ScheduleError;
use crate::models::channel::{ChannelConfig, PlaybackMode};
use crate::models::content::ResolvedChannelContent;
use crate::models::schedule::{ScheduleConfig, ScheduleIndex, ScheduledProgram};
use crate::utils::prng::shuffle_with_seed;

/// How a channel's anchor is derived from a reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStrategy {
    /// Local midnight of the reference day, pulled back by
    /// `phase_seed % loop` so channels are not aligned at the same boundary.
    #[default]
    LocalMidnight,
    /// The reference instant itself (the channel's stored anchor when set).
    /// Tuning in starts the loop from the top.
    FixedReference,
}

/// Assemble the daily schedule config for a channel from its resolved
/// content.
///
/// For `shuffle` the pre-order list goes in and the seeded shuffle is
/// reapplied at index build, so rebuilds on the same inputs are
/// byte-identical. For `random` the already-randomized order is carried
/// as-is; rebuilding a loaded schedule must not reshuffle it mid-viewing.
pub fn daily_schedule_config(
    channel: &ChannelConfig,
    content: &ResolvedChannelContent,
    reference_ms: i64,
    offset: FixedOffset,
    strategy: AnchorStrategy,
) -> Result<ScheduleConfig, ScheduleError> {
    let items = match channel.playback_mode {
        PlaybackMode::Shuffle => content.items.clone(),
        PlaybackMode::Sequential | PlaybackMode::Random => content.ordered_items.clone(),
    };
    let total: i64 = items.iter().map(|item| item.duration_ms).sum();
    if items.is_empty() || total <= 0 {
        return Err(ScheduleError::invalid(
            "cannot schedule a channel with no playable time",
        ));
    }

    let anchor_ms = match strategy {
        AnchorStrategy::LocalMidnight => {
            let midnight = local_midnight_ms(reference_ms, offset)?;
            midnight - (i64::from(channel.phase_seed) % total)
        }
        AnchorStrategy::FixedReference => {
            if channel.start_time_anchor > 0 {
                channel.start_time_anchor
            } else {
                reference_ms
            }
        }
    };

    Ok(ScheduleConfig {
        channel_id: channel.id,
        ordered_items: items,
        anchor_ms,
        playback_mode: channel.playback_mode,
        shuffle_seed: channel.shuffle_seed,
    })
}

/// Millisecond timestamp of local midnight for the day containing
/// `reference_ms` in the given offset.
pub fn local_midnight_ms(reference_ms: i64, offset: FixedOffset) -> Result<i64, ScheduleError> {
    let utc = Utc
        .timestamp_millis_opt(reference_ms)
        .single()
        .ok_or_else(|| ScheduleError::invalid(format!("unrepresentable time {reference_ms}")))?;
    let local = utc.with_timezone(&offset);
    let midnight = offset
        .with_ymd_and_hms(local.year(), local.month(), local.day(), 0, 0, 0)
        .single()
        .ok_or_else(|| ScheduleError::invalid("no unambiguous local midnight"))?;
    Ok(midnight.timestamp_millis())
}

/// Build the prefix-sum lookup index for a schedule.
pub fn build_schedule_index(config: &ScheduleConfig) -> Result<ScheduleIndex, ScheduleError> {
    if config.ordered_items.is_empty() {
        return Err(ScheduleError::invalid("schedule has no items"));
    }

    let mut ordered = match config.playback_mode {
        PlaybackMode::Shuffle => shuffle_with_seed(&config.ordered_items, config.shuffle_seed),
        PlaybackMode::Sequential | PlaybackMode::Random => config.ordered_items.clone(),
    };
    for (index, item) in ordered.iter_mut().enumerate() {
        item.scheduled_index = index;
    }

    let mut offsets = Vec::with_capacity(ordered.len());
    let mut cursor: i64 = 0;
    for item in &ordered {
        if item.duration_ms <= 0 {
            return Err(ScheduleError::invalid(format!(
                "item {} has non-positive duration",
                item.rating_key
            )));
        }
        offsets.push(cursor);
        cursor += item.duration_ms;
    }
    if cursor <= 0 {
        return Err(ScheduleError::invalid("schedule loop has zero duration"));
    }

    Ok(ScheduleIndex {
        channel_id: config.channel_id,
        ordered_items: ordered,
        item_start_offsets: offsets,
        total_loop_duration_ms: cursor,
    })
}

/// The program airing at instant `t_ms`.
pub fn program_at_time(
    t_ms: i64,
    index: &ScheduleIndex,
    anchor_ms: i64,
) -> Result<ScheduledProgram, ScheduleError> {
    if index.is_empty() || index.total_loop_duration_ms <= 0 {
        return Err(ScheduleError::invalid("schedule index is empty"));
    }
    let total = index.total_loop_duration_ms;
    let delta = t_ms - anchor_ms;
    let loop_number = delta.div_euclid(total);
    let offset_in_loop = delta.rem_euclid(total);

    // Greatest start offset <= offset_in_loop. An exact hit means that item
    // just started (end offsets are exclusive).
    let position = match index.item_start_offsets.binary_search(&offset_in_loop) {
        Ok(exact) => exact,
        Err(insertion) => insertion - 1,
    };

    let item = index.ordered_items[position].clone();
    let scheduled_start_ms = anchor_ms + loop_number * total + index.item_start_offsets[position];
    let scheduled_end_ms = scheduled_start_ms + item.duration_ms;
    Ok(ScheduledProgram {
        elapsed_ms: t_ms - scheduled_start_ms,
        remaining_ms: scheduled_end_ms - t_ms,
        item,
        scheduled_start_ms,
        scheduled_end_ms,
        schedule_index: position,
        loop_number,
        is_current: true,
    })
}

/// The program immediately after `current`, wrapping to the next loop.
pub fn next_program(
    current: &ScheduledProgram,
    index: &ScheduleIndex,
    anchor_ms: i64,
) -> Result<ScheduledProgram, ScheduleError> {
    if index.is_empty() || index.total_loop_duration_ms <= 0 {
        return Err(ScheduleError::invalid("schedule index is empty"));
    }
    let count = index.len();
    let position = (current.schedule_index + 1) % count;
    let loop_number = if position == 0 {
        current.loop_number + 1
    } else {
        current.loop_number
    };
    let item = index.ordered_items[position].clone();
    let scheduled_start_ms = anchor_ms
        + loop_number * index.total_loop_duration_ms
        + index.item_start_offsets[position];
    let scheduled_end_ms = scheduled_start_ms + item.duration_ms;
    Ok(ScheduledProgram {
        elapsed_ms: 0,
        remaining_ms: item.duration_ms,
        item,
        scheduled_start_ms,
        scheduled_end_ms,
        schedule_index: position,
        loop_number,
        is_current: false,
    })
}

/// Ordered programs overlapping `[range_start_ms, range_end_ms)`, inclusive
/// of the program already airing at the range start.
pub fn window(
    range_start_ms: i64,
    range_end_ms: i64,
    index: &ScheduleIndex,
    anchor_ms: i64,
) -> Result<Vec<ScheduledProgram>, ScheduleError> {
    let mut programs = Vec::new();
    if range_end_ms <= range_start_ms {
        return Ok(programs);
    }
    let mut cursor = program_at_time(range_start_ms, index, anchor_ms)?;
    while cursor.scheduled_start_ms < range_end_ms {
        let following = next_program(&cursor, index, anchor_ms)?;
        programs.push(cursor);
        cursor = following;
    }
    Ok(programs)
}
