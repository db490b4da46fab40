//! Sort orders over resolved item lists
//!
//! Every order is total: ties break on the untouched original title and
//! rating key so repeated sorts are byte-stable (sort idempotence).

use std::cmp::Ordering;

use crate::models::channel::SortOrder;
use crate::models::content::ResolvedContentItem;

/// Sort a list by the given order, returning a new vector.
pub fn apply_sort(items: &[ResolvedContentItem], order: SortOrder) -> Vec<ResolvedContentItem> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| compare(a, b, order));
    sorted
}

fn compare(a: &ResolvedContentItem, b: &ResolvedContentItem, order: SortOrder) -> Ordering {
    let primary = match order {
        SortOrder::TitleAsc => title_cmp(a, b),
        SortOrder::TitleDesc => title_cmp(b, a),
        SortOrder::YearAsc => a.year.unwrap_or(0).cmp(&b.year.unwrap_or(0)),
        SortOrder::YearDesc => b.year.unwrap_or(0).cmp(&a.year.unwrap_or(0)),
        SortOrder::DurationAsc => a.duration_ms.cmp(&b.duration_ms),
        SortOrder::DurationDesc => b.duration_ms.cmp(&a.duration_ms),
        SortOrder::AddedAsc => a.added_at.unwrap_or(0).cmp(&b.added_at.unwrap_or(0)),
        SortOrder::AddedDesc => b.added_at.unwrap_or(0).cmp(&a.added_at.unwrap_or(0)),
        SortOrder::EpisodeOrder => (a.season_number.unwrap_or(0), a.episode_number.unwrap_or(0))
            .cmp(&(b.season_number.unwrap_or(0), b.episode_number.unwrap_or(0))),
    };
    primary.then_with(|| tie_break(a, b))
}

fn title_cmp(a: &ResolvedContentItem, b: &ResolvedContentItem) -> Ordering {
    a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
        .then_with(|| a.title.cmp(&b.title))
}

fn tie_break(a: &ResolvedContentItem, b: &ResolvedContentItem) -> Ordering {
    a.title
        .cmp(&b.title)
        .then_with(|| a.rating_key.cmp(&b.rating_key))
}
