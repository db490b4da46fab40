//! Content filter evaluation
//!
//! Filters AND together. Matching rules:
//! - `genre`/`director` treat the item value as a set of strings; `eq` and
//!   `contains` need a case-insensitive match on any element, `neq` and
//!   `not_contains` need absence on all elements.
//! - Missing optional fields (`rating`, `content_rating`, `watched`,
//!   `added_at`) fail the filter.
//! - Ordering comparisons keep the item when either operand is not finite.

use tracing::debug;

use crate::models::channel::{ContentFilter, FilterField, FilterOp, FilterValue};
use crate::models::content::ResolvedContentItem;

/// Apply all filters, keeping items that match every one.
pub fn apply_filters(
    items: &[ResolvedContentItem],
    filters: &[ContentFilter],
) -> Vec<ResolvedContentItem> {
    if filters.is_empty() {
        return items.to_vec();
    }
    let kept: Vec<ResolvedContentItem> = items
        .iter()
        .filter(|item| filters.iter().all(|f| item_matches(item, f)))
        .cloned()
        .collect();
    debug!(
        before = items.len(),
        after = kept.len(),
        filters = filters.len(),
        "applied content filters"
    );
    kept
}

fn item_matches(item: &ResolvedContentItem, filter: &ContentFilter) -> bool {
    match filter.field {
        FilterField::Year => numeric_match(item.year.map(f64::from), filter),
        FilterField::Rating => numeric_match(item.rating, filter),
        FilterField::Duration => numeric_match(Some(item.duration_ms as f64), filter),
        FilterField::AddedAt => numeric_match(item.added_at.map(|v| v as f64), filter),
        FilterField::Watched => flag_match(item.watched, filter),
        FilterField::ContentRating => scalar_text_match(item.content_rating.as_deref(), filter),
        FilterField::Genre => set_match(&item.genres, filter),
        FilterField::Director => set_match(&item.directors, filter),
    }
}

fn numeric_match(item_value: Option<f64>, filter: &ContentFilter) -> bool {
    let filter_value = filter.value.as_number();
    match filter.op {
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            // Keep when either operand is missing or not finite.
            let (Some(lhs), Some(rhs)) = (item_value, filter_value) else {
                return true;
            };
            if !lhs.is_finite() || !rhs.is_finite() {
                return true;
            }
            match filter.op {
                FilterOp::Gt => lhs > rhs,
                FilterOp::Gte => lhs >= rhs,
                FilterOp::Lt => lhs < rhs,
                FilterOp::Lte => lhs <= rhs,
                _ => unreachable!(),
            }
        }
        FilterOp::Eq | FilterOp::Contains => match (item_value, filter_value) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        },
        FilterOp::Neq | FilterOp::NotContains => match (item_value, filter_value) {
            (Some(lhs), Some(rhs)) => lhs != rhs,
            _ => false,
        },
    }
}

fn flag_match(item_value: Option<bool>, filter: &ContentFilter) -> bool {
    let (Some(lhs), Some(rhs)) = (item_value, filter.value.as_flag()) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq | FilterOp::Contains => lhs == rhs,
        FilterOp::Neq | FilterOp::NotContains => lhs != rhs,
        // Ordering over booleans is meaningless; keep the item.
        _ => true,
    }
}

fn scalar_text_match(item_value: Option<&str>, filter: &ContentFilter) -> bool {
    let Some(rhs) = filter.value.as_text() else {
        return false;
    };
    let rhs = rhs.to_lowercase();
    let Some(lhs) = item_value.map(str::to_lowercase) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => lhs == rhs,
        FilterOp::Neq => lhs != rhs,
        FilterOp::Contains => lhs.contains(&rhs),
        FilterOp::NotContains => !lhs.contains(&rhs),
        // Lexicographic ordering of ratings is not meaningful; keep.
        _ => true,
    }
}

fn set_match(values: &[String], filter: &ContentFilter) -> bool {
    let Some(rhs) = filter.value.as_text() else {
        return false;
    };
    let rhs = rhs.to_lowercase();
    let any_eq = values.iter().any(|v| v.to_lowercase() == rhs);
    let any_contains = values.iter().any(|v| v.to_lowercase().contains(&rhs));
    match filter.op {
        FilterOp::Eq => any_eq,
        FilterOp::Contains => any_contains,
        FilterOp::Neq => !any_eq,
        FilterOp::NotContains => !any_contains,
        _ => true,
    }
}

impl FilterValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
            Self::Flag(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Text(s) => match s.to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Self::Number(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::MediaKind;

    fn item(title: &str) -> ResolvedContentItem {
        ResolvedContentItem {
            rating_key: title.to_lowercase(),
            kind: MediaKind::Movie,
            title: title.to_string(),
            full_title: title.to_string(),
            duration_ms: 5_400_000,
            thumb: None,
            year: Some(1994),
            season_number: None,
            episode_number: None,
            rating: Some(8.5),
            content_rating: Some("PG-13".into()),
            genres: vec!["Drama".into(), "Crime".into()],
            directors: vec!["Frank Darabont".into()],
            watched: Some(false),
            added_at: Some(1_700_000_000_000),
            scheduled_index: 0,
            media_info: None,
        }
    }

    fn filter(field: FilterField, op: FilterOp, value: FilterValue) -> ContentFilter {
        ContentFilter { field, op, value }
    }

    #[test]
    fn filters_and_together() {
        let items = vec![item("A"), item("B")];
        let filters = vec![
            filter(FilterField::Year, FilterOp::Gte, FilterValue::Number(1990.0)),
            filter(
                FilterField::Genre,
                FilterOp::Eq,
                FilterValue::Text("drama".into()),
            ),
        ];
        assert_eq!(apply_filters(&items, &filters).len(), 2);

        let filters = vec![
            filter(FilterField::Year, FilterOp::Gte, FilterValue::Number(1990.0)),
            filter(
                FilterField::Genre,
                FilterOp::Eq,
                FilterValue::Text("comedy".into()),
            ),
        ];
        assert!(apply_filters(&items, &filters).is_empty());
    }

    #[test]
    fn missing_optional_field_fails_filter() {
        let mut unrated = item("A");
        unrated.rating = None;
        let filters = vec![filter(
            FilterField::Rating,
            FilterOp::Eq,
            FilterValue::Number(8.5),
        )];
        assert!(apply_filters(&[unrated], &filters).is_empty());
    }

    #[test]
    fn non_finite_comparison_keeps_item() {
        let mut unrated = item("A");
        unrated.rating = None;
        let filters = vec![filter(
            FilterField::Rating,
            FilterOp::Gte,
            FilterValue::Number(7.0),
        )];
        assert_eq!(apply_filters(&[unrated], &filters).len(), 1);

        let filters = vec![filter(
            FilterField::Year,
            FilterOp::Lt,
            FilterValue::Number(f64::NAN),
        )];
        assert_eq!(apply_filters(&[item("A")], &filters).len(), 1);
    }

    #[test]
    fn set_fields_match_case_insensitively() {
        let filters = vec![filter(
            FilterField::Director,
            FilterOp::Contains,
            FilterValue::Text("darabont".into()),
        )];
        assert_eq!(apply_filters(&[item("A")], &filters).len(), 1);

        let filters = vec![filter(
            FilterField::Director,
            FilterOp::NotContains,
            FilterValue::Text("darabont".into()),
        )];
        assert!(apply_filters(&[item("A")], &filters).is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let items = vec![item("A"), item("B"), item("C")];
        let filters = vec![filter(
            FilterField::Watched,
            FilterOp::Eq,
            FilterValue::Flag(false),
        )];
        let once = apply_filters(&items, &filters);
        let twice = apply_filters(&once, &filters);
        assert_eq!(once, twice);
    }
}
