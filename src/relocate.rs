//! Dwell-period relocation batch.
//!
//! Items left unclaimed past the dwell period move from their initial
//! default box to long-term storage. The long-term location is
//! `"yy-mm-dd-nn-nn"`: the item's *found* date plus the box number it
//! was assigned at registration, doubled (box `"01"` becomes `"01-01"`).
//! The box number is read back from the stored location, never
//! recomputed, so a re-run cannot disagree with the first run.
//!
//! Exempt classes — ownership-claim, umbrella, and refrigerator/freezer
//! slots — are never relocated. Detection is purely by location pattern;
//! there is no "already relocated" flag, which makes the whole batch
//! safe to re-run after a partial failure: locations already in
//! long-term form are no-ops.
//!
//! A failure on one item (an unparseable location) is collected into the
//! report and never aborts the rest of the batch. Overlapping batch runs
//! are the operator's to prevent (external run lock); the per-item
//! rewrite itself is idempotent.

use chrono::{Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::EngineError;
use crate::models::Item;

/// `yy-mm-dd-nn` — an initial default box slot.
static DEFAULT_SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{2}-(\d{2})$").unwrap());

/// `yy-mm-dd-nn-nn` — a long-term slot; relocation already happened.
static LONG_TERM_SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{2}-\d{2}-\d{2}$").unwrap());

/// Exempt classes: ownership claim, umbrella stand, refrigerator and
/// freezer.
static EXEMPT_SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(所有権主張|umb|冷蔵庫|冷凍庫)$").unwrap());

/// Relocation tuning.
#[derive(Debug, Clone)]
pub struct RelocationPolicy {
    /// Days an item dwells before moving to long-term storage.
    pub dwell_days: i64,
}

impl Default for RelocationPolicy {
    fn default() -> Self {
        Self { dwell_days: 7 }
    }
}

/// One rewrite the batch decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub item_id: String,
    pub new_location: String,
}

/// A per-item failure; the batch continues past these.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub item_id: String,
    pub reason: String,
}

/// Outcome of one batch run.
#[derive(Debug, Default)]
pub struct RelocationReport {
    pub moved: Vec<Relocation>,
    /// Location already in long-term form (idempotent no-op).
    pub skipped_already: usize,
    /// Location in an exempt class.
    pub skipped_exempt: usize,
    /// Dwell period not yet elapsed.
    pub skipped_young: usize,
    pub failures: Vec<ItemFailure>,
}

/// Decide the long-term moves for `items` as of `as_of`.
///
/// Pure over its inputs: the caller applies `moved` to the persisted
/// records. Items are processed independently; one bad record never
/// stops the rest.
pub fn relocate(items: &[Item], as_of: NaiveDateTime, policy: &RelocationPolicy) -> RelocationReport {
    let mut report = RelocationReport::default();

    for item in items {
        let location = item.storage_location.as_str();

        if LONG_TERM_SLOT.is_match(location) {
            report.skipped_already += 1;
            continue;
        }

        if EXEMPT_SLOT.is_match(location) {
            report.skipped_exempt += 1;
            continue;
        }

        if as_of - item.accepted_at < Duration::days(policy.dwell_days) {
            report.skipped_young += 1;
            continue;
        }

        let Some(caps) = DEFAULT_SLOT.captures(location) else {
            report.failures.push(ItemFailure {
                item_id: item.item_id.clone(),
                reason: EngineError::BadStorageLocation(location.to_string()).to_string(),
            });
            continue;
        };
        let box_no = &caps[1];

        report.moved.push(Relocation {
            item_id: item.item_id.clone(),
            new_location: format!(
                "{}-{}-{}",
                item.found_at.date().format("%y-%m-%d"),
                box_no,
                box_no
            ),
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemStatus, RightsFlags};
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn item(id: &str, location: &str, found: NaiveDateTime, accepted: NaiveDateTime) -> Item {
        Item {
            item_id: id.to_string(),
            facility_id: "F1".to_string(),
            found_at: found,
            accepted_at: accepted,
            category_large: "貴重品".to_string(),
            category_medium: "財布".to_string(),
            name: "財布".to_string(),
            features: String::new(),
            color: "黒".to_string(),
            rights: RightsFlags::default(),
            storage_location: location.to_string(),
            status: ItemStatus::InStorage,
        }
    }

    #[test]
    fn test_moves_after_dwell_period() {
        let items = vec![item("a", "25-06-20-01", at(2025, 6, 20), at(2025, 6, 20))];
        let report = relocate(&items, at(2025, 6, 28), &RelocationPolicy::default());
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.moved[0].new_location, "25-06-20-01-01");
    }

    #[test]
    fn test_young_items_stay() {
        let items = vec![item("a", "25-06-20-01", at(2025, 6, 20), at(2025, 6, 20))];
        let report = relocate(&items, at(2025, 6, 26), &RelocationPolicy::default());
        assert!(report.moved.is_empty());
        assert_eq!(report.skipped_young, 1);
    }

    #[test]
    fn test_exempt_classes_never_move() {
        let found = at(2025, 6, 1);
        let items = vec![
            item("a", "25-06-01-所有権主張", found, found),
            item("b", "25-06-01-umb", found, found),
            item("c", "25-06-01-冷蔵庫", found, found),
            item("d", "25-06-01-冷凍庫", found, found),
        ];
        let report = relocate(&items, at(2025, 7, 1), &RelocationPolicy::default());
        assert!(report.moved.is_empty());
        assert_eq!(report.skipped_exempt, 4);
    }

    #[test]
    fn test_idempotent_second_run_is_noop() {
        let found = at(2025, 6, 20);
        let items = vec![item("a", "25-06-20-02", found, found)];
        let as_of = at(2025, 6, 30);
        let policy = RelocationPolicy::default();

        let first = relocate(&items, as_of, &policy);
        assert_eq!(first.moved[0].new_location, "25-06-20-02-02");

        // Apply the move and run again: nothing left to do.
        let mut moved_items = items.clone();
        moved_items[0].storage_location = first.moved[0].new_location.clone();
        let second = relocate(&moved_items, as_of, &policy);
        assert!(second.moved.is_empty());
        assert_eq!(second.skipped_already, 1);
    }

    #[test]
    fn test_long_term_prefix_is_found_date() {
        // Accepted a day after it was found: the long-term location
        // carries the found date.
        let items = vec![item("a", "25-06-20-01", at(2025, 6, 20), at(2025, 6, 21))];
        let report = relocate(&items, at(2025, 6, 29), &RelocationPolicy::default());
        assert_eq!(report.moved[0].new_location, "25-06-20-01-01");
    }

    #[test]
    fn test_bad_location_is_collected_not_fatal() {
        let found = at(2025, 6, 1);
        let items = vec![
            item("bad", "棚B-3", found, found),
            item("good", "25-06-01-01", found, found),
        ];
        let report = relocate(&items, at(2025, 7, 1), &RelocationPolicy::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item_id, "bad");
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.moved[0].item_id, "good");
    }

    #[test]
    fn test_dwell_boundary_is_inclusive() {
        let items = vec![item("a", "25-06-20-01", at(2025, 6, 20), at(2025, 6, 20))];
        // Exactly 7 days later, same wall time: moves.
        let report = relocate(&items, at(2025, 6, 27), &RelocationPolicy::default());
        assert_eq!(report.moved.len(), 1);
    }
}
