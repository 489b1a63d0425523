//! Storage slot allocation.
//!
//! The initial storage location is decided by an ordered list of rules,
//! evaluated in strict priority order with first match winning:
//!
//! 1. ownership claim → `"yy-mm-dd-所有権主張"`
//! 2. umbrella category → `"yy-mm-dd-umb"`
//! 3. food feature markers → `"yy-mm-dd-冷蔵庫"` / `"yy-mm-dd-冷凍庫"`
//! 4. default box slot → `"yy-mm-dd-nn"`
//!
//! The ordering is load-bearing: rights-claim storage has legal handling
//! implications and must never be overridden by a coincidental category
//! match. An umbrella whose owner claims ownership goes to the ownership
//! slot, not the umbrella slot.
//!
//! Each rule is its own [`SlotRule`] object so it can be unit-tested in
//! isolation; the priority lives in the list order, not in branching
//! control flow. Only the default rule consumes box capacity: items
//! routed by rules 1–3 never advance the day counter.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::counter::{CounterKey, CounterStore};
use crate::error::EngineError;
use crate::models::RightsFlags;
use crate::normalize::normalize_compact;

/// Everything a slot rule may consult.
#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub facility: String,
    /// The item's found date — the date the location string carries.
    pub date: NaiveDate,
    /// Medium label of the caller-confirmed category, if any.
    pub category_medium: Option<String>,
    pub feature_text: String,
    pub rights: RightsFlags,
    /// Pre-extracted hint from the visual feature extractor.
    pub is_food: Option<bool>,
    /// Pre-extracted hint from the visual feature extractor.
    pub is_umbrella: Option<bool>,
}

impl SlotRequest {
    fn ymd(&self) -> String {
        self.date.format("%y-%m-%d").to_string()
    }
}

/// A computed slot assignment.
#[derive(Debug, Clone)]
pub struct SlotAssignment {
    pub location: String,
    /// Name of the rule that matched (for logs and tests).
    pub rule: &'static str,
}

/// One priority rule: a predicate and its location formatter.
///
/// `evaluate` returns `Ok(None)` when the rule does not apply.
pub trait SlotRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, req: &SlotRequest) -> Result<Option<String>, EngineError>;
}

/// Rule 1: ownership claims get their own legally-tracked slot.
pub struct OwnershipRule;

impl SlotRule for OwnershipRule {
    fn name(&self) -> &'static str {
        "ownership"
    }

    fn evaluate(&self, req: &SlotRequest) -> Result<Option<String>, EngineError> {
        if req.rights.claims_ownership {
            Ok(Some(format!("{}-所有権主張", req.ymd())))
        } else {
            Ok(None)
        }
    }
}

/// Rule 2: umbrellas go to the umbrella stand.
pub struct UmbrellaRule {
    labels: Vec<String>,
}

impl UmbrellaRule {
    pub fn new(labels: &[String]) -> Self {
        Self {
            labels: labels.iter().map(|l| normalize_compact(l)).collect(),
        }
    }
}

impl SlotRule for UmbrellaRule {
    fn name(&self) -> &'static str {
        "umbrella"
    }

    fn evaluate(&self, req: &SlotRequest) -> Result<Option<String>, EngineError> {
        let hinted = req.is_umbrella == Some(true);
        let by_category = req
            .category_medium
            .as_deref()
            .map(|label| self.labels.iter().any(|l| *l == normalize_compact(label)))
            .unwrap_or(false);

        if hinted || by_category {
            Ok(Some(format!("{}-umb", req.ymd())))
        } else {
            Ok(None)
        }
    }
}

/// Rule 3: perishables go to the refrigerator, frozen goods to the
/// freezer.
///
/// Marker lists come from configuration; a generic food marker alone
/// routes to the refrigerator, a frozen marker upgrades to the freezer.
pub struct FoodRule {
    food_markers: Vec<String>,
    frozen_markers: Vec<String>,
}

impl FoodRule {
    pub fn new(food_markers: &[String], frozen_markers: &[String]) -> Self {
        Self {
            food_markers: food_markers.iter().map(|m| normalize_compact(m)).collect(),
            frozen_markers: frozen_markers
                .iter()
                .map(|m| normalize_compact(m))
                .collect(),
        }
    }

    fn contains_any(text: &str, markers: &[String]) -> bool {
        markers.iter().any(|m| !m.is_empty() && text.contains(m))
    }
}

impl SlotRule for FoodRule {
    fn name(&self) -> &'static str {
        "food"
    }

    fn evaluate(&self, req: &SlotRequest) -> Result<Option<String>, EngineError> {
        let features = normalize_compact(&req.feature_text);
        let frozen = Self::contains_any(&features, &self.frozen_markers);
        let is_food =
            req.is_food == Some(true) || frozen || Self::contains_any(&features, &self.food_markers);

        if !is_food {
            return Ok(None);
        }

        let slot = if frozen { "冷凍庫" } else { "冷蔵庫" };
        Ok(Some(format!("{}-{}", req.ymd(), slot)))
    }
}

/// Rule 4: the default box slot, `"yy-mm-dd-nn"`.
///
/// `nn` is the box-sequence number for `(facility, date)`: assignments
/// 1 through `capacity` share box `"01"`, the next `capacity` share
/// `"02"`, and so on. This rule always matches, so it must be last.
pub struct DefaultRule {
    counters: Arc<dyn CounterStore>,
    capacity: u64,
}

impl DefaultRule {
    pub fn new(counters: Arc<dyn CounterStore>, capacity: u64) -> Self {
        Self { counters, capacity }
    }
}

impl SlotRule for DefaultRule {
    fn name(&self) -> &'static str {
        "default"
    }

    fn evaluate(&self, req: &SlotRequest) -> Result<Option<String>, EngineError> {
        let seq = self.counters.increment(&CounterKey::Day {
            facility: req.facility.clone(),
            date: req.date,
        })?;
        let box_no = (seq - 1) / self.capacity + 1;
        Ok(Some(format!("{}-{:02}", req.ymd(), box_no)))
    }
}

/// The ordered rule list.
pub struct SlotAllocator {
    rules: Vec<Box<dyn SlotRule>>,
}

impl SlotAllocator {
    /// Build the standard rule chain from configuration.
    pub fn new(config: &StorageConfig, counters: Arc<dyn CounterStore>) -> Self {
        Self {
            rules: vec![
                Box::new(OwnershipRule),
                Box::new(UmbrellaRule::new(&config.umbrella_labels)),
                Box::new(FoodRule::new(
                    &config.food_markers,
                    &config.frozen_markers,
                )),
                Box::new(DefaultRule::new(counters, config.box_capacity)),
            ],
        }
    }

    /// Evaluate the rules in order; the first match wins.
    pub fn assign(&self, req: &SlotRequest) -> Result<SlotAssignment, EngineError> {
        for rule in &self.rules {
            if let Some(location) = rule.evaluate(req)? {
                return Ok(SlotAssignment {
                    location,
                    rule: rule.name(),
                });
            }
        }
        // Unreachable with the standard chain: the default rule always
        // matches.
        Err(EngineError::BadStorageLocation(
            "no slot rule matched".to_string(),
        ))
    }
}
