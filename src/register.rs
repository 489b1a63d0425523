//! Registration orchestration.
//!
//! Glues the identifier generator and the slot allocator together for
//! one accepted item: the caller has already confirmed a category
//! suggestion (or typed one in), so this step is synchronous and never
//! waits on the matcher or an embedding model. The produced [`Item`] is
//! handed back for the external persistence collaborator to store.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::counter::CounterStore;
use crate::error::EngineError;
use crate::ident::IdGenerator;
use crate::models::{Item, ItemStatus, RightsFlags};
use crate::slot::{SlotAllocator, SlotRequest};

/// One accepted item, ready for id and slot assignment.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub facility_id: String,
    pub found_at: NaiveDateTime,
    pub accepted_at: NaiveDateTime,
    /// Caller-confirmed category pair.
    pub category_large: String,
    pub category_medium: String,
    pub name: String,
    #[serde(default)]
    pub features: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub claims_ownership: bool,
    #[serde(default)]
    pub claims_reward: bool,
    #[serde(default)]
    pub is_food: Option<bool>,
    #[serde(default)]
    pub is_umbrella: Option<bool>,
}

/// A completed registration.
#[derive(Debug)]
pub struct RegistrationOutcome {
    pub item: Item,
    /// Which slot rule placed the item (for logs).
    pub slot_rule: &'static str,
    /// The acceptance timestamp regressed and the id was issued under
    /// the facility's latest key; worth a warning in the caller's log.
    pub clock_skew: bool,
}

/// Issues identifiers and storage slots for accepted items.
pub struct Registrar {
    ids: IdGenerator,
    slots: SlotAllocator,
}

impl Registrar {
    /// Both counters (id sequences and box sequences) live in the same
    /// injected store; their keys are disjoint.
    pub fn new(storage: &StorageConfig, counters: Arc<dyn CounterStore>) -> Self {
        Self {
            ids: IdGenerator::new(Arc::clone(&counters)),
            slots: SlotAllocator::new(storage, counters),
        }
    }

    /// Issue the item id, compute the storage slot, and assemble the
    /// record for persistence.
    pub fn register(&self, req: &RegistrationRequest) -> Result<RegistrationOutcome, EngineError> {
        let issued = self.ids.next_id(&req.facility_id, req.accepted_at)?;

        let rights = RightsFlags {
            claims_ownership: req.claims_ownership,
            claims_reward: req.claims_reward,
        };

        let assignment = self.slots.assign(&SlotRequest {
            facility: req.facility_id.clone(),
            date: req.found_at.date(),
            category_medium: Some(req.category_medium.clone()),
            feature_text: req.features.clone(),
            rights,
            is_food: req.is_food,
            is_umbrella: req.is_umbrella,
        })?;

        Ok(RegistrationOutcome {
            item: Item {
                item_id: issued.id,
                facility_id: req.facility_id.clone(),
                found_at: req.found_at,
                accepted_at: req.accepted_at,
                category_large: req.category_large.clone(),
                category_medium: req.category_medium.clone(),
                name: req.name.clone(),
                features: req.features.clone(),
                color: req.color.clone(),
                rights,
                storage_location: assignment.location,
                status: ItemStatus::InStorage,
            },
            slot_rule: assignment.rule,
            clock_skew: issued.clock_skew,
        })
    }
}

/// Parse a batch of registration requests from a JSON array.
pub fn parse_requests(content: &str) -> anyhow::Result<Vec<RegistrationRequest>> {
    let requests: Vec<RegistrationRequest> = serde_json::from_str(content)?;
    Ok(requests)
}
