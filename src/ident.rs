//! Item identifier generation.
//!
//! Item ids follow the `yy-mm-dd-h-nn` scheme: acceptance date, 24-hour
//! acceptance hour (unpadded), and a two-digit 1-based sequence number
//! unique within the `(facility, date, hour)` key. Sequence numbers come
//! from an injected [`CounterStore`] so they never repeat or skip under
//! concurrent registrations, and so tests can supply an in-memory fake.
//!
//! A registration must never be refused because a terminal's clock
//! jitters backwards across an hour boundary. When `accepted_at`
//! regresses to an earlier key than the facility's most recent one, the
//! id is issued under the latest known key instead and the result is
//! flagged so the caller can log the warning.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::counter::{CounterKey, CounterStore};
use crate::error::EngineError;

/// An issued item identifier.
#[derive(Debug, Clone)]
pub struct IssuedId {
    pub id: String,
    /// The acceptance timestamp regressed behind the facility's latest
    /// key and the id was issued under that latest key instead.
    pub clock_skew: bool,
}

/// Generates `yy-mm-dd-h-nn` item identifiers.
pub struct IdGenerator {
    counters: Arc<dyn CounterStore>,
    /// Most recent `(date, hour)` key seen per facility.
    latest: RwLock<HashMap<String, (NaiveDate, u32)>>,
}

impl IdGenerator {
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self {
            counters,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Issue the next identifier for a facility at `accepted_at`.
    ///
    /// The sequence counter for the `(facility, date, hour)` key starts
    /// at 1 on first use and increments by 1 per call; it never resets
    /// until the key changes.
    pub fn next_id(
        &self,
        facility: &str,
        accepted_at: NaiveDateTime,
    ) -> Result<IssuedId, EngineError> {
        let requested = (accepted_at.date(), accepted_at.hour());

        let (date, hour, clock_skew) = {
            let mut latest = self
                .latest
                .write()
                .map_err(|e| EngineError::CounterStore(e.to_string()))?;
            match latest.get(facility) {
                Some(&last) if requested < last => {
                    // Clock went backwards: issue under the latest known
                    // key rather than reusing an older sequence.
                    (last.0, last.1, true)
                }
                _ => {
                    latest.insert(facility.to_string(), requested);
                    (requested.0, requested.1, false)
                }
            }
        };

        let seq = self.counters.increment(&CounterKey::Hour {
            facility: facility.to_string(),
            date,
            hour,
        })?;

        Ok(IssuedId {
            id: format!("{}-{}-{:02}", date.format("%y-%m-%d"), hour, seq),
            clock_skew,
        })
    }
}
