//! Core data models for the classification and placement engine.
//!
//! These types flow through the suggestion, registration, and relocation
//! pipeline. Persistence of [`Item`] records is owned by an external
//! collaborator; this crate only produces and consumes them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A weighted classification keyword attached to a medium category.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Keyword {
    pub term: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// An immutable taxonomy node: one medium category under a large one.
///
/// `(large_label, medium_label)` pairs are unique within a taxonomy
/// version. The embedding, once computed from the canonical keyword
/// text, is treated as immutable for the lifetime of that version;
/// `keyword_hash` detects staleness when the document changes.
#[derive(Debug, Clone)]
pub struct Category {
    pub large_label: String,
    pub medium_label: String,
    /// Tie-break priority carried from the taxonomy document.
    pub priority: i64,
    pub keywords: Vec<Keyword>,
    /// Normalized, space-joined keyword terms — the text the category
    /// embedding is computed from.
    pub canonical_text: String,
    /// SHA-256 of `canonical_text`, hex-encoded.
    pub keyword_hash: String,
    /// Precomputed embedding of `canonical_text`, if available.
    pub embedding: Option<Vec<f32>>,
}

/// Ephemeral input to the category matcher.
///
/// The text fields may come from a human operator or from the external
/// visual feature extractor (which also supplies the optional hints).
/// Not persisted by this engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassificationQuery {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub features: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub claims_ownership: bool,
    #[serde(default)]
    pub claims_reward: bool,
    /// Pre-extracted "this is food" hint from the feature extractor.
    #[serde(default)]
    pub is_food: Option<bool>,
    /// Pre-extracted "this is an umbrella" hint.
    #[serde(default)]
    pub is_umbrella: Option<bool>,
}

impl ClassificationQuery {
    /// The single text the matcher ranks against: name, features, and
    /// color concatenated in declaration order.
    pub fn combined_text(&self) -> String {
        let mut parts = Vec::new();
        for field in [&self.name, &self.features, &self.color] {
            if !field.trim().is_empty() {
                parts.push(field.trim());
            }
        }
        parts.join(" ")
    }
}

/// One ranked category suggestion.
///
/// `score` is in `[0.0, 1.0]`: cosine similarity (clamped at zero) in
/// embedding mode, `1.0`/`0.0` for keyword containment in fallback mode.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub large_label: String,
    pub medium_label: String,
    pub score: f64,
}

impl Suggestion {
    /// Confidence percentage for presentation (`round(score × 100)`).
    pub fn confidence_pct(&self) -> u8 {
        (self.score * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Ordered category suggestions, descending by score.
pub type ClassificationResult = Vec<Suggestion>;

/// Which ranking strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMode {
    Embedding,
    /// Keyword containment — either configured, or an embedding-path
    /// degradation.
    Keyword,
}

/// Rights-claim flags recorded at acceptance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RightsFlags {
    #[serde(default)]
    pub claims_ownership: bool,
    #[serde(default)]
    pub claims_reward: bool,
}

/// Item lifecycle status, as tracked by the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// In storage (the only status this engine assigns).
    #[serde(rename = "保管中")]
    InStorage,
    #[serde(rename = "返還済")]
    Returned,
    #[serde(rename = "警察届出済")]
    ReportedToPolice,
    #[serde(rename = "廃棄済")]
    Disposed,
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::InStorage
    }
}

/// A fully-formed item record as handed to the persistence collaborator.
///
/// `item_id` is globally unique and immutable once assigned.
/// `storage_location` is mutated exactly once, by the relocation
/// scheduler, barring manual operator override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub facility_id: String,
    pub found_at: NaiveDateTime,
    pub accepted_at: NaiveDateTime,
    pub category_large: String,
    pub category_medium: String,
    pub name: String,
    pub features: String,
    pub color: String,
    #[serde(flatten)]
    pub rights: RightsFlags,
    pub storage_location: String,
    #[serde(default)]
    pub status: ItemStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_text_skips_empty_fields() {
        let q = ClassificationQuery {
            name: "財布".to_string(),
            features: String::new(),
            color: "黒".to_string(),
            ..Default::default()
        };
        assert_eq!(q.combined_text(), "財布 黒");
    }

    #[test]
    fn test_confidence_pct_rounds() {
        let s = Suggestion {
            large_label: "l".into(),
            medium_label: "m".into(),
            score: 0.876,
        };
        assert_eq!(s.confidence_pct(), 88);
    }

    #[test]
    fn test_item_status_serializes_to_japanese() {
        let s = serde_json::to_string(&ItemStatus::InStorage).unwrap();
        assert_eq!(s, "\"保管中\"");
    }
}
