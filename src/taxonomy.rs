//! Taxonomy store: loads and holds the category graph.
//!
//! The taxonomy is a versioned JSON document listing large categories,
//! their medium categories, and weighted keyword lists. It is loaded
//! once at startup and is pure data afterwards — no behavior beyond
//! lookup. Category embeddings are attached separately, after the
//! vector cache (or a live precompute run) supplies them.
//!
//! Each category carries a SHA-256 hash of its canonical keyword text.
//! A cached vector is only valid while the hash it was computed under
//! still matches; editing a category's keywords in the document
//! invalidates its cached embedding and nothing else.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use crate::error::EngineError;
use crate::models::{Category, Keyword};
use crate::normalize::normalize;

/// Raw document shape: one large category.
#[derive(Debug, Deserialize)]
struct RawLargeCategory {
    #[serde(default)]
    large_category_id: String,
    #[serde(default)]
    large_category_name_ja: String,
    #[serde(default)]
    medium_categories: Vec<RawMediumCategory>,
}

/// Raw document shape: one medium category with its keyword list.
#[derive(Debug, Deserialize)]
struct RawMediumCategory {
    #[serde(default)]
    medium_category_id: String,
    #[serde(default)]
    medium_category_name_ja: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    keywords: Vec<Keyword>,
}

/// The loaded category graph. Immutable apart from embedding attachment.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    /// Load the taxonomy document from disk.
    ///
    /// Fails with [`EngineError::TaxonomyUnavailable`] on a missing or
    /// malformed file, a duplicate `(large, medium)` pair, or an empty
    /// category list.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::TaxonomyUnavailable(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse a taxonomy document from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, EngineError> {
        let raw: Vec<RawLargeCategory> = serde_json::from_str(content)
            .map_err(|e| EngineError::TaxonomyUnavailable(format!("invalid JSON: {}", e)))?;

        let mut categories = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for large in raw {
            let large_label = pick_label(&large.large_category_name_ja, &large.large_category_id);
            for medium in large.medium_categories {
                let medium_label =
                    pick_label(&medium.medium_category_name_ja, &medium.medium_category_id);
                if !seen.insert((large_label.clone(), medium_label.clone())) {
                    return Err(EngineError::TaxonomyUnavailable(format!(
                        "duplicate category pair: ({}, {})",
                        large_label, medium_label
                    )));
                }

                let canonical_text = canonical_keyword_text(&medium.keywords);
                let keyword_hash = hash_text(&canonical_text);

                categories.push(Category {
                    large_label: large_label.clone(),
                    medium_label,
                    priority: medium.priority,
                    keywords: medium.keywords,
                    canonical_text,
                    keyword_hash,
                    embedding: None,
                });
            }
        }

        if categories.is_empty() {
            return Err(EngineError::TaxonomyUnavailable(
                "taxonomy document contains no categories".to_string(),
            ));
        }

        Ok(Self { categories })
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Categories in declaration order (the tie-break order for ranking).
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Look up a category by its `(large, medium)` label pair.
    pub fn find(&self, large_label: &str, medium_label: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.large_label == large_label && c.medium_label == medium_label)
    }

    /// Attach a precomputed embedding to the category at `index`.
    pub fn attach_embedding(&mut self, index: usize, vector: Vec<f32>) {
        if let Some(cat) = self.categories.get_mut(index) {
            cat.embedding = Some(vector);
        }
    }

    /// True when every category carries an embedding vector.
    ///
    /// The embedding ranking path requires full coverage; a partially
    /// embedded taxonomy would score the gaps as unrelated.
    pub fn fully_embedded(&self) -> bool {
        !self.categories.is_empty() && self.categories.iter().all(|c| c.embedding.is_some())
    }

    /// How many categories currently carry an embedding.
    pub fn embedded_count(&self) -> usize {
        self.categories
            .iter()
            .filter(|c| c.embedding.is_some())
            .count()
    }
}

fn pick_label(name: &str, id: &str) -> String {
    if name.trim().is_empty() {
        id.trim().to_string()
    } else {
        name.trim().to_string()
    }
}

/// The text a category's embedding is computed from: every keyword term,
/// normalized, joined with single spaces, in declaration order.
fn canonical_keyword_text(keywords: &[Keyword]) -> String {
    keywords
        .iter()
        .map(|k| normalize(&k.term))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex-encoded SHA-256 of a category's canonical keyword text.
fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "large_category_id": "rainwear",
            "large_category_name_ja": "雨具",
            "medium_categories": [
                {
                    "medium_category_id": "umbrella",
                    "medium_category_name_ja": "傘",
                    "priority": 80,
                    "keywords": [
                        {"term": "傘", "weight": 1.0},
                        {"term": "折り畳み傘", "weight": 1.2}
                    ]
                }
            ]
        },
        {
            "large_category_id": "valuables",
            "large_category_name_ja": "貴重品",
            "medium_categories": [
                {
                    "medium_category_id": "wallet",
                    "medium_category_name_ja": "財布",
                    "priority": 90,
                    "keywords": [
                        {"term": "財布", "weight": 1.0},
                        {"term": "さいふ", "weight": 0.8}
                    ]
                },
                {
                    "medium_category_id": "keys",
                    "medium_category_name_ja": "鍵",
                    "priority": 70,
                    "keywords": [
                        {"term": "鍵", "weight": 1.0},
                        {"term": "キーケース", "weight": 1.0}
                    ]
                }
            ]
        }
    ]"#;

    #[test]
    fn test_load_sample() {
        let tax = Taxonomy::from_json(SAMPLE).unwrap();
        assert_eq!(tax.len(), 3);
        assert!(tax.find("雨具", "傘").is_some());
        assert!(tax.find("貴重品", "鍵").is_some());
        assert!(tax.find("雨具", "財布").is_none());
    }

    #[test]
    fn test_canonical_text_is_normalized() {
        let tax = Taxonomy::from_json(SAMPLE).unwrap();
        let keys = tax.find("貴重品", "鍵").unwrap();
        // キーケース loses its long-vowel marks under normalization.
        assert_eq!(keys.canonical_text, "鍵 キケス");
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let doc = r#"[
            {"large_category_name_ja": "A", "medium_categories": [
                {"medium_category_name_ja": "B", "keywords": []},
                {"medium_category_name_ja": "B", "keywords": []}
            ]}
        ]"#;
        let err = Taxonomy::from_json(doc).unwrap_err();
        assert!(matches!(err, EngineError::TaxonomyUnavailable(_)));
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(Taxonomy::from_json("[]").is_err());
        assert!(Taxonomy::from_json("not json").is_err());
    }

    #[test]
    fn test_hash_tracks_keyword_text() {
        let tax = Taxonomy::from_json(SAMPLE).unwrap();
        let umbrella = tax.find("雨具", "傘").unwrap();
        let wallet = tax.find("貴重品", "財布").unwrap();
        assert_ne!(umbrella.keyword_hash, wallet.keyword_hash);
        assert_eq!(umbrella.keyword_hash.len(), 64);
    }

    #[test]
    fn test_fully_embedded_tracking() {
        let mut tax = Taxonomy::from_json(SAMPLE).unwrap();
        assert!(!tax.fully_embedded());
        for i in 0..tax.len() {
            tax.attach_embedding(i, vec![0.1, 0.2]);
        }
        assert!(tax.fully_embedded());
        assert_eq!(tax.embedded_count(), 3);
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let doc = r#"[
            {"large_category_id": "others", "medium_categories": [
                {"medium_category_id": "items", "keywords": [{"term": "その他"}]}
            ]}
        ]"#;
        let tax = Taxonomy::from_json(doc).unwrap();
        assert!(tax.find("others", "items").is_some());
    }
}
