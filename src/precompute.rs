//! Category vector precompute and cache.
//!
//! Embedding every category at startup would put a model download or a
//! network round-trip on the registration path, so vectors are computed
//! once (`fnd precompute`) and cached to a JSON file. Each entry records
//! the category labels, the SHA-256 hash of the keyword text the vector
//! was computed from, and the vector itself as a base64-encoded
//! little-endian f32 blob.
//!
//! On load, an entry is applied only when its hash still matches the
//! loaded taxonomy and the cache was built with the configured model.
//! Editing a category's keywords therefore invalidates exactly that
//! category's vector; switching models invalidates the whole cache.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;
use crate::embedding::{self, blob_to_vec, vec_to_blob, EmbeddingProvider};
use crate::taxonomy::Taxonomy;

/// One cached category vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub large_label: String,
    pub medium_label: String,
    /// Hash of the canonical keyword text the vector was computed from.
    pub keyword_hash: String,
    /// Base64 of the little-endian f32 blob.
    pub vector: String,
}

/// The on-disk cache document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorCache {
    pub model: String,
    pub dims: usize,
    pub entries: Vec<CacheEntry>,
}

impl VectorCache {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vector cache: {}", path.display()))?;
        let cache = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse vector cache: {}", path.display()))?;
        Ok(Some(cache))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write vector cache: {}", path.display()))
    }

    /// Find a valid cached vector for a category.
    fn lookup(&self, large: &str, medium: &str, hash: &str) -> Option<Vec<f32>> {
        self.entries
            .iter()
            .find(|e| e.large_label == large && e.medium_label == medium && e.keyword_hash == hash)
            .and_then(|e| BASE64.decode(&e.vector).ok())
            .map(|blob| blob_to_vec(&blob))
    }
}

/// Attach cached vectors to the taxonomy.
///
/// Entries whose keyword hash no longer matches, or from a cache built
/// with a different model, are skipped. Returns how many categories
/// received a vector.
pub fn apply_cache(taxonomy: &mut Taxonomy, cache: &VectorCache, model: &str) -> usize {
    if cache.model != model {
        return 0;
    }

    let lookups: Vec<Option<Vec<f32>>> = taxonomy
        .categories()
        .iter()
        .map(|cat| cache.lookup(&cat.large_label, &cat.medium_label, &cat.keyword_hash))
        .collect();

    let mut applied = 0;
    for (index, vector) in lookups.into_iter().enumerate() {
        if let Some(v) = vector {
            taxonomy.attach_embedding(index, v);
            applied += 1;
        }
    }
    applied
}

/// Load the cache file (if any) and attach whatever is still valid.
pub fn attach_cached_vectors(
    taxonomy: &mut Taxonomy,
    config: &Config,
    provider: &dyn EmbeddingProvider,
) -> Result<usize> {
    match VectorCache::load(&config.taxonomy.vector_cache)? {
        Some(cache) => Ok(apply_cache(taxonomy, &cache, provider.model_name())),
        None => Ok(0),
    }
}

/// Build (or refresh) the vector cache for the loaded taxonomy.
///
/// Entries whose keyword hash is unchanged are carried over from the
/// existing cache instead of re-embedded, unless `force` is set. A
/// failed embedding batch is warned about and skipped; the resulting
/// cache is simply incomplete and the matcher stays in keyword mode
/// until a successful run.
pub async fn run_precompute(config: &Config, force: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("embedding.provider is 'disabled'; configure [embedding] before precomputing");
    }

    let taxonomy = Taxonomy::load(&config.taxonomy.path)?;
    let provider = embedding::create_provider(&config.embedding)?;

    let existing = if force {
        None
    } else {
        VectorCache::load(&config.taxonomy.vector_cache)?
            .filter(|c| c.model == provider.model_name())
    };

    let mut entries: Vec<CacheEntry> = Vec::with_capacity(taxonomy.len());
    let mut pending: Vec<(usize, String)> = Vec::new();

    for (index, cat) in taxonomy.categories().iter().enumerate() {
        let cached = existing.as_ref().and_then(|c| {
            c.entries
                .iter()
                .find(|e| {
                    e.large_label == cat.large_label
                        && e.medium_label == cat.medium_label
                        && e.keyword_hash == cat.keyword_hash
                })
                .cloned()
        });
        match cached {
            Some(entry) => entries.push(entry),
            None => pending.push((index, cat.canonical_text.clone())),
        }
    }

    println!(
        "Precomputing {} category vectors ({} reused from cache)",
        pending.len(),
        entries.len()
    );

    let mut embedded = 0usize;
    for batch in pending.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        match provider.embed(&texts).await {
            Ok(vectors) => {
                for ((index, _), vector) in batch.iter().zip(vectors.iter()) {
                    let cat = &taxonomy.categories()[*index];
                    entries.push(CacheEntry {
                        large_label: cat.large_label.clone(),
                        medium_label: cat.medium_label.clone(),
                        keyword_hash: cat.keyword_hash.clone(),
                        vector: BASE64.encode(vec_to_blob(vector)),
                    });
                    embedded += 1;
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
            }
        }
    }

    let cache = VectorCache {
        model: provider.model_name().to_string(),
        dims: provider.dims(),
        entries,
    };
    cache.save(&config.taxonomy.vector_cache)?;

    println!(
        "Wrote {} ({} vectors, {} newly embedded)",
        config.taxonomy.vector_cache.display(),
        cache.entries.len(),
        embedded
    );

    if cache.entries.len() < taxonomy.len() {
        eprintln!(
            "Warning: {} of {} categories still lack vectors; matcher will stay in keyword mode",
            taxonomy.len() - cache.entries.len(),
            taxonomy.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAXONOMY: &str = r#"[
        {"large_category_name_ja": "雨具", "medium_categories": [
            {"medium_category_name_ja": "傘", "keywords": [{"term": "傘"}]}
        ]},
        {"large_category_name_ja": "貴重品", "medium_categories": [
            {"medium_category_name_ja": "財布", "keywords": [{"term": "財布"}]}
        ]}
    ]"#;

    fn entry_for(taxonomy: &Taxonomy, index: usize, vector: &[f32]) -> CacheEntry {
        let cat = &taxonomy.categories()[index];
        CacheEntry {
            large_label: cat.large_label.clone(),
            medium_label: cat.medium_label.clone(),
            keyword_hash: cat.keyword_hash.clone(),
            vector: BASE64.encode(vec_to_blob(vector)),
        }
    }

    #[test]
    fn test_apply_cache_attaches_matching_entries() {
        let mut tax = Taxonomy::from_json(TAXONOMY).unwrap();
        let cache = VectorCache {
            model: "test-model".to_string(),
            dims: 2,
            entries: vec![
                entry_for(&tax, 0, &[1.0, 0.0]),
                entry_for(&tax, 1, &[0.0, 1.0]),
            ],
        };
        let applied = apply_cache(&mut tax, &cache, "test-model");
        assert_eq!(applied, 2);
        assert!(tax.fully_embedded());
        assert_eq!(
            tax.categories()[0].embedding.as_deref().unwrap(),
            &[1.0, 0.0]
        );
    }

    #[test]
    fn test_apply_cache_rejects_foreign_model() {
        let mut tax = Taxonomy::from_json(TAXONOMY).unwrap();
        let cache = VectorCache {
            model: "other-model".to_string(),
            dims: 2,
            entries: vec![entry_for(&tax, 0, &[1.0, 0.0])],
        };
        assert_eq!(apply_cache(&mut tax, &cache, "test-model"), 0);
        assert!(!tax.fully_embedded());
    }

    #[test]
    fn test_apply_cache_skips_stale_hash() {
        let mut tax = Taxonomy::from_json(TAXONOMY).unwrap();
        let mut entry = entry_for(&tax, 0, &[1.0, 0.0]);
        entry.keyword_hash = "0".repeat(64);
        let cache = VectorCache {
            model: "test-model".to_string(),
            dims: 2,
            entries: vec![entry, entry_for(&tax, 1, &[0.0, 1.0])],
        };
        let applied = apply_cache(&mut tax, &cache, "test-model");
        assert_eq!(applied, 1);
        assert!(tax.categories()[0].embedding.is_none());
        assert!(tax.categories()[1].embedding.is_some());
    }

    #[test]
    fn test_cache_roundtrip() {
        let tax = Taxonomy::from_json(TAXONOMY).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vectors.json");
        let cache = VectorCache {
            model: "test-model".to_string(),
            dims: 3,
            entries: vec![entry_for(&tax, 0, &[0.25, -1.5, 3.0])],
        };
        cache.save(&path).unwrap();

        let loaded = VectorCache::load(&path).unwrap().unwrap();
        assert_eq!(loaded.model, "test-model");
        let vec = loaded
            .lookup("雨具", "傘", &tax.categories()[0].keyword_hash)
            .unwrap();
        assert_eq!(vec, vec![0.25, -1.5, 3.0]);
    }

    #[test]
    fn test_load_missing_cache_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(VectorCache::load(&path).unwrap().is_none());
    }
}
