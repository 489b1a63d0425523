//! Category matcher: ranks taxonomy entries against a query.
//!
//! Two ranking strategies sit behind the [`RankStrategy`] trait:
//!
//! - **Embedding** (primary): embeds the normalized query text with the
//!   same provider that precomputed the category vectors, then scores
//!   every category by cosine similarity. The scan is O(number of
//!   categories), which is fine — the taxonomy is hundreds of entries,
//!   not millions. The embedding call is bounded by the configured
//!   timeout.
//! - **Keyword** (fallback): scores a category `1.0` when any of its
//!   normalized keywords occurs as a substring of the normalized query,
//!   else `0.0`. Ties between matches break by longest matched keyword,
//!   then keyword weight, then category priority, then declaration
//!   order.
//!
//! The matcher never blocks a registration on an unavailable model:
//! any failure or timeout on the embedding path degrades to the keyword
//! strategy. Only an unloaded taxonomy is a hard error.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::embedding::{self, cosine_similarity, EmbeddingProvider};
use crate::error::EngineError;
use crate::models::{ClassificationQuery, ClassificationResult, RankMode, Suggestion};
use crate::normalize::{normalize, normalize_compact};
use crate::taxonomy::Taxonomy;

/// A ranking strategy over the whole taxonomy.
///
/// `rank` returns every scored category in descending order; the caller
/// truncates to its top-N.
#[async_trait]
pub trait RankStrategy: Send + Sync {
    fn mode(&self) -> RankMode;

    async fn rank(
        &self,
        taxonomy: &Taxonomy,
        query_text: &str,
    ) -> Result<ClassificationResult, EngineError>;
}

/// Keyword containment ranking — the degraded-mode strategy.
pub struct KeywordStrategy;

impl KeywordStrategy {
    fn rank_sync(&self, taxonomy: &Taxonomy, query_text: &str) -> ClassificationResult {
        let query = normalize_compact(query_text);
        if query.is_empty() {
            return Vec::new();
        }

        struct Scored {
            index: usize,
            matched_len: usize,
            weight: f64,
            priority: i64,
        }

        let mut matches: Vec<Scored> = Vec::new();

        for (index, cat) in taxonomy.categories().iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for kw in &cat.keywords {
                let term = normalize_compact(&kw.term);
                if term.is_empty() || !query.contains(&term) {
                    continue;
                }
                let candidate = (term.chars().count(), kw.weight);
                if best
                    .map(|(len, w)| candidate.0 > len || (candidate.0 == len && candidate.1 > w))
                    .unwrap_or(true)
                {
                    best = Some(candidate);
                }
            }
            if let Some((matched_len, weight)) = best {
                matches.push(Scored {
                    index,
                    matched_len,
                    weight,
                    priority: cat.priority,
                });
            }
        }

        // All matches score 1.0; the ordering keys decide presentation.
        matches.sort_by(|a, b| {
            b.matched_len
                .cmp(&a.matched_len)
                .then(b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal))
                .then(b.priority.cmp(&a.priority))
                .then(a.index.cmp(&b.index))
        });

        matches
            .into_iter()
            .map(|m| {
                let cat = &taxonomy.categories()[m.index];
                Suggestion {
                    large_label: cat.large_label.clone(),
                    medium_label: cat.medium_label.clone(),
                    score: 1.0,
                }
            })
            .collect()
    }
}

#[async_trait]
impl RankStrategy for KeywordStrategy {
    fn mode(&self) -> RankMode {
        RankMode::Keyword
    }

    async fn rank(
        &self,
        taxonomy: &Taxonomy,
        query_text: &str,
    ) -> Result<ClassificationResult, EngineError> {
        Ok(self.rank_sync(taxonomy, query_text))
    }
}

/// Cosine-similarity ranking over precomputed category vectors.
pub struct EmbeddingStrategy {
    provider: Box<dyn EmbeddingProvider>,
    /// Hard bound on the query-side embed; on expiry the matcher falls
    /// back to keyword ranking.
    timeout: Duration,
}

impl EmbeddingStrategy {
    pub fn new(provider: Box<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Score every category against an already-computed query vector.
    ///
    /// Cosine similarity is clamped into `[0, 1]`: anti-correlated
    /// categories are simply unrelated for ranking purposes.
    pub fn rank_with_vector(taxonomy: &Taxonomy, query_vec: &[f32]) -> ClassificationResult {
        let mut scored: Vec<(usize, f64)> = taxonomy
            .categories()
            .iter()
            .enumerate()
            .map(|(index, cat)| {
                let sim = cat
                    .embedding
                    .as_deref()
                    .map(|v| cosine_similarity(query_vec, v))
                    .unwrap_or(0.0);
                (index, (sim as f64).clamp(0.0, 1.0))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .map(|(index, score)| {
                let cat = &taxonomy.categories()[index];
                Suggestion {
                    large_label: cat.large_label.clone(),
                    medium_label: cat.medium_label.clone(),
                    score,
                }
            })
            .collect()
    }
}

#[async_trait]
impl RankStrategy for EmbeddingStrategy {
    fn mode(&self) -> RankMode {
        RankMode::Embedding
    }

    async fn rank(
        &self,
        taxonomy: &Taxonomy,
        query_text: &str,
    ) -> Result<ClassificationResult, EngineError> {
        if !taxonomy.fully_embedded() {
            return Err(EngineError::EmbeddingUnavailable(
                "category vectors not precomputed".to_string(),
            ));
        }

        let normalized = normalize(query_text);
        let query_vec = tokio::time::timeout(self.timeout, self.provider.embed_one(&normalized))
            .await
            .map_err(|_| {
                EngineError::EmbeddingUnavailable(format!(
                    "query embedding timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| EngineError::EmbeddingUnavailable(e.to_string()))?;

        Ok(Self::rank_with_vector(taxonomy, &query_vec))
    }
}

/// The two-tier matcher: embedding primary, keyword fallback.
pub struct Matcher {
    primary: Option<EmbeddingStrategy>,
    fallback: KeywordStrategy,
}

impl Matcher {
    /// Build a matcher from the embedding configuration.
    ///
    /// When the provider is disabled (or cannot be constructed) the
    /// matcher runs keyword-only; suggestion never fails for a missing
    /// model.
    pub fn new(config: &EmbeddingConfig) -> Self {
        let primary = if config.is_enabled() {
            match embedding::create_provider(config) {
                Ok(provider) => Some(EmbeddingStrategy::new(
                    provider,
                    Duration::from_secs(config.timeout_secs),
                )),
                Err(e) => {
                    eprintln!(
                        "Warning: embedding provider unavailable, keyword matching only: {}",
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            primary,
            fallback: KeywordStrategy,
        }
    }

    /// Keyword-only matcher (tests, explicit degraded mode).
    pub fn keyword_only() -> Self {
        Self {
            primary: None,
            fallback: KeywordStrategy,
        }
    }

    /// Matcher around an already-constructed embedding strategy.
    ///
    /// Used when the caller needs the provider first (e.g. to attach
    /// cached category vectors under the provider's model name).
    pub fn with_embedding(strategy: EmbeddingStrategy) -> Self {
        Self {
            primary: Some(strategy),
            fallback: KeywordStrategy,
        }
    }

    /// Rank the taxonomy against a query and return the top `top_n`
    /// suggestions plus the strategy that produced them.
    ///
    /// Fails only when the taxonomy holds no categories.
    pub async fn suggest(
        &self,
        taxonomy: &Taxonomy,
        query: &ClassificationQuery,
        top_n: usize,
    ) -> Result<(ClassificationResult, RankMode), EngineError> {
        if taxonomy.is_empty() {
            return Err(EngineError::TaxonomyUnavailable(
                "no categories loaded".to_string(),
            ));
        }

        let text = query.combined_text();
        if normalize(&text).is_empty() {
            return Ok((Vec::new(), RankMode::Keyword));
        }

        if let Some(primary) = &self.primary {
            match primary.rank(taxonomy, &text).await {
                Ok(mut ranked) => {
                    ranked.truncate(top_n);
                    return Ok((ranked, RankMode::Embedding));
                }
                Err(EngineError::EmbeddingUnavailable(reason)) => {
                    eprintln!(
                        "Warning: embedding ranking degraded to keyword matching: {}",
                        reason
                    );
                }
                Err(other) => return Err(other),
            }
        }

        let mut ranked = self.fallback.rank(taxonomy, &text).await?;
        ranked.truncate(top_n);
        Ok((ranked, RankMode::Keyword))
    }
}
