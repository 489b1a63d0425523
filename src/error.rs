//! Engine error kinds.
//!
//! One coarse-grained enum for failures that callers need to tell apart.
//! Only [`EngineError::TaxonomyUnavailable`] is fatal: without a loaded
//! taxonomy no categories can be suggested. Everything else either has a
//! degraded fallback (embedding failures fall back to keyword ranking)
//! or is carried as data instead of an error (clock skew, per-item
//! relocation failures).

use thiserror::Error;

/// Failures surfaced by the classification and placement engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The taxonomy could not be loaded or holds no categories.
    ///
    /// Fatal to startup; not recoverable without an operator fixing and
    /// reloading the taxonomy document.
    #[error("taxonomy unavailable: {0}")]
    TaxonomyUnavailable(String),

    /// The embedding provider is disabled, unreachable, or timed out.
    ///
    /// Recoverable: the matcher falls back to keyword ranking and the
    /// registration proceeds. Never surfaced to an end user as a hard
    /// failure.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A stored storage-location string does not match any known scheme.
    #[error("unparseable storage location: {0:?}")]
    BadStorageLocation(String),

    /// Counter state could not be read or persisted.
    #[error("counter store failure: {0}")]
    CounterStore(String),
}
