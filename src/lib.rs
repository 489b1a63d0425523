//! # Foundkeep
//!
//! Classification and storage placement engine for lost-and-found item
//! registration.
//!
//! Foundkeep turns a free-text (optionally image-derived) description of
//! a found item into ranked category suggestions from a controlled
//! taxonomy, a deterministic `yy-mm-dd-h-nn` item identifier, and a
//! storage-slot assignment — then, after a dwell period, rewrites slots
//! to the long-term naming scheme in an idempotent batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐
//! │ Taxonomy  │──▶│ Matcher  │──▶│ suggested │
//! │ + vectors │   │ embed/kw │   │ categories│
//! └───────────┘   └──────────┘   └─────┬─────┘
//!                                      │ caller confirms
//!                                      ▼
//!                  ┌──────────┐   ┌──────────┐
//!                  │ IdGen    │──▶│ Slot     │──▶ Item record
//!                  │ (counter)│   │ rules    │    (external store)
//!                  └──────────┘   └──────────┘
//!                                      │ after 7-day dwell
//!                                      ▼
//!                                 ┌──────────┐
//!                                 │ Relocate │
//!                                 └──────────┘
//! ```
//!
//! Persistence, HTTP, authentication, and image recognition are external
//! collaborators; the `fnd` CLI drives the engine over JSON files.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Canonical text folding |
//! | [`taxonomy`] | Category graph store |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`matcher`] | Embedding/keyword category ranking |
//! | [`counter`] | Keyed atomic counter store |
//! | [`ident`] | Item identifier generation |
//! | [`slot`] | Priority-ordered storage slot rules |
//! | [`relocate`] | Dwell-period relocation batch |
//! | [`register`] | Registration orchestration |
//! | [`precompute`] | Category vector cache |

pub mod config;
pub mod counter;
pub mod embedding;
pub mod error;
pub mod ident;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod precompute;
pub mod register;
pub mod relocate;
pub mod slot;
pub mod taxonomy;
