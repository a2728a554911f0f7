//! casebench - Blinded rating sessions over clinical model outputs
//!
//! Human raters grade a stratified sample of cases in three phases:
//! data quality, blinded model evaluation, and reasoning-trace review.
//! Everything derived from a user id is deterministic, so a rater who
//! leaves and comes back sees the same cases in the same order with the
//! same blinding.
//!
//! # Modules
//!
//! - `core`: Sampling, blinding, the session engine, plans, exports
//! - `domain`: Data structures (records, answers, session state)
//! - `ingest`: Dataset and reasoning-trace file loading
//! - `store`: Remote document store, local cache, dual-write coordination
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Start or resume a rating session
//! casebench run alice
//!
//! # Check progress without opening a session
//! casebench status alice
//!
//! # Dump a full session snapshot
//! casebench export alice -o alice.json
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{
    blind_order, display_letter, snapshot, stratified_select, BlindView, EvaluationPlan,
    SeededRng, SessionEngine, SessionSnapshot,
};
pub use domain::{Answer, CandidateRecord, Phase, SelectedCase, SessionState, Stratum};
pub use ingest::Corpus;
pub use store::{Coordinator, DocumentStore, LocalCache, SupabaseStore};
