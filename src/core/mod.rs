//! Deterministic session core.
//!
//! This module contains:
//! - Rng: Seeded pseudo-random streams and the key scheme
//! - Sampler: Stratified selection and selection repair
//! - Blinding: Per-case model output permutation
//! - Plan: Evaluation plan loading and validation
//! - Engine: The three-phase session state machine
//! - Export: Read-only session snapshots

pub mod blinding;
pub mod engine;
pub mod export;
pub mod plan;
pub mod rng;
pub mod sampler;

// Re-export commonly used types
pub use blinding::{blind_order, display_letter, BlindView};
pub use engine::{AnswerInput, CaseView, NavOutcome, Position, SessionEngine};
pub use export::{snapshot, SessionSnapshot};
pub use plan::EvaluationPlan;
pub use rng::{seed_from_key, SeededRng};
pub use sampler::{repair_selection, stratified_select, RepairOutcome};
