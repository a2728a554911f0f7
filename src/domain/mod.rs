//! Domain types for rater sessions.
//!
//! This module contains the core data structures:
//! - Record: normalized candidate cases and strata
//! - Answer: recorded ratings and their validation errors
//! - Session: per-rater phase state and the persisted document schema

pub mod answer;
pub mod record;
pub mod session;

// Re-export commonly used types
pub use answer::{Answer, AnswerError};
pub use record::{CandidateRecord, SelectedCase, Stratum};
pub use session::{Phase, PhaseState, SessionState, SCHEMA_VERSION};
