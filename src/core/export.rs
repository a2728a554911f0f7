//! Read-only export of a session.
//!
//! A [`SessionSnapshot`] is a flattened, timestamped report of everything a
//! session holds: who rated, what was presented in which order, every
//! recorded answer, and how far each phase got. The CLI writes it out as
//! pretty JSON for downstream analysis; nothing ever reads it back in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::plan::EvaluationPlan;
use crate::domain::answer::Answer;
use crate::domain::record::Stratum;
use crate::domain::session::{Phase, PhaseState, SessionState};

/// Answered/total counters for one case list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub answered: usize,
    pub total: usize,
    pub complete: bool,
}

impl Completion {
    fn of(phase: &PhaseState) -> Self {
        Self {
            answered: phase.answered_count(),
            total: phase.cases.len(),
            complete: phase.complete,
        }
    }

    fn absent() -> Self {
        Self {
            answered: 0,
            total: 0,
            complete: false,
        }
    }
}

/// One presented case, with its stratum and origin where known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stratum: Option<Stratum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

/// One phase section; model evaluation contributes one per dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    /// Cases in presentation order.
    pub cases: Vec<CaseEntry>,
    pub answers: BTreeMap<String, Answer>,
    pub completion: Completion,
}

impl PhaseReport {
    fn of(phase: Phase, dataset: Option<String>, state: &PhaseState) -> Self {
        Self {
            phase,
            dataset,
            cases: state
                .cases
                .iter()
                .map(|case| CaseEntry {
                    id: case.id.clone(),
                    stratum: case.stratum,
                    dataset: case.dataset.clone(),
                })
                .collect(),
            answers: state.answers.clone(),
            completion: Completion::of(state),
        }
    }
}

/// The full export artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub snapshot_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub plan: String,
    pub user_id: String,
    pub schema_version: u32,
    pub save_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Sections in progression order: data quality, one per plan dataset,
    /// CoT evaluation.
    pub phases: Vec<PhaseReport>,
    pub overall: Completion,
}

/// Build the export report for a session.
pub fn snapshot(state: &SessionState, plan: &EvaluationPlan) -> SessionSnapshot {
    let mut phases = Vec::with_capacity(plan.datasets.len() + 2);
    phases.push(PhaseReport::of(Phase::DataQuality, None, &state.data_quality));
    for name in &plan.datasets {
        let report = match state.dataset(name) {
            Some(ds) => PhaseReport::of(Phase::ModelEvaluation, Some(name.clone()), ds),
            None => PhaseReport {
                phase: Phase::ModelEvaluation,
                dataset: Some(name.clone()),
                cases: Vec::new(),
                answers: BTreeMap::new(),
                completion: Completion::absent(),
            },
        };
        phases.push(report);
    }
    phases.push(PhaseReport::of(Phase::CotEvaluation, None, &state.cot_evaluation));

    let overall = Completion {
        answered: phases.iter().map(|p| p.completion.answered).sum(),
        total: phases.iter().map(|p| p.completion.total).sum(),
        complete: phases.iter().all(|p| p.completion.complete),
    };

    SessionSnapshot {
        snapshot_id: Uuid::new_v4(),
        exported_at: Utc::now(),
        plan: plan.name.clone(),
        user_id: state.user_id.clone(),
        schema_version: state.schema_version,
        save_count: state.save_count,
        last_saved_at: state.last_saved_at,
        phases,
        overall,
    }
}
