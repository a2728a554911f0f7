//! Session state: the per-rater aggregate persisted on every save.
//!
//! The serialized layout (`data_quality`, `model_evaluation.datasets`,
//! `cot_evaluation`, per-case `answers`) is the store's document shape.
//! Documents written by the first deployment predate the version tag;
//! [`upgrade`] lifts them to the current schema once, on load, without
//! dropping any recorded answer.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::answer::{score_keys, Answer};
use crate::domain::record::{SelectedCase, Stratum};

/// Current session document schema.
pub const SCHEMA_VERSION: u32 = 2;

/// The three evaluation phases, in progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DataQuality,
    ModelEvaluation,
    CotEvaluation,
}

impl Phase {
    /// All phases in progression order.
    pub fn all() -> [Phase; 3] {
        [Phase::DataQuality, Phase::ModelEvaluation, Phase::CotEvaluation]
    }

    /// Human-readable name.
    pub fn title(&self) -> &'static str {
        match self {
            Phase::DataQuality => "Data Quality",
            Phase::ModelEvaluation => "Model Evaluation",
            Phase::CotEvaluation => "CoT Evaluation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One phase's working set and progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Ordered case list; empty until the phase is first entered.
    #[serde(default)]
    pub cases: Vec<SelectedCase>,

    /// Recorded answers, keyed by case id.
    #[serde(default)]
    pub answers: BTreeMap<String, Answer>,

    /// Index of the active case.
    #[serde(default)]
    pub cursor: usize,

    /// Set once, and never cleared, when every case has an answer.
    #[serde(default)]
    pub complete: bool,
}

impl PhaseState {
    /// True once the case list has been populated.
    pub fn is_populated(&self) -> bool {
        !self.cases.is_empty()
    }

    /// The case under the cursor.
    pub fn current_case(&self) -> Option<&SelectedCase> {
        self.cases.get(self.cursor)
    }

    /// True when the given case has a recorded answer.
    pub fn is_answered(&self, case_id: &str) -> bool {
        self.answers.contains_key(case_id)
    }

    /// Number of cases with a recorded answer.
    pub fn answered_count(&self) -> usize {
        self.cases.iter().filter(|case| self.answers.contains_key(&case.id)).count()
    }

    /// True when every case has an answer (vacuously true when empty).
    pub fn all_answered(&self) -> bool {
        self.cases.iter().all(|case| self.answers.contains_key(&case.id))
    }

    /// Ids of cases still missing an answer, in presentation order.
    pub fn unanswered_ids(&self) -> Vec<String> {
        self.cases
            .iter()
            .filter(|case| !self.answers.contains_key(&case.id))
            .map(|case| case.id.clone())
            .collect()
    }

    /// Index of the first unanswered case.
    pub fn first_unanswered(&self) -> Option<usize> {
        self.cases.iter().position(|case| !self.answers.contains_key(&case.id))
    }

    /// Flip the completion flag if every populated case is now answered.
    /// The flag only ever goes from false to true.
    pub fn refresh_completion(&mut self) {
        if !self.complete && self.is_populated() && self.all_answered() {
            self.complete = true;
        }
    }

    /// Force the completion flag on (used when skipping an empty phase).
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Pull the cursor back into range after external list changes.
    pub fn clamp_cursor(&mut self) {
        if self.cases.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.cases.len() {
            self.cursor = self.cases.len() - 1;
        }
    }
}

/// The model-evaluation phase, partitioned per dataset.
///
/// The map only stores per-dataset state; iteration order comes from the
/// evaluation plan, not from this container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluationState {
    #[serde(default)]
    pub datasets: BTreeMap<String, PhaseState>,
}

/// Root aggregate for one rater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub schema_version: u32,
    pub user_id: String,

    #[serde(default)]
    pub data_quality: PhaseState,

    #[serde(default)]
    pub model_evaluation: ModelEvaluationState,

    #[serde(default)]
    pub cot_evaluation: PhaseState,

    /// Number of completed saves.
    #[serde(default)]
    pub save_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Fresh state for a first login.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            user_id: user_id.into(),
            data_quality: PhaseState::default(),
            model_evaluation: ModelEvaluationState::default(),
            cot_evaluation: PhaseState::default(),
            save_count: 0,
            last_saved_at: None,
        }
    }

    /// Per-dataset model-evaluation state, created on first touch.
    pub fn dataset_mut(&mut self, dataset: &str) -> &mut PhaseState {
        self.model_evaluation.datasets.entry(dataset.to_string()).or_default()
    }

    /// Per-dataset model-evaluation state, if it exists.
    pub fn dataset(&self, dataset: &str) -> Option<&PhaseState> {
        self.model_evaluation.datasets.get(dataset)
    }

    /// Stamp the audit counters for a save about to happen.
    pub fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.save_count += 1;
        self.last_saved_at = Some(at);
    }

    /// True when any model-evaluation dataset has a populated case list.
    pub fn model_eval_has_cases(&self) -> bool {
        self.model_evaluation.datasets.values().any(PhaseState::is_populated)
    }
}

/// Why a stored document could not be loaded.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("stored session uses schema v{found}, newest supported is v{supported}")]
    FromTheFuture { found: u32, supported: u32 },

    #[error("stored session document is malformed: {reason}")]
    Malformed { reason: String },
}

/// Lift a stored document to the current schema.
///
/// Untagged documents are treated as v1, the shape written by the first
/// deployment: per-phase answers with phase-specific fields (`hardness`
/// and `cot_quality` for data quality, a nested `model_scores` object for
/// model evaluation, `quality` for CoT), `current_index` cursors, string
/// or numeric scores, no audit counters. Documents tagged with a newer
/// schema than this build understands are refused, not guessed at.
pub fn upgrade(user_id: &str, doc: Value) -> Result<SessionState, SchemaError> {
    let version = doc
        .get("schema_version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1);

    if version > SCHEMA_VERSION {
        return Err(SchemaError::FromTheFuture {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    if let Some(stored) = doc.get("user_id").and_then(Value::as_str) {
        if stored != user_id {
            return Err(SchemaError::Malformed {
                reason: format!("document belongs to '{stored}', loaded for '{user_id}'"),
            });
        }
    }

    if version == SCHEMA_VERSION {
        let mut state: SessionState =
            serde_json::from_value(doc).map_err(|err| SchemaError::Malformed {
                reason: err.to_string(),
            })?;
        state.user_id = user_id.to_string();
        return Ok(state);
    }

    Ok(upgrade_v1(user_id, &doc))
}

#[derive(Clone, Copy)]
enum AnswerShape {
    DataQuality,
    ModelScores,
    CotQuality,
}

fn upgrade_v1(user_id: &str, doc: &Value) -> SessionState {
    let mut state = SessionState::new(user_id);

    if let Some(dq) = doc.get("data_quality") {
        state.data_quality = upgrade_v1_phase(dq, AnswerShape::DataQuality);
        backfill_strata(&mut state.data_quality, dq);
    }
    if let Some(datasets) = doc.pointer("/model_evaluation/datasets").and_then(Value::as_object) {
        for (name, phase) in datasets {
            state
                .model_evaluation
                .datasets
                .insert(name.clone(), upgrade_v1_phase(phase, AnswerShape::ModelScores));
        }
    }
    if let Some(cot) = doc.get("cot_evaluation") {
        state.cot_evaluation = upgrade_v1_phase(cot, AnswerShape::CotQuality);
    }

    state
}

fn upgrade_v1_phase(value: &Value, shape: AnswerShape) -> PhaseState {
    let mut phase = PhaseState::default();

    if let Some(cases) = value.get("cases").and_then(Value::as_array) {
        for entry in cases {
            if let Some(case) = upgrade_v1_case(entry) {
                phase.cases.push(case);
            }
        }
    }

    if let Some(answers) = value.get("answers").and_then(Value::as_object) {
        for (case_id, raw) in answers {
            if let Some(answer) = upgrade_v1_answer(raw, shape) {
                phase.answers.insert(case_id.clone(), answer);
            }
        }
    }

    phase.cursor = value
        .get("cursor")
        .or_else(|| value.get("current_index"))
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(0);
    phase.clamp_cursor();

    phase.complete = value.get("complete").and_then(Value::as_bool).unwrap_or(false);
    phase.refresh_completion();
    phase
}

fn upgrade_v1_case(entry: &Value) -> Option<SelectedCase> {
    match entry {
        Value::String(id) => Some(SelectedCase {
            id: id.clone(),
            stratum: None,
            dataset: None,
        }),
        Value::Object(fields) => {
            let id = ["id", "case_id", "accession"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))?;
            let stratum = ["stratum", "hardness", "system_hardness"]
                .iter()
                .find_map(|key| fields.get(*key))
                .and_then(as_stratum);
            let dataset = fields.get("dataset").and_then(Value::as_str).map(String::from);
            Some(SelectedCase {
                id: id.to_string(),
                stratum,
                dataset,
            })
        }
        _ => None,
    }
}

fn upgrade_v1_answer(raw: &Value, shape: AnswerShape) -> Option<Answer> {
    let mut scores = BTreeMap::new();
    match shape {
        AnswerShape::DataQuality => {
            if let Some(v) = raw.get("hardness").and_then(as_score) {
                scores.insert(score_keys::HARDNESS.to_string(), v);
            }
            if let Some(v) = raw.get("cot_quality").and_then(as_score) {
                scores.insert(score_keys::COT_QUALITY.to_string(), v);
            }
        }
        AnswerShape::ModelScores => {
            if let Some(by_model) = raw.get("model_scores").and_then(Value::as_object) {
                for (model, value) in by_model {
                    if let Some(v) = as_score(value) {
                        scores.insert(model.clone(), v);
                    }
                }
            }
        }
        AnswerShape::CotQuality => {
            if let Some(v) = raw.get("quality").and_then(as_score) {
                scores.insert(score_keys::QUALITY.to_string(), v);
            }
        }
    }

    let comment = raw
        .get("comment")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from);

    // An answer with nothing in it marks the case answered without any
    // recorded signal; dropping it lets the rater supply a real one.
    if scores.is_empty() && comment.is_none() {
        return None;
    }

    let saved_at = raw
        .get("saved_at")
        .or_else(|| raw.get("timestamp"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH);

    Some(Answer::at(scores, comment, saved_at))
}

/// v1 data-quality answers echoed the case's own difficulty label as
/// `system_hardness`; use it to fill strata the case list never stored.
fn backfill_strata(phase: &mut PhaseState, raw_phase: &Value) {
    let Some(answers) = raw_phase.get("answers").and_then(Value::as_object) else {
        return;
    };
    for case in &mut phase.cases {
        if case.stratum.is_some() {
            continue;
        }
        let label = answers
            .get(&case.id)
            .and_then(|a| a.get("system_hardness"))
            .and_then(as_stratum);
        if let Some(stratum) = label {
            case.stratum = Some(stratum);
        }
    }
}

/// Scores arrive as numbers or numeric strings; blank and zero mean
/// "not rated".
fn as_score(value: &Value) -> Option<u8> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u8>().ok(),
        _ => None,
    };
    parsed.filter(|v| *v != 0)
}

fn as_stratum(value: &Value) -> Option<Stratum> {
    Stratum::from_value(value)
}
