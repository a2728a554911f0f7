//! Phase session state machine.
//!
//! [`SessionEngine`] owns one rater's [`SessionState`] together with the
//! immutable corpus and plan, and applies every navigation and answer
//! operation to it. All operations are synchronous; persistence happens
//! outside, on the state the engine hands back.
//!
//! Case lists are populated lazily on first entry to a phase, presentation
//! order is fixed per user by the seeded streams, and previously persisted
//! model-evaluation selections are patched on entry when their records have
//! gone missing or incomplete.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, instrument, warn};

use crate::core::blinding::BlindView;
use crate::core::plan::EvaluationPlan;
use crate::core::rng::{keys, shuffle, SeededRng};
use crate::core::sampler::{
    qualifies_for_data_quality, qualifies_for_model_eval, repair_selection, stratified_select,
    RepairOutcome,
};
use crate::domain::answer::{
    check_score, score_keys, Answer, AnswerError, HARDNESS_RANGE, QUALITY_RANGE,
};
use crate::domain::record::{SelectedCase, Stratum};
use crate::domain::session::{Phase, PhaseState, SessionState};
use crate::ingest::Corpus;

/// Where the rater currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    DataQuality,
    /// Index into the plan's dataset order.
    ModelEvaluation(usize),
    CotEvaluation,
}

impl Position {
    /// The phase this position belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            Position::DataQuality => Phase::DataQuality,
            Position::ModelEvaluation(_) => Phase::ModelEvaluation,
            Position::CotEvaluation => Phase::CotEvaluation,
        }
    }
}

/// What a navigation request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// Cursor moved within the current case list.
    Moved,
    /// Crossed into a model-evaluation dataset.
    EnteredDataset(String),
    /// Crossed into another phase.
    EnteredPhase(Phase),
    /// Advancement requires answers for the listed cases first.
    Blocked { unanswered: Vec<String> },
    /// Already at the first case of the first phase.
    AtStart,
    /// Every phase is complete.
    Finished,
    /// The requested jump was rerouted, with the reason to show the rater.
    Redirected { to: Phase, reason: String },
}

/// A rater's submitted response, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerInput {
    DataQuality {
        hardness: u8,
        cot_quality: u8,
        comment: Option<String>,
    },
    /// Model scores keyed by display letter; the engine resolves letters
    /// to model labels through the case's blinding.
    ModelScores {
        scores: BTreeMap<char, u8>,
        comment: Option<String>,
    },
    CotQuality {
        quality: u8,
        comment: Option<String>,
    },
}

/// Scores of an existing answer, keyed the way the renderer may see them
/// (display letters for model evaluation, score names elsewhere).
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredView {
    pub scores: BTreeMap<String, u8>,
    pub comment: Option<String>,
}

/// Renderer-facing snapshot of the active case.
///
/// Model outputs appear only as lettered, blinded text; the assignment
/// behind the letters never leaves the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseView {
    pub phase: Phase,
    pub dataset: Option<String>,
    pub case_id: String,
    pub stratum: Option<Stratum>,
    /// Zero-based position within the phase's case list.
    pub index: usize,
    pub total: usize,
    pub indication: String,
    pub findings: String,
    pub reference: String,
    pub cot: Option<String>,
    pub outputs: Vec<(char, String)>,
    pub answered: Option<AnsweredView>,
}

/// Per-phase progress for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub phase: Phase,
    pub dataset: Option<String>,
    pub answered: usize,
    pub total: usize,
    pub complete: bool,
}

enum Step {
    Moved,
    Blocked(Vec<String>),
    Boundary,
}

/// The three-phase session state machine.
pub struct SessionEngine {
    state: SessionState,
    corpus: Corpus,
    plan: EvaluationPlan,
    position: Position,
    repair_notices: Vec<(String, RepairOutcome)>,
}

impl SessionEngine {
    /// Resume (or start) a session: pick the initial position per the
    /// completion flags, populate its case list, and skip past phases the
    /// corpus cannot fill.
    #[instrument(skip_all, fields(user = %state.user_id))]
    pub fn new(state: SessionState, corpus: Corpus, plan: EvaluationPlan) -> Self {
        let mut engine = Self {
            state,
            corpus,
            plan,
            position: Position::DataQuality,
            repair_notices: Vec::new(),
        };
        engine.position = engine.initial_position();
        engine.enter_initial();
        if engine.case_view().is_none() && !engine.is_finished() {
            // Current phase came up empty; cross it like any other
            // navigation would.
            engine.advance();
        }
        info!(position = ?engine.position, "session resumed");
        engine
    }

    /// The current position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.position.phase()
    }

    /// The active model-evaluation dataset, if any.
    pub fn current_dataset(&self) -> Option<&str> {
        match self.position {
            Position::ModelEvaluation(i) => self.plan.datasets.get(i).map(String::as_str),
            _ => None,
        }
    }

    /// The owned session state, for persistence.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mutable session state, for save stamping at the persistence seam.
    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// The plan this session runs under.
    pub fn plan(&self) -> &EvaluationPlan {
        &self.plan
    }

    /// True once the final phase is complete.
    pub fn is_finished(&self) -> bool {
        self.state.cot_evaluation.complete
    }

    /// Selection repairs performed since the last call, per dataset.
    pub fn take_repair_notices(&mut self) -> Vec<(String, RepairOutcome)> {
        std::mem::take(&mut self.repair_notices)
    }

    /// Advance to the next case, dataset, or phase.
    ///
    /// Moving off a case requires its answer; moving past the last case of
    /// a phase requires every answer, and marks the phase complete.
    #[instrument(skip(self), fields(user = %self.state.user_id, position = ?self.position))]
    pub fn advance(&mut self) -> NavOutcome {
        match self.position {
            Position::DataQuality => match Self::advance_within(&mut self.state.data_quality) {
                Step::Moved => NavOutcome::Moved,
                Step::Blocked(unanswered) => NavOutcome::Blocked { unanswered },
                Step::Boundary => {
                    self.state.data_quality.mark_complete();
                    self.enter_model_from(0)
                }
            },
            Position::ModelEvaluation(i) => {
                let name = self.plan.datasets[i].clone();
                match Self::advance_within(self.state.dataset_mut(&name)) {
                    Step::Moved => NavOutcome::Moved,
                    Step::Blocked(unanswered) => NavOutcome::Blocked { unanswered },
                    Step::Boundary => {
                        self.state.dataset_mut(&name).mark_complete();
                        self.enter_model_from(i + 1)
                    }
                }
            }
            Position::CotEvaluation => match Self::advance_within(&mut self.state.cot_evaluation) {
                Step::Moved => NavOutcome::Moved,
                Step::Blocked(unanswered) => NavOutcome::Blocked { unanswered },
                Step::Boundary => {
                    self.state.cot_evaluation.mark_complete();
                    info!("all phases complete");
                    NavOutcome::Finished
                }
            },
        }
    }

    /// Step back one case, crossing dataset and phase boundaries in
    /// reverse. Never gated on answers.
    #[instrument(skip(self), fields(user = %self.state.user_id, position = ?self.position))]
    pub fn retreat(&mut self) -> NavOutcome {
        match self.position {
            Position::DataQuality => {
                let phase = &mut self.state.data_quality;
                if phase.cursor > 0 && !phase.cases.is_empty() {
                    phase.cursor -= 1;
                    NavOutcome::Moved
                } else {
                    NavOutcome::AtStart
                }
            }
            Position::ModelEvaluation(i) => {
                let name = self.plan.datasets[i].clone();
                let phase = self.state.dataset_mut(&name);
                if phase.cursor > 0 && !phase.cases.is_empty() {
                    phase.cursor -= 1;
                    return NavOutcome::Moved;
                }
                self.retreat_before_model(i)
            }
            Position::CotEvaluation => {
                let phase = &mut self.state.cot_evaluation;
                if phase.cursor > 0 && !phase.cases.is_empty() {
                    phase.cursor -= 1;
                    return NavOutcome::Moved;
                }
                self.retreat_before_model(self.plan.datasets.len())
            }
        }
    }

    /// Rater-initiated navigation to a phase. Per-phase cursors are kept.
    ///
    /// CoT evaluation derives its cases from model evaluation, so jumping
    /// there before any model-evaluation case list exists reroutes to
    /// model evaluation instead.
    #[instrument(skip(self), fields(user = %self.state.user_id, target = %phase))]
    pub fn jump(&mut self, phase: Phase) -> NavOutcome {
        match phase {
            Phase::DataQuality => {
                self.ensure_data_quality();
                self.position = Position::DataQuality;
                NavOutcome::EnteredPhase(phase)
            }
            Phase::ModelEvaluation => self.jump_to_model_eval(),
            Phase::CotEvaluation => {
                if !self.state.model_eval_has_cases() {
                    self.jump_to_model_eval();
                    return NavOutcome::Redirected {
                        to: Phase::ModelEvaluation,
                        reason: "CoT cases come from the model evaluation selection, which has \
                                 not been loaded yet"
                            .to_string(),
                    };
                }
                self.ensure_cot();
                self.position = Position::CotEvaluation;
                NavOutcome::EnteredPhase(phase)
            }
        }
    }

    /// Validate and record an answer for the active case.
    ///
    /// The stored answer replaces any prior one for the case wholesale.
    /// Model scores arrive keyed by display letter and are stored under
    /// the model labels the letters stand for.
    #[instrument(skip(self, input), fields(user = %self.state.user_id, position = ?self.position))]
    pub fn submit_answer(&mut self, input: AnswerInput) -> Result<(), AnswerError> {
        match self.position {
            Position::DataQuality => {
                let AnswerInput::DataQuality {
                    hardness,
                    cot_quality,
                    comment,
                } = input
                else {
                    return Err(AnswerError::PhaseMismatch {
                        expected: Phase::DataQuality,
                    });
                };
                check_score(score_keys::HARDNESS, hardness, &HARDNESS_RANGE)?;
                check_score(score_keys::COT_QUALITY, cot_quality, &QUALITY_RANGE)?;

                let phase = &mut self.state.data_quality;
                let case_id = phase
                    .current_case()
                    .map(|c| c.id.clone())
                    .ok_or(AnswerError::NoActiveCase)?;
                let mut scores = BTreeMap::new();
                scores.insert(score_keys::HARDNESS.to_string(), hardness);
                scores.insert(score_keys::COT_QUALITY.to_string(), cot_quality);
                phase.answers.insert(case_id, Answer::new(scores, comment));
                phase.refresh_completion();
                Ok(())
            }
            Position::ModelEvaluation(i) => {
                let AnswerInput::ModelScores { scores, comment } = input else {
                    return Err(AnswerError::PhaseMismatch {
                        expected: Phase::ModelEvaluation,
                    });
                };
                let dataset = self.plan.datasets[i].clone();
                let case_id = self
                    .state
                    .dataset(&dataset)
                    .and_then(PhaseState::current_case)
                    .map(|c| c.id.clone())
                    .ok_or(AnswerError::NoActiveCase)?;

                let view =
                    BlindView::for_case(&self.state.user_id, &dataset, &case_id, &self.plan.models);
                for letter in view.letters() {
                    if !scores.contains_key(&letter) {
                        return Err(AnswerError::MissingScore {
                            key: letter.to_string(),
                        });
                    }
                }
                let mut translated = BTreeMap::new();
                for (letter, value) in &scores {
                    let model = view.model_for_letter(*letter).ok_or_else(|| {
                        AnswerError::UnknownKey {
                            key: letter.to_string(),
                        }
                    })?;
                    check_score(&letter.to_string(), *value, &QUALITY_RANGE)?;
                    translated.insert(model.to_string(), *value);
                }

                let phase = self.state.dataset_mut(&dataset);
                phase.answers.insert(case_id, Answer::new(translated, comment));
                phase.refresh_completion();
                Ok(())
            }
            Position::CotEvaluation => {
                let AnswerInput::CotQuality { quality, comment } = input else {
                    return Err(AnswerError::PhaseMismatch {
                        expected: Phase::CotEvaluation,
                    });
                };
                check_score(score_keys::QUALITY, quality, &QUALITY_RANGE)?;

                let phase = &mut self.state.cot_evaluation;
                let case_id = phase
                    .current_case()
                    .map(|c| c.id.clone())
                    .ok_or(AnswerError::NoActiveCase)?;
                let mut scores = BTreeMap::new();
                scores.insert(score_keys::QUALITY.to_string(), quality);
                phase.answers.insert(case_id, Answer::new(scores, comment));
                phase.refresh_completion();
                Ok(())
            }
        }
    }

    /// Snapshot of the active case for rendering, or `None` when the
    /// current phase has no cases.
    pub fn case_view(&self) -> Option<CaseView> {
        match self.position {
            Position::DataQuality => {
                let phase = &self.state.data_quality;
                let case = phase.current_case()?;
                let record = self.corpus.record(&self.plan.data_quality_dataset, &case.id);
                Some(CaseView {
                    phase: Phase::DataQuality,
                    dataset: None,
                    case_id: case.id.clone(),
                    stratum: case.stratum.or_else(|| record.and_then(|r| r.stratum)),
                    index: phase.cursor,
                    total: phase.cases.len(),
                    indication: record.map(|r| r.indication.clone()).unwrap_or_default(),
                    findings: record.map(|r| r.findings.clone()).unwrap_or_default(),
                    reference: record.map(|r| r.reference.clone()).unwrap_or_default(),
                    cot: record.and_then(|r| r.cot.clone()),
                    outputs: Vec::new(),
                    answered: phase.answers.get(&case.id).map(|a| AnsweredView {
                        scores: a.scores.clone(),
                        comment: a.comment.clone(),
                    }),
                })
            }
            Position::ModelEvaluation(i) => {
                let dataset = self.plan.datasets.get(i)?;
                let phase = self.state.dataset(dataset)?;
                let case = phase.current_case()?;
                let record = self.corpus.record(dataset, &case.id);
                let view =
                    BlindView::for_case(&self.state.user_id, dataset, &case.id, &self.plan.models);

                let outputs = record
                    .map(|r| {
                        view.presented(r)
                            .into_iter()
                            .map(|(letter, text)| (letter, text.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();

                let answered = phase.answers.get(&case.id).map(|a| {
                    let mut scores = BTreeMap::new();
                    for (model, value) in &a.scores {
                        if let Some(letter) = view.letter_for_model(model) {
                            scores.insert(letter.to_string(), *value);
                        }
                    }
                    AnsweredView {
                        scores,
                        comment: a.comment.clone(),
                    }
                });

                Some(CaseView {
                    phase: Phase::ModelEvaluation,
                    dataset: Some(dataset.clone()),
                    case_id: case.id.clone(),
                    stratum: case.stratum.or_else(|| record.and_then(|r| r.stratum)),
                    index: phase.cursor,
                    total: phase.cases.len(),
                    indication: record.map(|r| r.indication.clone()).unwrap_or_default(),
                    findings: record.map(|r| r.findings.clone()).unwrap_or_default(),
                    reference: record.map(|r| r.reference.clone()).unwrap_or_default(),
                    cot: None,
                    outputs,
                    answered,
                })
            }
            Position::CotEvaluation => {
                let phase = &self.state.cot_evaluation;
                let case = phase.current_case()?;
                let record = case
                    .dataset
                    .as_deref()
                    .and_then(|ds| self.corpus.record(ds, &case.id));
                Some(CaseView {
                    phase: Phase::CotEvaluation,
                    dataset: case.dataset.clone(),
                    case_id: case.id.clone(),
                    stratum: case.stratum.or_else(|| record.and_then(|r| r.stratum)),
                    index: phase.cursor,
                    total: phase.cases.len(),
                    indication: record.map(|r| r.indication.clone()).unwrap_or_default(),
                    findings: record.map(|r| r.findings.clone()).unwrap_or_default(),
                    reference: record.map(|r| r.reference.clone()).unwrap_or_default(),
                    cot: self.corpus.cot_for(&case.id).map(String::from),
                    outputs: Vec::new(),
                    answered: phase.answers.get(&case.id).map(|a| AnsweredView {
                        scores: a.scores.clone(),
                        comment: a.comment.clone(),
                    }),
                })
            }
        }
    }

    /// Progress for every phase and dataset, in progression order.
    pub fn progress(&self) -> Vec<ProgressLine> {
        let mut lines = Vec::new();
        let dq = &self.state.data_quality;
        lines.push(ProgressLine {
            phase: Phase::DataQuality,
            dataset: None,
            answered: dq.answered_count(),
            total: dq.cases.len(),
            complete: dq.complete,
        });
        for name in &self.plan.datasets {
            let (answered, total, complete) = self
                .state
                .dataset(name)
                .map(|p| (p.answered_count(), p.cases.len(), p.complete))
                .unwrap_or((0, 0, false));
            lines.push(ProgressLine {
                phase: Phase::ModelEvaluation,
                dataset: Some(name.clone()),
                answered,
                total,
                complete,
            });
        }
        let cot = &self.state.cot_evaluation;
        lines.push(ProgressLine {
            phase: Phase::CotEvaluation,
            dataset: None,
            answered: cot.answered_count(),
            total: cot.cases.len(),
            complete: cot.complete,
        });
        lines
    }

    fn initial_position(&self) -> Position {
        if !self.state.data_quality.complete {
            return Position::DataQuality;
        }
        for (i, name) in self.plan.datasets.iter().enumerate() {
            match self.state.dataset(name) {
                None => return Position::ModelEvaluation(i),
                Some(phase) if !phase.is_populated() => return Position::ModelEvaluation(i),
                Some(phase) if !phase.all_answered() => return Position::ModelEvaluation(i),
                Some(_) => {}
            }
        }
        Position::CotEvaluation
    }

    fn enter_initial(&mut self) {
        match self.position {
            Position::DataQuality => self.ensure_data_quality(),
            Position::ModelEvaluation(i) => self.ensure_model_dataset(i),
            Position::CotEvaluation => self.ensure_cot(),
        }
    }

    fn advance_within(phase: &mut PhaseState) -> Step {
        if phase.cases.is_empty() {
            return Step::Boundary;
        }
        if phase.cursor + 1 >= phase.cases.len() {
            // Leaving the phase needs every case answered, not just this one.
            if !phase.all_answered() {
                return Step::Blocked(phase.unanswered_ids());
            }
            phase.refresh_completion();
            return Step::Boundary;
        }
        let current_id = &phase.cases[phase.cursor].id;
        if !phase.is_answered(current_id) {
            return Step::Blocked(vec![current_id.clone()]);
        }
        phase.cursor += 1;
        Step::Moved
    }

    /// Enter the first non-empty model-evaluation dataset at or after
    /// `start`, falling through to CoT evaluation when none remains.
    fn enter_model_from(&mut self, start: usize) -> NavOutcome {
        for i in start..self.plan.datasets.len() {
            self.ensure_model_dataset(i);
            let name = self.plan.datasets[i].clone();
            let phase = self.state.dataset_mut(&name);
            if phase.cases.is_empty() {
                phase.mark_complete();
                continue;
            }
            phase.cursor = 0;
            self.position = Position::ModelEvaluation(i);
            return NavOutcome::EnteredDataset(name);
        }

        self.ensure_cot();
        let cot = &mut self.state.cot_evaluation;
        if cot.cases.is_empty() {
            cot.mark_complete();
            self.position = Position::CotEvaluation;
            info!("all phases complete");
            return NavOutcome::Finished;
        }
        cot.cursor = 0;
        self.position = Position::CotEvaluation;
        NavOutcome::EnteredPhase(Phase::CotEvaluation)
    }

    /// Land on the last case of the nearest non-empty dataset before
    /// `index`, else on data quality's last case.
    fn retreat_before_model(&mut self, index: usize) -> NavOutcome {
        for i in (0..index).rev() {
            self.ensure_model_dataset(i);
            let name = self.plan.datasets[i].clone();
            let phase = self.state.dataset_mut(&name);
            if !phase.cases.is_empty() {
                phase.cursor = phase.cases.len() - 1;
                self.position = Position::ModelEvaluation(i);
                return NavOutcome::EnteredDataset(name);
            }
        }

        self.ensure_data_quality();
        let dq = &mut self.state.data_quality;
        self.position = Position::DataQuality;
        if dq.cases.is_empty() {
            return NavOutcome::AtStart;
        }
        dq.cursor = dq.cases.len() - 1;
        NavOutcome::EnteredPhase(Phase::DataQuality)
    }

    fn jump_to_model_eval(&mut self) -> NavOutcome {
        let mut last_non_empty = None;
        for i in 0..self.plan.datasets.len() {
            self.ensure_model_dataset(i);
            let name = &self.plan.datasets[i];
            let Some(phase) = self.state.dataset(name) else { continue };
            if phase.cases.is_empty() {
                continue;
            }
            last_non_empty = Some(i);
            if !phase.all_answered() {
                self.position = Position::ModelEvaluation(i);
                return NavOutcome::EnteredDataset(name.clone());
            }
        }
        let i = last_non_empty.unwrap_or(0);
        self.position = Position::ModelEvaluation(i);
        match self.plan.datasets.get(i) {
            Some(name) => NavOutcome::EnteredDataset(name.clone()),
            None => NavOutcome::EnteredPhase(Phase::ModelEvaluation),
        }
    }

    fn ensure_data_quality(&mut self) {
        if self.state.data_quality.is_populated() {
            return;
        }
        let pool = self.corpus.records(&self.plan.data_quality_dataset);
        let mut cases = stratified_select(pool, &self.plan.quotas, qualifies_for_data_quality);
        let key = keys::data_quality_order(&self.state.user_id);
        shuffle(&mut cases, &mut SeededRng::from_key(&key));

        if cases.is_empty() {
            warn!(
                dataset = %self.plan.data_quality_dataset,
                "no qualifying cases for data quality"
            );
        } else {
            info!(count = cases.len(), "data-quality cases selected");
        }
        self.state.data_quality.cases = cases;
    }

    fn ensure_model_dataset(&mut self, index: usize) {
        let Some(name) = self.plan.datasets.get(index).cloned() else {
            return;
        };
        let user = self.state.user_id.clone();
        let pool = self.corpus.records(&name);
        let models = &self.plan.models;
        let phase = self.state.model_evaluation.datasets.entry(name.clone()).or_default();

        if !phase.is_populated() {
            let mut cases =
                stratified_select(pool, &self.plan.quotas, |r| qualifies_for_model_eval(r, models));
            let key = keys::model_eval_order(&user, &name);
            shuffle(&mut cases, &mut SeededRng::from_key(&key));

            if cases.is_empty() {
                warn!(dataset = %name, "no qualifying cases for model evaluation");
            } else {
                info!(dataset = %name, count = cases.len(), "model-evaluation cases selected");
            }
            phase.cases = cases;
            return;
        }

        let mut rng = SeededRng::from_key(&keys::repair_stream(&user, &name));
        let outcome = repair_selection(
            &mut phase.cases,
            &mut phase.answers,
            pool,
            |r| qualifies_for_model_eval(r, models),
            &mut rng,
        );
        if !outcome.is_clean() {
            info!(
                dataset = %name,
                replaced = outcome.replaced.len(),
                unrepaired = outcome.unrepaired.len(),
                "selection repaired"
            );
            phase.clamp_cursor();
            self.repair_notices.push((name, outcome));
        }
    }

    fn ensure_cot(&mut self) {
        if self.state.cot_evaluation.is_populated() {
            return;
        }
        let mut seen = HashSet::new();
        let mut derived: Vec<SelectedCase> = Vec::new();
        for name in &self.plan.datasets {
            let Some(phase) = self.state.dataset(name) else { continue };
            for case in &phase.cases {
                if !seen.insert(case.id.clone()) {
                    continue;
                }
                if self.corpus.cot_for(&case.id).is_some() {
                    derived.push(SelectedCase {
                        id: case.id.clone(),
                        stratum: case.stratum,
                        dataset: Some(name.clone()),
                    });
                }
            }
        }

        if derived.is_empty() {
            debug!("no model-evaluation case has a reasoning trace yet");
        } else {
            info!(count = derived.len(), "cot cases derived from model evaluation");
        }
        self.state.cot_evaluation.cases = derived;
    }
}
