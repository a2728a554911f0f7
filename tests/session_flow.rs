//! Session Flow Integration Tests
//!
//! Walk a whole session through the public surface: plan and datasets
//! from files, the engine across all three phases, and a save/resume
//! round trip through the store coordinator.

use std::sync::Arc;

use casebench::core::{AnswerInput, BlindView, EvaluationPlan, NavOutcome, SessionEngine};
use casebench::domain::{Phase, SessionState};
use casebench::ingest::{load_corpus, Corpus};
use casebench::store::{Coordinator, LocalCache, MemoryStore};
use serde_json::{json, Value};
use tempfile::TempDir;

const PLAN_YAML: &str = r#"
name: walk
datasets:
  - medqa
  - pubmedqa
data_quality_dataset: medqa
models:
  - huatuo
  - m1
quotas:
  1: 2
  2: 1
autosave_seconds: 0
"#;

fn medqa_row(id: &str, stratum: u8) -> Value {
    json!({
        "id": id,
        "hardness": stratum,
        "indication": format!("indication for {id}"),
        "findings": format!("findings for {id}"),
        "reference": format!("reference for {id}"),
        "cot": format!("reasoning for {id}"),
        "huatuo": format!("huatuo answer for {id}"),
        "m1": format!("m1 answer for {id}"),
    })
}

fn pubmedqa_row(id: &str, stratum: u8) -> Value {
    json!({
        "id": id,
        "hardness": stratum,
        "findings": format!("findings for {id}"),
        "huatuo": format!("huatuo answer for {id}"),
        "m1": format!("m1 answer for {id}"),
    })
}

/// medqa: strata 1,1,2,2 under quotas {1: 2, 2: 1} selects m-a, m-b, m-c.
/// pubmedqa: one case per stratum, stratum 1 under-filled.
fn write_fixture(dir: &TempDir) {
    std::fs::write(
        dir.path().join("medqa.json"),
        json!([
            medqa_row("m-a", 1),
            medqa_row("m-b", 1),
            medqa_row("m-c", 2),
            medqa_row("m-d", 2),
        ])
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("pubmedqa.json"),
        json!([pubmedqa_row("p-a", 1), pubmedqa_row("p-b", 2)]).to_string(),
    )
    .unwrap();
}

fn load_fixture(dir: &TempDir) -> (EvaluationPlan, Corpus) {
    let plan = EvaluationPlan::from_yaml(PLAN_YAML).unwrap();
    plan.validate().unwrap();
    let corpus = load_corpus(&plan, dir.path(), None).unwrap();
    (plan, corpus)
}

fn fresh_engine(dir: &TempDir, user: &str) -> SessionEngine {
    let (plan, corpus) = load_fixture(dir);
    SessionEngine::new(SessionState::new(user), corpus, plan)
}

/// Rate the current case with a fixed valid answer for its phase.
fn rate_current(engine: &mut SessionEngine) {
    let view = engine.case_view().expect("a case to rate");
    let input = match view.phase {
        Phase::DataQuality => AnswerInput::DataQuality {
            hardness: 2,
            cot_quality: 4,
            comment: None,
        },
        Phase::ModelEvaluation => AnswerInput::ModelScores {
            scores: view.outputs.iter().map(|(letter, _)| (*letter, 3)).collect(),
            comment: None,
        },
        Phase::CotEvaluation => AnswerInput::CotQuality {
            quality: 5,
            comment: None,
        },
    };
    engine.submit_answer(input).expect("valid rating");
}

#[test]
fn test_full_three_phase_walk() {
    let dir = TempDir::new().unwrap();
    write_fixture(&dir);
    let mut engine = fresh_engine(&dir, "alice");

    // Phase 1: data quality over the medqa selection.
    assert_eq!(engine.phase(), Phase::DataQuality);
    assert_eq!(engine.case_view().unwrap().total, 3);
    for _ in 0..2 {
        rate_current(&mut engine);
        assert_eq!(engine.advance(), NavOutcome::Moved);
    }
    rate_current(&mut engine);
    assert_eq!(
        engine.advance(),
        NavOutcome::EnteredDataset("medqa".to_string())
    );
    assert!(engine.state().data_quality.complete);

    // Phase 2, medqa: outputs are blinded and lettered.
    assert_eq!(engine.phase(), Phase::ModelEvaluation);
    assert_eq!(engine.current_dataset(), Some("medqa"));
    let view = engine.case_view().unwrap();
    assert_eq!(view.total, 3);
    let letters: Vec<char> = view.outputs.iter().map(|(l, _)| *l).collect();
    assert_eq!(letters, ['A', 'B']);

    // The output under each letter is the blinded model's text.
    let blind = BlindView::for_case("alice", "medqa", &view.case_id, &engine.plan().models);
    for (letter, text) in &view.outputs {
        let model = blind.model_for_letter(*letter).unwrap();
        assert_eq!(text, &format!("{model} answer for {}", view.case_id));
    }

    // Scores submitted by letter land under model labels.
    let first_case = view.case_id.clone();
    engine
        .submit_answer(AnswerInput::ModelScores {
            scores: [('A', 5), ('B', 2)].into_iter().collect(),
            comment: None,
        })
        .unwrap();
    let stored = &engine.state().model_evaluation.datasets["medqa"].answers[&first_case];
    let model_a = blind.model_for_letter('A').unwrap();
    let model_b = blind.model_for_letter('B').unwrap();
    assert_eq!(stored.score(model_a), Some(5));
    assert_eq!(stored.score(model_b), Some(2));
    let mut keys: Vec<&str> = stored.scores.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["huatuo", "m1"]);

    // And the rendered view translates them back to letters.
    let answered = engine.case_view().unwrap().answered.unwrap();
    assert_eq!(answered.scores["A"], 5);
    assert_eq!(answered.scores["B"], 2);

    assert_eq!(engine.advance(), NavOutcome::Moved);
    rate_current(&mut engine);
    assert_eq!(engine.advance(), NavOutcome::Moved);
    rate_current(&mut engine);
    assert_eq!(
        engine.advance(),
        NavOutcome::EnteredDataset("pubmedqa".to_string())
    );

    // Phase 2, pubmedqa: the under-filled stratum shrinks the list.
    assert_eq!(engine.case_view().unwrap().total, 2);
    rate_current(&mut engine);
    assert_eq!(engine.advance(), NavOutcome::Moved);
    rate_current(&mut engine);
    assert_eq!(
        engine.advance(),
        NavOutcome::EnteredPhase(Phase::CotEvaluation)
    );

    // Phase 3: only medqa cases carry reasoning traces.
    let medqa_order: Vec<String> = engine.state().model_evaluation.datasets["medqa"]
        .cases
        .iter()
        .map(|c| c.id.clone())
        .collect();
    let cot_order: Vec<String> = engine
        .state()
        .cot_evaluation
        .cases
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(cot_order, medqa_order);
    for case in &engine.state().cot_evaluation.cases {
        assert_eq!(case.dataset.as_deref(), Some("medqa"));
    }

    let view = engine.case_view().unwrap();
    assert_eq!(view.phase, Phase::CotEvaluation);
    assert!(view.cot.is_some());
    assert!(view.outputs.is_empty());

    for _ in 0..2 {
        rate_current(&mut engine);
        assert_eq!(engine.advance(), NavOutcome::Moved);
    }
    rate_current(&mut engine);
    assert_eq!(engine.advance(), NavOutcome::Finished);
    assert!(engine.is_finished());
}

#[tokio::test]
async fn test_save_and_resume_mid_session() {
    let dir = TempDir::new().unwrap();
    write_fixture(&dir);
    let cache_dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(
        Arc::new(MemoryStore::new()),
        LocalCache::new(cache_dir.path()),
    );

    // First login: finish data quality, rate one medqa case.
    let mut engine = fresh_engine(&dir, "alice");
    for _ in 0..3 {
        rate_current(&mut engine);
        engine.advance();
    }
    assert_eq!(engine.current_dataset(), Some("medqa"));
    rate_current(&mut engine);
    assert_eq!(engine.advance(), NavOutcome::Moved);

    let dq_order: Vec<String> = engine
        .state()
        .data_quality
        .cases
        .iter()
        .map(|c| c.id.clone())
        .collect();
    let medqa_order: Vec<String> = engine.state().model_evaluation.datasets["medqa"]
        .cases
        .iter()
        .map(|c| c.id.clone())
        .collect();
    let next_case = engine.case_view().unwrap().case_id;

    coordinator
        .save(engine.state_mut())
        .await
        .unwrap()
        .await
        .unwrap();

    // Second login: same position, same orders, answers intact.
    let (plan, corpus) = load_fixture(&dir);
    let state = coordinator.load("alice").await.unwrap();
    let mut resumed = SessionEngine::new(state, corpus, plan);

    assert_eq!(resumed.phase(), Phase::ModelEvaluation);
    assert_eq!(resumed.current_dataset(), Some("medqa"));
    assert_eq!(resumed.case_view().unwrap().case_id, next_case);
    assert!(resumed.take_repair_notices().is_empty());

    let resumed_dq: Vec<String> = resumed
        .state()
        .data_quality
        .cases
        .iter()
        .map(|c| c.id.clone())
        .collect();
    let resumed_medqa: Vec<String> = resumed.state().model_evaluation.datasets["medqa"]
        .cases
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(resumed_dq, dq_order);
    assert_eq!(resumed_medqa, medqa_order);
    assert!(resumed.state().data_quality.complete);
    assert_eq!(resumed.state().data_quality.answers.len(), 3);
    assert_eq!(
        resumed.state().model_evaluation.datasets["medqa"]
            .answers
            .len(),
        1
    );
}
