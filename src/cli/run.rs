//! Interactive rating session.
//!
//! A line-oriented loop over stdin: render the active case, accept `rate`
//! / `next` / `back` / `goto` commands, save on every recorded answer and
//! on a timer, and finish with one full dual-write save. Ctrl-C degrades
//! to a best-effort local-only save.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::config;
use crate::core::engine::{AnswerInput, NavOutcome, SessionEngine};
use crate::core::export::{snapshot, SessionSnapshot};
use crate::core::plan::EvaluationPlan;
use crate::domain::session::Phase;
use crate::ingest;
use crate::store::{Coordinator, DocumentStore, LocalCache, MemoryStore, SupabaseStore};

/// Outcome of one input line.
enum Outcome {
    Continue,
    Quit,
}

/// Run an interactive session for a rater.
pub async fn run_session(user: &str, plan_path: Option<&Path>, offline: bool) -> Result<()> {
    let cfg = config::config()?;
    let plan = load_plan(plan_path)?;
    let corpus = ingest::load_corpus(&plan, &cfg.data_dir, cfg.cot_file.as_deref())
        .context("could not load the record files")?;

    let remote = build_remote(offline);
    let cache = LocalCache::new(cfg.cache_dir());
    let _lock = cache.lock_session(user)?;
    let coordinator = Arc::new(Coordinator::new(remote, cache));

    let state = coordinator.load(user).await?;
    let autosave_every = plan.autosave_interval();

    let mut engine = SessionEngine::new(state, corpus, plan);
    report_repairs(&mut engine);
    let engine = Arc::new(Mutex::new(engine));

    let autosave = autosave_every.map(|every| {
        let engine = Arc::clone(&engine);
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mut engine = engine.lock().await;
                if let Err(err) = coordinator.save(engine.state_mut()).await {
                    warn!(error = %err, "autosave failed");
                }
            }
        })
    });

    render(&*engine.lock().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&*engine.lock().await)?;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let mut engine = engine.lock().await;
                match handle_line(&mut engine, &coordinator, line.trim()).await? {
                    Outcome::Continue => {}
                    Outcome::Quit => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if let Some(handle) = &autosave {
                    handle.abort();
                }
                let mut engine = engine.lock().await;
                if let Err(err) = coordinator.save_local(engine.state_mut()).await {
                    warn!(error = %err, "exit save failed");
                }
                eprintln!("\nInterrupted; session cached locally.");
                return Ok(());
            }
        }
    }

    if let Some(handle) = &autosave {
        handle.abort();
    }

    let mut engine = engine.lock().await;
    let remote_write = coordinator.save(engine.state_mut()).await?;
    drop(engine);
    if remote_write.await.unwrap_or(false) {
        eprintln!("Session saved.");
    } else {
        eprintln!("Session cached locally; the remote store will catch up on the next save.");
    }
    Ok(())
}

/// Resolve the evaluation plan from an explicit path or the config.
pub fn load_plan(explicit: Option<&Path>) -> Result<EvaluationPlan> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config::plan_path()?,
    };
    if !path.exists() {
        anyhow::bail!(
            "Evaluation plan not found: {}. Pass --plan <file> or configure paths.plan",
            path.display()
        );
    }
    let plan = EvaluationPlan::from_file(&path)?;
    plan.validate()?;
    Ok(plan)
}

/// The remote document store: Supabase when configured, otherwise an
/// in-process store for a deliberate offline run.
pub fn build_remote(offline: bool) -> Arc<dyn DocumentStore> {
    if offline {
        eprintln!("Running offline: answers are cached locally but not synced.");
        return Arc::new(MemoryStore::new());
    }
    match config::config().ok().and_then(|cfg| cfg.usable_remote()) {
        Some(remote) => Arc::new(SupabaseStore::from_config(remote.clone())),
        None => {
            eprintln!(
                "No remote store configured (set CASEBENCH_REMOTE_URL and CASEBENCH_ANON_KEY); \
                 running offline."
            );
            Arc::new(MemoryStore::new())
        }
    }
}

fn report_repairs(engine: &mut SessionEngine) {
    for (dataset, outcome) in engine.take_repair_notices() {
        for (old, new) in &outcome.replaced {
            eprintln!("[{dataset}] case {old} became unusable and was replaced by {new}; its rating was discarded.");
        }
        for id in &outcome.unrepaired {
            eprintln!("[{dataset}] case {id} is unusable and no replacement was available.");
        }
    }
}

async fn handle_line(
    engine: &mut SessionEngine,
    coordinator: &Coordinator,
    line: &str,
) -> Result<Outcome> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "n" | "next" => {
            report_nav(engine.advance());
            render(engine);
        }
        "b" | "back" => {
            report_nav(engine.retreat());
            render(engine);
        }
        "goto" => match parse_phase(rest) {
            Some(phase) => {
                report_nav(engine.jump(phase));
                render(engine);
            }
            None => println!("Usage: goto dq|me|cot"),
        },
        "rate" => match parse_rate(engine.phase(), rest) {
            Ok(input) => match engine.submit_answer(input) {
                Ok(()) => {
                    // Fire-and-forget remote write; the handle is only for
                    // callers that need the receipt.
                    let _ = coordinator.save(engine.state_mut()).await?;
                    report_nav(engine.advance());
                    render(engine);
                }
                Err(err) => println!("Not recorded: {err}"),
            },
            Err(err) => println!("{err}"),
        },
        "status" => print_progress(engine),
        "save" => {
            let landed = coordinator
                .save(engine.state_mut())
                .await?
                .await
                .unwrap_or(false);
            if landed {
                println!("Saved.");
            } else {
                println!("Saved locally; remote write pending.");
            }
        }
        "show" => render(engine),
        "help" | "?" => print_help(engine.phase()),
        "q" | "quit" | "exit" => return Ok(Outcome::Quit),
        other => println!("Unknown command '{other}'; try 'help'."),
    }
    Ok(Outcome::Continue)
}

fn parse_phase(token: &str) -> Option<Phase> {
    match token.to_ascii_lowercase().as_str() {
        "dq" | "data" | "data-quality" => Some(Phase::DataQuality),
        "me" | "models" | "model-eval" => Some(Phase::ModelEvaluation),
        "cot" => Some(Phase::CotEvaluation),
        _ => None,
    }
}

/// Parse the arguments of a `rate` command for the given phase.
///
/// An optional free-text comment follows `--`. Scores are re-checked by
/// the engine; this only shapes the input.
fn parse_rate(phase: Phase, args: &str) -> Result<AnswerInput, String> {
    let (scores_part, comment) = match args.split_once("--") {
        Some((scores, comment)) => {
            let comment = comment.trim();
            (
                scores.trim(),
                (!comment.is_empty()).then(|| comment.to_string()),
            )
        }
        None => (args.trim(), None),
    };
    let tokens: Vec<&str> = scores_part.split_whitespace().collect();

    match phase {
        Phase::DataQuality => {
            let [hardness, cot_quality] = tokens[..] else {
                return Err("Usage: rate <hardness 1-4> <cot quality 1-5> [-- comment]".to_string());
            };
            Ok(AnswerInput::DataQuality {
                hardness: parse_score("hardness", hardness)?,
                cot_quality: parse_score("cot quality", cot_quality)?,
                comment,
            })
        }
        Phase::ModelEvaluation => {
            if tokens.is_empty() {
                return Err("Usage: rate A=<1-5> B=<1-5> ... [-- comment]".to_string());
            }
            let mut scores = BTreeMap::new();
            for token in tokens {
                let Some((letter, value)) = token.split_once('=') else {
                    return Err(format!("'{token}' is not a <letter>=<score> pair"));
                };
                let mut chars = letter.chars();
                let (Some(letter), None) = (chars.next(), chars.next()) else {
                    return Err(format!("'{letter}' is not a single output letter"));
                };
                let letter = letter.to_ascii_uppercase();
                if scores
                    .insert(letter, parse_score(&letter.to_string(), value)?)
                    .is_some()
                {
                    return Err(format!("output {letter} was scored twice"));
                }
            }
            Ok(AnswerInput::ModelScores { scores, comment })
        }
        Phase::CotEvaluation => {
            let [quality] = tokens[..] else {
                return Err("Usage: rate <quality 1-5> [-- comment]".to_string());
            };
            Ok(AnswerInput::CotQuality {
                quality: parse_score("quality", quality)?,
                comment,
            })
        }
    }
}

fn parse_score(label: &str, token: &str) -> Result<u8, String> {
    token
        .parse::<u8>()
        .map_err(|_| format!("'{token}' is not a valid {label} score"))
}

fn report_nav(outcome: NavOutcome) {
    match outcome {
        NavOutcome::Moved => {}
        NavOutcome::EnteredDataset(name) => println!("--> dataset: {name}"),
        NavOutcome::EnteredPhase(phase) => println!("--> phase: {phase}"),
        NavOutcome::Blocked { unanswered } => {
            if unanswered.len() == 1 {
                println!("Rate this case first ({}).", unanswered[0]);
            } else {
                println!(
                    "{} cases still need ratings: {}",
                    unanswered.len(),
                    unanswered.join(", ")
                );
            }
        }
        NavOutcome::AtStart => println!("Already at the first case."),
        NavOutcome::Finished => println!("All phases complete. Thank you!"),
        NavOutcome::Redirected { to, reason } => println!("--> {to} ({reason})"),
    }
}

fn render(engine: &SessionEngine) {
    let Some(view) = engine.case_view() else {
        println!("\nNo cases in the current phase.");
        return;
    };

    println!();
    println!("{}", "=".repeat(72));
    let location = match &view.dataset {
        Some(dataset) => format!("{} / {}", view.phase, dataset),
        None => view.phase.to_string(),
    };
    println!(
        "{location}  |  case {} of {}  |  id {}",
        view.index + 1,
        view.total,
        view.case_id
    );
    println!("{}", "=".repeat(72));

    print_section("Indication", &view.indication);
    print_section("Findings", &view.findings);
    print_section("Reference", &view.reference);
    if let Some(cot) = &view.cot {
        print_section("Reasoning", cot);
    }
    for (letter, text) in &view.outputs {
        print_section(&format!("Output {letter}"), text);
    }

    if let Some(answered) = &view.answered {
        let scores: Vec<String> = answered
            .scores
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        println!("\nYour saved rating: {}", scores.join(" "));
        if let Some(comment) = &answered.comment {
            println!("Your comment: {comment}");
        }
    }
}

fn print_section(title: &str, body: &str) {
    if body.is_empty() {
        return;
    }
    println!("\n{title}:");
    println!("{body}");
}

fn print_progress(engine: &SessionEngine) {
    print_progress_table(&snapshot(engine.state(), engine.plan()));
}

pub(crate) fn print_progress_table(snap: &SessionSnapshot) {
    println!(
        "{:<18} {:<14} {:>10} {:<10}",
        "PHASE", "DATASET", "ANSWERED", "STATE"
    );
    println!("{}", "-".repeat(56));
    for section in &snap.phases {
        let state = if section.completion.complete {
            "complete"
        } else {
            "open"
        };
        println!(
            "{:<18} {:<14} {:>10} {:<10}",
            section.phase.to_string(),
            section.dataset.as_deref().unwrap_or("-"),
            format!("{}/{}", section.completion.answered, section.completion.total),
            state
        );
    }
    println!("{}", "-".repeat(56));
    println!(
        "{:<18} {:<14} {:>10}",
        "overall",
        "",
        format!("{}/{}", snap.overall.answered, snap.overall.total)
    );
}

fn print_help(phase: Phase) {
    println!("Commands:");
    match phase {
        Phase::DataQuality => {
            println!("  rate <hardness 1-4> <cot quality 1-5> [-- comment]")
        }
        Phase::ModelEvaluation => println!("  rate A=<1-5> B=<1-5> ... [-- comment]"),
        Phase::CotEvaluation => println!("  rate <quality 1-5> [-- comment]"),
    }
    println!("  next / n       advance to the next case");
    println!("  back / b       go back one case");
    println!("  goto dq|me|cot move between phases");
    println!("  show           reprint the current case");
    println!("  status         progress overview");
    println!("  save           save now");
    println!("  quit / q       save and exit");
}

fn prompt(engine: &SessionEngine) -> Result<()> {
    let tag = match engine.current_dataset() {
        Some(dataset) => dataset.to_string(),
        None => engine.phase().to_string(),
    };
    print!("[{tag}] > ");
    std::io::stdout().flush().context("failed to flush stdout")?;
    Ok(())
}
