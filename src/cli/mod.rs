//! Command-line interface.
//!
//! `run` is the interactive rating session; the rest are one-shot
//! inspection and maintenance commands that talk to the same stores.

pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::config;
use crate::core::export::snapshot;
use crate::ingest;
use crate::store::{Coordinator, DocumentStore, LocalCache, SupabaseStore};

/// casebench - Blinded, deterministic rating sessions over model outputs.
#[derive(Parser, Debug)]
#[command(name = "casebench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start or resume an interactive rating session
    Run {
        /// Rater user id
        user: String,

        /// Evaluation plan file (defaults to the configured plan)
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Skip the remote store; answers stay in the local cache
        #[arg(long)]
        offline: bool,
    },

    /// Show a rater's progress without opening a session
    Status {
        /// Rater user id
        user: String,

        /// Evaluation plan file (defaults to the configured plan)
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },

    /// Write a rater's full session snapshot to a JSON file
    Export {
        /// Rater user id
        user: String,

        /// Output file (defaults to casebench-<user>-<timestamp>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Evaluation plan file (defaults to the configured plan)
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },

    /// Delete a rater's stored session from the remote store and cache
    Reset {
        /// Rater user id
        user: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List the dataset files in the data directory
    Datasets {
        /// Evaluation plan file, used to mark each dataset's role
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },

    /// Show the resolved configuration
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                user,
                plan,
                offline,
            } => run::run_session(clean_user(&user)?, plan.as_deref(), offline).await,
            Commands::Status { user, plan } => {
                show_status(clean_user(&user)?, plan.as_deref()).await
            }
            Commands::Export { user, output, plan } => {
                export_session(clean_user(&user)?, output, plan.as_deref()).await
            }
            Commands::Reset { user, yes } => reset_session(clean_user(&user)?, yes).await,
            Commands::Datasets { plan } => list_datasets(plan.as_deref()).await,
            Commands::Config => show_config().await,
        }
    }
}

fn clean_user(user: &str) -> Result<&str> {
    let user = user.trim();
    if user.is_empty() {
        anyhow::bail!("User id must not be empty");
    }
    Ok(user)
}

/// A coordinator backed by the configured remote store.
///
/// The one-shot commands refuse to run without one; reading the cache
/// alone could show state the remote has already moved past.
fn remote_coordinator() -> Result<Coordinator> {
    let cfg = config::config()?;
    let Some(remote) = cfg.usable_remote() else {
        anyhow::bail!(
            "No remote store configured. Set CASEBENCH_REMOTE_URL and CASEBENCH_ANON_KEY \
             or add remote settings to .casebench/config.yaml."
        );
    };
    Ok(Coordinator::new(
        Arc::new(SupabaseStore::from_config(remote.clone())),
        LocalCache::new(cfg.cache_dir()),
    ))
}

async fn show_status(user: &str, plan: Option<&Path>) -> Result<()> {
    let plan = run::load_plan(plan)?;
    let coordinator = remote_coordinator()?;

    let Some(state) = coordinator.peek(user).await? else {
        println!("No stored session for '{user}'.");
        return Ok(());
    };

    println!("Session for '{user}'  (saved {} times)", state.save_count);
    if let Some(at) = state.last_saved_at {
        println!("Last saved {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    println!();
    run::print_progress_table(&snapshot(&state, &plan));
    Ok(())
}

async fn export_session(user: &str, output: Option<PathBuf>, plan: Option<&Path>) -> Result<()> {
    let plan = run::load_plan(plan)?;
    let coordinator = remote_coordinator()?;

    let Some(state) = coordinator.peek(user).await? else {
        anyhow::bail!("No stored session for '{user}'; nothing to export");
    };

    let snap = snapshot(&state, &plan);
    let path = output.unwrap_or_else(|| default_export_path(user));
    let body =
        serde_json::to_string_pretty(&snap).context("Failed to serialize session snapshot")?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write export to {}", path.display()))?;

    println!(
        "Exported {} of {} answers for '{user}' to {}",
        snap.overall.answered,
        snap.overall.total,
        path.display()
    );
    Ok(())
}

fn default_export_path(user: &str) -> PathBuf {
    PathBuf::from(format!(
        "casebench-{user}-{}.json",
        Utc::now().format("%Y%m%d-%H%M%S")
    ))
}

async fn reset_session(user: &str, yes: bool) -> Result<()> {
    let coordinator = remote_coordinator()?;

    if !yes {
        print!(
            "This permanently deletes every rating stored for '{user}'. \
             Type the user id to confirm: "
        );
        use std::io::Write;
        std::io::stdout().flush().context("failed to flush stdout")?;
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("failed to read confirmation")?;
        if line.trim() != user {
            println!("Aborted; nothing was deleted.");
            return Ok(());
        }
    }

    coordinator.reset(user).await?;
    println!("Removed the stored session and local cache for '{user}'.");
    Ok(())
}

async fn list_datasets(plan: Option<&Path>) -> Result<()> {
    let cfg = config::config()?;
    let names = ingest::discover_datasets(&cfg.data_dir);
    if names.is_empty() {
        println!("No dataset files under {}", cfg.data_dir.display());
        return Ok(());
    }

    let plan = run::load_plan(plan).ok();

    println!("{:<28} {:<24}", "DATASET", "ROLE");
    println!("{}", "-".repeat(52));
    for name in &names {
        let role = match &plan {
            Some(plan) if plan.data_quality_dataset == *name => {
                if plan.datasets.contains(name) {
                    "data quality + model eval"
                } else {
                    "data quality"
                }
            }
            Some(plan) if plan.datasets.contains(name) => "model eval",
            Some(_) => "unused",
            None => "-",
        };
        println!("{:<28} {:<24}", name, role);
    }
    println!("{}", "-".repeat(52));
    println!(
        "{} dataset file(s) in {}",
        names.len(),
        cfg.data_dir.display()
    );
    Ok(())
}

async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Casebench configuration");
    println!("{}", "-".repeat(60));
    match &cfg.config_file {
        Some(path) => println!("{:<16} {}", "Config file:", path.display()),
        None => println!("{:<16} none (defaults and environment)", "Config file:"),
    }
    println!("{:<16} {}", "Home:", cfg.home.display());
    println!("{:<16} {}", "Cache:", cfg.cache_dir().display());
    println!(
        "{:<16} {}{}",
        "Data:",
        cfg.data_dir.display(),
        if cfg.data_dir.is_dir() { "" } else { " (missing)" }
    );
    println!(
        "{:<16} {}{}",
        "Plan:",
        cfg.plan_path.display(),
        if cfg.plan_path.is_file() { "" } else { " (missing)" }
    );
    match &cfg.cot_file {
        Some(path) => println!("{:<16} {}", "CoT file:", path.display()),
        None => println!("{:<16} -", "CoT file:"),
    }

    match cfg.usable_remote() {
        Some(remote) => {
            println!(
                "{:<16} {} (table '{}')",
                "Remote:", remote.url, remote.table
            );
            let store = SupabaseStore::from_config(remote.clone());
            match store.health_check().await {
                Ok(()) => println!("{:<16} reachable", "Remote check:"),
                Err(err) => println!("{:<16} unreachable ({err})", "Remote check:"),
            }
        }
        None => println!("{:<16} not configured (offline runs only)", "Remote:"),
    }
    println!("{}", "-".repeat(60));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_user() {
        assert_eq!(clean_user("  alice ").unwrap(), "alice");
        assert!(clean_user("   ").is_err());
    }

    #[test]
    fn test_default_export_path() {
        let path = default_export_path("alice");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("casebench-alice-"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::try_parse_from(["casebench", "run", "alice", "--offline"]).unwrap();
        let Commands::Run {
            user,
            plan,
            offline,
        } = cli.command
        else {
            panic!("expected the run command");
        };
        assert_eq!(user, "alice");
        assert_eq!(plan, None);
        assert!(offline);
    }

    #[test]
    fn test_cli_parses_export_with_output() {
        let cli =
            Cli::try_parse_from(["casebench", "export", "bob", "--output", "out.json"]).unwrap();
        let Commands::Export { user, output, .. } = cli.command else {
            panic!("expected the export command");
        };
        assert_eq!(user, "bob");
        assert_eq!(output, Some(PathBuf::from("out.json")));
    }
}
