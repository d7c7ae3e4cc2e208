use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use liftrs::config::Settings;
use liftrs::data_access::MemoryStore;
use liftrs::decision::{self, WriteOutcome};
use liftrs::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use liftrs::recovery::ReadinessSummary;
use liftrs::{periodization, progression, validator};

#[derive(Parser)]
#[command(name = "liftrs")]
#[command(about = "Strength-training plan decision engine")]
#[command(version)]
struct Cli {
    /// Path to the JSON store file
    #[arg(long, global = true, default_value = "liftrs-store.json")]
    store: PathBuf,

    /// Path to a TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log format (pretty, json, compact)
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess recovery for a week and print the back-off recommendation
    Assess {
        /// Monday the evaluated week starts on (YYYY-MM-DD)
        #[arg(long)]
        week_start: NaiveDate,
    },

    /// Run the full weekly decision and apply any material adjustment
    Adjust {
        /// Monday the evaluated week starts on (YYYY-MM-DD)
        #[arg(long)]
        week_start: NaiveDate,
    },

    /// Build and save a new 4-week block
    BuildBlock {
        /// First day of the block (YYYY-MM-DD)
        #[arg(long)]
        start_date: NaiveDate,
    },

    /// Calibrate weight targets for one plan week from lift history
    Calibrate {
        #[arg(long)]
        plan_id: i64,

        #[arg(long)]
        week: u32,

        /// Reference date for the recovery window; defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Compute changes without writing them back
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-run structural validation against a saved plan
    Validate {
        #[arg(long)]
        plan_id: i64,
    },
}

fn load_store(path: &PathBuf) -> Result<MemoryStore> {
    if path.exists() {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read store file: {}", path.display()))?;
        MemoryStore::from_json(&json).map_err(|e| anyhow!(e.to_string()))
    } else {
        Ok(MemoryStore::new())
    }
}

fn save_store(store: &MemoryStore, path: &PathBuf) -> Result<()> {
    let json = store.to_json().map_err(|e| anyhow!(e.to_string()))?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write store file: {}", path.display()))?;
    Ok(())
}

fn print_readiness(readiness: &ReadinessSummary) {
    let state = match readiness.state {
        liftrs::recovery::ReadinessState::Ready => format!("{}", readiness.state).green(),
        liftrs::recovery::ReadinessState::Lagging => format!("{}", readiness.state).yellow(),
        _ => format!("{}", readiness.state).red(),
    };
    println!("{} [{}]", readiness.headline.bold(), state);
    println!("  {}", readiness.tip);
}

fn run(cli: Cli, settings: &Settings) -> Result<()> {
    match cli.command {
        Commands::Assess { week_start } => {
            let store = load_store(&cli.store)?;
            let recommendation =
                decision::assess_recovery_and_backoff(&store, week_start, settings)
                    .map_err(|e| anyhow!(e.user_message()))?;
            print_readiness(&ReadinessSummary::from_recommendation(&recommendation));
            println!("{}", serde_json::to_string_pretty(&recommendation)?);
        }

        Commands::Adjust { week_start } => {
            let store = load_store(&cli.store)?;
            let decision = decision::validate_and_adjust_plan(&store, week_start, settings)
                .map_err(|e| anyhow!(e.user_message()))?;
            print_readiness(&decision.readiness);
            println!("{}", decision.explanation);
            match &decision.write_outcome {
                WriteOutcome::Applied => {
                    println!(
                        "{} sets x{:.2}, RIR +{}",
                        "Applied:".green().bold(),
                        decision.set_multiplier,
                        decision.rir_increment
                    );
                    save_store(&store, &cli.store)?;
                }
                WriteOutcome::Skipped => {
                    println!("{}", "No adjustment needed".dimmed());
                }
                WriteOutcome::Failed { reason } => {
                    println!("{} {}", "Write failed:".red().bold(), reason);
                }
            }
        }

        Commands::BuildBlock { start_date } => {
            let store = load_store(&cli.store)?;
            let plan_id = periodization::build_block(&store, start_date, settings)
                .map_err(|e| anyhow!(e.user_message()))?;
            save_store(&store, &cli.store)?;
            println!(
                "{} plan {} starting {}",
                "Block saved:".green().bold(),
                plan_id,
                start_date
            );
        }

        Commands::Calibrate {
            plan_id,
            week,
            as_of,
            dry_run,
        } => {
            let store = load_store(&cli.store)?;
            let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
            let decision = progression::calibrate_plan_week(
                &store, plan_id, week, as_of, !dry_run, settings,
            )
            .map_err(|e| anyhow!(e.user_message()))?;

            for note in &decision.notes {
                println!("  {}", note);
            }
            if decision.progressions.is_empty() {
                println!("{}", "No weight changes".dimmed());
            } else if decision.persisted {
                println!(
                    "{} {} target(s) updated",
                    "Persisted:".green().bold(),
                    decision.progressions.len()
                );
                save_store(&store, &cli.store)?;
            } else if dry_run {
                println!(
                    "{} {} change(s) computed",
                    "Dry run:".yellow().bold(),
                    decision.progressions.len()
                );
            } else {
                println!("{}", "Changes computed but not persisted".red());
            }
        }

        Commands::Validate { plan_id } => {
            let store = load_store(&cli.store)?;
            let plan = store
                .saved_plan(plan_id)
                .ok_or_else(|| anyhow!("no saved plan with id {}", plan_id))?;
            match validator::validate_plan_structure(
                &plan,
                plan.start_date,
                settings.block.balance_tolerance,
            ) {
                Ok(()) => println!("{} plan {} is structurally valid", "OK:".green().bold(), plan_id),
                Err(err) => {
                    println!("{} {}", "Invalid:".red().bold(), err.user_message());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: LogLevel::from_str(&cli.log_level).map_err(|e| anyhow!(e))?,
        format: LogFormat::from_str(&cli.log_format).map_err(|e| anyhow!(e))?,
    };
    init_logging(&log_config)?;

    let settings = Settings::load_or_default(cli.config.as_deref())?;
    run(cli, &settings)
}
