//! `salesim`: set up the id sequences, run a D-1 batch, verify a day.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use salesim_infra::{DbConfig, PostgresSalesStore};
use salesim_simulator::calendar::d_minus_one;
use salesim_simulator::{BatchRequest, Simulator, SimulatorConfig};

#[derive(Debug, Parser)]
#[command(name = "salesim")]
#[command(about = "Synthesize D-1 sales activity against a Chinook-style database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the id sequences if needed and resync them with the tables.
    Setup,

    /// Run one batch of cancels, augments and creates for a day.
    Simulate {
        /// Invoices to create.
        #[arg(long, allow_negative_numbers = true)]
        creates: i64,

        /// Recent invoices to augment with one more track.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        updates: i64,

        /// Recent invoices to cancel.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        deletes: i64,

        /// Target day (defaults to yesterday).
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        /// RNG seed for a reproducible run (overrides SALESIM_SEED).
        #[arg(long)]
        seed: Option<u64>,

        /// Lookback for augment/cancel targets (overrides SALESIM_WINDOW_DAYS).
        #[arg(long)]
        window_days: Option<u32>,

        /// Print the batch result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check totals and track uniqueness for the invoices of a day.
    Verify {
        /// Day to check (defaults to yesterday).
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        /// Fail unless the day has exactly this many invoices.
        #[arg(long)]
        expect_creates: Option<usize>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    salesim_observability::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "salesim failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// A command with its input fully validated. Built before any storage access.
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    Setup,
    Simulate { request: BatchRequest, json: bool },
    Verify {
        date: NaiveDate,
        expect_creates: Option<usize>,
        json: bool,
    },
}

impl Plan {
    fn from_command(command: &Command, today: NaiveDate) -> Result<Self> {
        let yesterday = || d_minus_one(today);
        Ok(match *command {
            Command::Setup => Plan::Setup,
            Command::Simulate {
                creates,
                updates,
                deletes,
                date,
                json,
                ..
            } => {
                let target = date.unwrap_or_else(yesterday);
                let request = BatchRequest::new(target, creates, updates, deletes)
                    .context("invalid batch request")?;
                Plan::Simulate { request, json }
            }
            Command::Verify {
                date,
                expect_creates,
                json,
            } => Plan::Verify {
                date: date.unwrap_or_else(yesterday),
                expect_creates,
                json,
            },
        })
    }
}

/// Environment settings with the `simulate` flags applied on top.
fn simulator_config(command: &Command) -> Result<SimulatorConfig> {
    let mut config = SimulatorConfig::from_env().context("invalid simulator settings")?;
    if let Command::Simulate { seed, window_days, .. } = command {
        if seed.is_some() {
            config.seed = *seed;
        }
        if let Some(days) = window_days {
            config.window_days = *days;
        }
    }
    config.validate().context("invalid simulator settings")?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let plan = Plan::from_command(&cli.command, Local::now().date_naive())?;
    let config = simulator_config(&cli.command)?;

    let db = DbConfig::from_env().context("invalid database settings")?;
    let store = PostgresSalesStore::connect(&db)
        .await
        .context("failed to connect to the database")?;
    let mut sim = Simulator::from_config(store, config).context("invalid simulator settings")?;

    match plan {
        Plan::Setup => {
            let state = sim.setup().await.context("setup failed")?;
            println!(
                "sequences ready: next invoice id {}, next invoice line id {}",
                state.next_invoice_id, state.next_invoice_line_id
            );
            Ok(ExitCode::SUCCESS)
        }
        Plan::Simulate { request, json } => {
            sim.check_ready()
                .await
                .context("database is not ready; run `salesim setup` first")?;
            let target = request.target_date;
            let result = sim
                .run_batch(&request)
                .await
                .with_context(|| format!("batch for {target} failed"))?;

            if json {
                let out = serde_json::json!({ "result": result, "summary": result.summary() });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{target}: {}", result.summary());
            }
            Ok(ExitCode::SUCCESS)
        }
        Plan::Verify {
            date,
            expect_creates,
            json,
        } => {
            let report = sim.verify_day(date).await.context("verification failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{}: {} invoices ({} multi-line), revenue {}",
                    report.date, report.invoice_count, report.multi_line_invoices, report.revenue
                );
                for mismatch in &report.mismatched_totals {
                    println!(
                        "  invoice {}: stored total {} but lines sum to {}",
                        mismatch.invoice_id, mismatch.stored, mismatch.computed
                    );
                }
                for invoice in &report.duplicate_track_invoices {
                    println!("  invoice {invoice}: repeats a track");
                }
            }

            let count_ok = expect_creates.is_none_or(|n| report.matches_expected_creates(n));
            if !count_ok {
                eprintln!(
                    "expected {} invoices on {}, found {}",
                    expect_creates.unwrap_or_default(),
                    report.date,
                    report.invoice_count
                );
            }
            Ok(if report.is_consistent() && count_ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
