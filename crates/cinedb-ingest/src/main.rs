//! CineDB Ingest - dataset loader

use anyhow::{bail, Context, Result};
use cinedb_common::logging::{init_logging, LogConfig, LogLevel};
use cinedb_ingest::store::IntegrityReport;
use cinedb_ingest::{
    default_plan, CastSource, IngestConfig, MemoryStore, Orchestrator, PgStore, PgStoreConfig,
    RunReport, StageKind, Store,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cinedb-ingest")]
#[command(author, version, about = "Load the public movie datasets into the catalogue database")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion stages
    Run {
        /// Use the small local fixtures instead of the remote datasets
        #[arg(long)]
        sample: bool,

        /// Fixture directory for --sample
        #[arg(long, env = "CINEDB_FIXTURE_DIR")]
        fixture_dir: Option<PathBuf>,

        /// Load into an in-memory store instead of Postgres
        #[arg(long)]
        dry_run: bool,

        /// Stages to run, in order (default: movies, ratings, actors, cast)
        #[arg(long = "stage", value_name = "STAGE")]
        stages: Vec<StageKind>,

        /// Where cast membership comes from: principals or known-for
        #[arg(long)]
        cast_source: Option<CastSource>,

        /// Truncate every table before loading
        #[arg(long, conflicts_with = "dry_run")]
        reset: bool,

        /// Write the run report as JSON
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Check the database for dangling references
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("cinedb-ingest")
        .filter_directives("sqlx=warn,hyper=info,reqwest=info")
        .build()
        .with_env_overrides()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            sample,
            fixture_dir,
            dry_run,
            stages,
            cast_source,
            reset,
            report,
        } => {
            let mut config = IngestConfig::from_env()?;
            if sample && !config.is_sample() {
                config = IngestConfig {
                    filters: config.filters.clone(),
                    cast_source: config.cast_source,
                    ..IngestConfig::sample(config.fixture_dir.clone())
                };
            }
            if let Some(dir) = fixture_dir {
                config.fixture_dir = dir;
            }
            if let Some(source) = cast_source {
                config = config.with_cast_source(source);
            }

            let store: Arc<dyn Store> = if dry_run {
                info!("Dry run: loading into an in-memory store");
                Arc::new(MemoryStore::new())
            } else {
                let pg = PgStore::connect(&PgStoreConfig::from_env()?).await?;
                pg.migrate().await?;
                if reset {
                    pg.reset().await?;
                }
                Arc::new(pg)
            };

            let plan = if stages.is_empty() {
                default_plan(config.cast_source)
            } else {
                stages
            };

            let orchestrator = Orchestrator::new(store, config)?;
            match orchestrator.run(&plan).await {
                Ok(run) => {
                    print_summary(&run);
                    if let Some(path) = report {
                        write_report(&run, &path)?;
                    }
                    if run.has_failures() {
                        warn!(
                            rows_failed = run.rows_failed(),
                            "Run finished with rejected commits"
                        );
                    }
                },
                Err(aborted) => {
                    print_summary(&aborted.report);
                    if let Some(path) = report {
                        write_report(&aborted.report, &path)?;
                    }
                    return Err(aborted.into());
                },
            }
        },
        Command::Verify => {
            let pg = PgStore::connect(&PgStoreConfig::from_env()?).await?;
            let integrity = pg.integrity_report().await?;
            print_integrity(&integrity);
            if !integrity.is_clean() {
                bail!("{} dangling references found", integrity.dangling());
            }
            info!("No dangling references");
        },
    }

    Ok(())
}

fn print_summary(run: &RunReport) {
    println!("Run {} ({})", run.run_id, run.started_at.to_rfc3339());
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>9}",
        "stage", "read", "filtered", "unresolved", "duplicate", "committed", "failed", "secs"
    );
    for stage in &run.stages {
        println!(
            "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>9.2}",
            stage.stage.as_str(),
            stage.rows_read,
            stage.rows_filtered,
            stage.rows_unresolved,
            stage.rows_duplicate,
            stage.rows_committed,
            stage.rows_failed,
            stage.elapsed.as_secs_f64()
        );
        for sample in &stage.failure_samples {
            println!("    failed: {}", sample);
        }
    }
    println!("Total: {:.2}s", run.elapsed.as_secs_f64());
}

fn print_integrity(report: &IntegrityReport) {
    println!("played_in -> actors:    {}", report.played_in_missing_actor);
    println!("played_in -> movies:    {}", report.played_in_missing_movie);
    println!("movie_genre -> movies:  {}", report.movie_genre_missing_movie);
    println!("movie_genre -> genres:  {}", report.movie_genre_missing_genre);
    println!("movie_ratings -> movies: {}", report.ratings_missing_movie);
}

fn write_report(run: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(run).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    info!(path = %path.display(), "Run report written");
    Ok(())
}
