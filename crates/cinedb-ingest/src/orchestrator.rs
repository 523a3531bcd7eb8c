//! Pipeline orchestrator
//!
//! Runs an explicit, validated list of stages strictly in order. Each stage
//! rebuilds its reference index from what the previous stages committed.
//! The first fatal error stops the run; rejected commits only show up in
//! the stage's counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{CastSource, IngestConfig};
use crate::error::{IngestError, IngestResult};
use crate::source::SourceReader;
use crate::stages::{run_stage, StageDescriptor, StageKind, StageReport};
use crate::store::Store;

/// Stage order used by a normal run
pub fn default_plan(cast_source: CastSource) -> Vec<StageKind> {
    let cast = match cast_source {
        CastSource::Principals => StageKind::Cast,
        CastSource::KnownFor => StageKind::KnownFor,
    };
    vec![StageKind::Movies, StageKind::Ratings, StageKind::Actors, cast]
}

/// Reject plans where a stage reads a table that a later stage writes, or
/// that list a stage twice
pub fn validate_plan(plan: &[StageKind]) -> IngestResult<Vec<StageDescriptor>> {
    if plan.is_empty() {
        return Err(IngestError::InvalidPlan("no stages to run".into()));
    }

    let descriptors: Vec<StageDescriptor> = plan.iter().map(|k| k.descriptor()).collect();

    for (i, stage) in descriptors.iter().enumerate() {
        if descriptors[..i].iter().any(|d| d.kind == stage.kind) {
            return Err(IngestError::InvalidPlan(format!("stage {} listed twice", stage.kind)));
        }
        for later in &descriptors[i + 1..] {
            if let Some(table) = stage.reads.iter().find(|t| later.writes.contains(t)) {
                return Err(IngestError::InvalidPlan(format!(
                    "{} reads {} but {} writes it later",
                    stage.kind, table, later.kind
                )));
            }
        }
    }

    Ok(descriptors)
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            stages: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == kind)
    }

    pub fn rows_committed(&self) -> u64 {
        self.stages.iter().map(|s| s.rows_committed).sum()
    }

    pub fn rows_failed(&self) -> u64 {
        self.stages.iter().map(|s| s.rows_failed).sum()
    }

    /// Whether any commit was rejected
    pub fn has_failures(&self) -> bool {
        self.stages.iter().any(|s| s.failed_commits > 0)
    }
}

/// A run stopped by a fatal error. `report` holds every stage that ran,
/// including the failed one.
#[derive(Debug, Error)]
#[error("run aborted: {error}")]
pub struct RunAborted {
    pub report: RunReport,
    pub stage: Option<StageKind>,
    #[source]
    pub error: IngestError,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    config: IngestConfig,
    source: SourceReader,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, config: IngestConfig) -> IngestResult<Self> {
        config.validate()?;
        let source = SourceReader::new(&config)?;
        Ok(Self {
            store,
            config,
            source,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run the default plan for the configured cast source
    pub async fn run_default(&self) -> Result<RunReport, RunAborted> {
        self.run(&default_plan(self.config.cast_source)).await
    }

    pub async fn run(&self, plan: &[StageKind]) -> Result<RunReport, RunAborted> {
        let mut report = RunReport::new();
        let started = Instant::now();

        if let Err(error) = validate_plan(plan) {
            return Err(RunAborted {
                report,
                stage: None,
                error,
            });
        }

        info!(
            run_id = %report.run_id,
            mode = ?self.config.mode,
            stages = ?plan,
            "Ingestion run started"
        );

        for &kind in plan {
            let mut stage = StageReport::new(kind);
            let result = run_stage(&self.store, &self.source, &self.config, &mut stage)
                .instrument(info_span!("stage", stage = %kind))
                .await;
            report.stages.push(stage);

            if let Err(error) = result {
                report.elapsed = started.elapsed();
                error!(
                    run_id = %report.run_id,
                    stage = %kind,
                    error = %error,
                    "Stage failed, aborting remaining stages"
                );
                return Err(RunAborted {
                    report,
                    stage: Some(kind),
                    error,
                });
            }
        }

        report.elapsed = started.elapsed();
        info!(
            run_id = %report.run_id,
            elapsed_secs = report.elapsed.as_secs_f64(),
            rows_committed = report.rows_committed(),
            rows_failed = report.rows_failed(),
            "Ingestion run complete"
        );

        Ok(report)
    }
}
