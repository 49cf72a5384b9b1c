//! Step Pipeline Runner.
//!
//! Runs named customization steps in order against a mounted image, timing
//! each one. The first failure stops the pipeline: later steps assume the
//! earlier ones took effect.

pub mod context;
pub mod report;
pub mod step;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};

pub use context::StepContext;
pub use report::{render_summary, RowStatus, SummaryRow};
pub use step::{Step, StepOutcome};

use crate::timing::{format_elapsed, Timer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

/// One attempted step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }

    pub fn summary_row(&self) -> SummaryRow {
        let status = if self.succeeded() {
            RowStatus::Success
        } else {
            RowStatus::Failed
        };
        SummaryRow::new(self.name.clone(), status, self.elapsed)
    }
}

/// Results of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub results: Vec<StepResult>,
    pub success: bool,
    pub interrupted: bool,
}

impl PipelineOutcome {
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.results.iter().find(|r| !r.succeeded())
    }

    /// First value any step reported under `key`.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.results
            .iter()
            .find_map(|r| r.metadata.get(key))
            .map(String::as_str)
    }

    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        self.results.iter().map(StepResult::summary_row).collect()
    }

    pub fn total_elapsed(&self) -> Duration {
        self.results.iter().map(|r| r.elapsed).sum()
    }
}

pub(crate) fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Fail-fast step runner.
pub struct Pipeline {
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// `cancel` is checked before each step; once set, no step starts.
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    pub fn run(&self, steps: &[Step], ctx: &StepContext<'_>) -> PipelineOutcome {
        let mut results = Vec::with_capacity(steps.len());
        let total = steps.len();

        for (i, step) in steps.iter().enumerate() {
            if self.cancelled() {
                tracing::warn!(step = step.name(), "interrupted, not starting remaining steps");
                break;
            }

            println!("\n[{}/{}] {}", i + 1, total, step.name());
            let result = run_step(step, ctx);
            let failed = !result.succeeded();
            results.push(result);
            if failed {
                break;
            }
        }

        let interrupted = self.cancelled();
        let success =
            !interrupted && results.len() == total && results.iter().all(StepResult::succeeded);
        PipelineOutcome {
            results,
            success,
            interrupted,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

fn run_step(step: &Step, ctx: &StepContext<'_>) -> StepResult {
    let timer = Timer::start();
    let outcome = step.run(ctx);
    let elapsed = timer.elapsed();

    let (status, metadata, error) = match outcome {
        Ok(StepOutcome::Success(metadata)) => (StepStatus::Succeeded, metadata, None),
        Ok(StepOutcome::Failure(reason)) => (StepStatus::Failed, BTreeMap::new(), Some(reason)),
        Err(e) => {
            tracing::error!(step = step.name(), "{e:?}");
            (StepStatus::Failed, BTreeMap::new(), Some(format!("{e:#}")))
        }
    };

    match &error {
        None => println!("✓ {} completed (took {})", step.name(), format_elapsed(elapsed)),
        Some(reason) => println!(
            "✗ {} failed after {}: {}",
            step.name(),
            format_elapsed(elapsed),
            reason
        ),
    }

    StepResult {
        name: step.name().to_string(),
        status,
        elapsed,
        metadata,
        error,
    }
}
