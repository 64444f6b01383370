//! Batch driver - enumerate input units, run each through the gate,
//! fallback controller, and writer, and aggregate outcomes.
//!
//! Units are independent, so they run on a bounded rayon pool; the
//! summary is built by collecting per-unit reports rather than
//! sharing mutable state. A unit's fatal failure never aborts the
//! run. The only error that halts a run early is a record type with
//! no registered schema, checked up front before any unit starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::flatten::ListPolicy;
use crate::pipeline::fallback::{reconcile_unit, ProcessingOutcome};
use crate::pipeline::{gate, reader, writer};
use crate::schema::SchemaRegistry;
use crate::{KilnError, Result};

/// Input file extensions the driver recognizes as units.
const UNIT_EXTENSIONS: [&str; 5] = ["json", "jsonl", "ndjson", "csv", "tsv"];

/// One record type within a data source: where its units live and
/// how its lists flatten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeSpec {
    pub name: String,
    pub input_dir: PathBuf,
    #[serde(default)]
    pub list_policy: ListPolicy,
}

/// One vendor feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSpec {
    pub name: String,
    pub record_types: Vec<RecordTypeSpec>,
}

/// Everything one run processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub sources: Vec<DataSourceSpec>,
}

impl RunManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw).map_err(|e| {
            KilnError::SourceUnreadable(format!("manifest {}: {e}", path.display()))
        })
    }
}

/// Capability handed to the driver for reporting per-unit outcomes;
/// concurrent units call it without further coordination.
pub trait OutcomeObserver: Send + Sync {
    fn unit_finished(&self, report: &UnitReport);
}

/// Default observer: log through `tracing` at a level matching the
/// outcome.
pub struct TracingObserver;

impl OutcomeObserver for TracingObserver {
    fn unit_finished(&self, report: &UnitReport) {
        match &report.outcome {
            ProcessingOutcome::Written => tracing::info!(
                source = %report.source,
                record_type = %report.record_type,
                unit = %report.unit,
                warnings = report.warnings,
                "unit written"
            ),
            ProcessingOutcome::SkippedUnchanged => tracing::debug!(
                source = %report.source,
                record_type = %report.record_type,
                unit = %report.unit,
                "unit unchanged, skipped"
            ),
            ProcessingOutcome::FailedRecoverable { reason } => tracing::warn!(
                source = %report.source,
                record_type = %report.record_type,
                unit = %report.unit,
                %reason,
                "unit written via permissive fallback"
            ),
            ProcessingOutcome::FailedFatal { reason } => tracing::error!(
                source = %report.source,
                record_type = %report.record_type,
                unit = %report.unit,
                %reason,
                "unit failed, nothing written"
            ),
        }
    }
}

/// What happened to one unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub source: String,
    pub record_type: String,
    pub unit: String,
    pub outcome: ProcessingOutcome,
    /// Count of per-value coercion warnings recorded for the unit.
    pub warnings: usize,
}

/// Outcome counters for one source x record type pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub written: usize,
    pub skipped_unchanged: usize,
    pub failed_recoverable: usize,
    pub failed_fatal: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Written => self.written += 1,
            ProcessingOutcome::SkippedUnchanged => self.skipped_unchanged += 1,
            ProcessingOutcome::FailedRecoverable { .. } => self.failed_recoverable += 1,
            ProcessingOutcome::FailedFatal { .. } => self.failed_fatal += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.skipped_unchanged + self.failed_recoverable + self.failed_fatal
    }
}

/// A failed unit surfaced in the run summary.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub source: String,
    pub record_type: String,
    pub unit: String,
    /// `true` when the permissive path still wrote the unit.
    pub recovered: bool,
    pub reason: String,
}

/// Aggregated result of one run: per source x record type counts
/// plus the identities and reasons of every failed unit.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub counts: BTreeMap<(String, String), OutcomeCounts>,
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    pub fn totals(&self) -> OutcomeCounts {
        let mut total = OutcomeCounts::default();
        for counts in self.counts.values() {
            total.written += counts.written;
            total.skipped_unchanged += counts.skipped_unchanged;
            total.failed_recoverable += counts.failed_recoverable;
            total.failed_fatal += counts.failed_fatal;
        }
        total
    }
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub output_dir: PathBuf,
    /// Worker threads for unit processing; 0 picks rayon's default
    /// (core count).
    pub workers: usize,
    /// Bypass the change-detection gate and reprocess everything.
    pub force: bool,
}

struct UnitTask {
    source: String,
    record_type: String,
    policy: ListPolicy,
    unit: String,
    input: PathBuf,
    output: PathBuf,
}

pub struct BatchDriver {
    registry: SchemaRegistry,
    options: DriverOptions,
    observer: Arc<dyn OutcomeObserver>,
}

impl BatchDriver {
    pub fn new(registry: SchemaRegistry, options: DriverOptions) -> Self {
        BatchDriver {
            registry,
            options,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn OutcomeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Process every unit of every record type in the manifest. The
    /// run succeeds even when individual units fail fatally; only
    /// invalid configuration (a missing schema, an unreadable input
    /// directory) errors out.
    pub fn run(&self, manifest: &RunManifest) -> Result<RunSummary> {
        // A record type without a schema invalidates the whole run;
        // fail before touching any unit.
        for source in &manifest.sources {
            for record_type in &source.record_types {
                self.registry.get(&record_type.name)?;
            }
        }

        let tasks = self.enumerate_units(manifest)?;
        tracing::info!(units = tasks.len(), "run starting");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .build()
            .map_err(|e| KilnError::WorkerPool(e.to_string()))?;

        let reports: Vec<UnitReport> =
            pool.install(|| tasks.par_iter().map(|t| self.process_unit(t)).collect());

        let mut summary = RunSummary::default();
        for report in reports {
            let key = (report.source.clone(), report.record_type.clone());
            summary.counts.entry(key).or_default().record(&report.outcome);
            match report.outcome {
                ProcessingOutcome::FailedRecoverable { reason } => {
                    summary.failures.push(UnitFailure {
                        source: report.source,
                        record_type: report.record_type,
                        unit: report.unit,
                        recovered: true,
                        reason,
                    });
                }
                ProcessingOutcome::FailedFatal { reason } => {
                    summary.failures.push(UnitFailure {
                        source: report.source,
                        record_type: report.record_type,
                        unit: report.unit,
                        recovered: false,
                        reason,
                    });
                }
                _ => {}
            }
        }

        Ok(summary)
    }

    /// Scan each record type's input directory for units, sorted by
    /// name so runs enumerate deterministically.
    fn enumerate_units(&self, manifest: &RunManifest) -> Result<Vec<UnitTask>> {
        let mut tasks = Vec::new();

        for source in &manifest.sources {
            for record_type in &source.record_types {
                let mut paths: Vec<PathBuf> = std::fs::read_dir(&record_type.input_dir)?
                    .collect::<std::io::Result<Vec<_>>>()?
                    .into_iter()
                    .map(|entry| entry.path())
                    .filter(|path| {
                        path.is_file()
                            && path
                                .extension()
                                .and_then(|e| e.to_str())
                                .is_some_and(|ext| UNIT_EXTENSIONS.contains(&ext))
                    })
                    .collect();
                paths.sort();

                for input in paths {
                    let unit = input
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let output = self
                        .options
                        .output_dir
                        .join(&source.name)
                        .join(&record_type.name)
                        .join(format!("{unit}.{}", writer::OUTPUT_EXTENSION));

                    tasks.push(UnitTask {
                        source: source.name.clone(),
                        record_type: record_type.name.clone(),
                        policy: record_type.list_policy,
                        unit,
                        input,
                        output,
                    });
                }
            }
        }

        Ok(tasks)
    }

    fn process_unit(&self, task: &UnitTask) -> UnitReport {
        let (outcome, warnings) = self.execute(task);
        let report = UnitReport {
            source: task.source.clone(),
            record_type: task.record_type.clone(),
            unit: task.unit.clone(),
            outcome,
            warnings,
        };
        self.observer.unit_finished(&report);
        report
    }

    /// Gate -> read -> fallback controller -> write for one unit.
    fn execute(&self, task: &UnitTask) -> (ProcessingOutcome, usize) {
        if !self.options.force {
            match gate::should_process(&task.input, &task.output) {
                Ok(true) => {}
                Ok(false) => return (ProcessingOutcome::SkippedUnchanged, 0),
                Err(e) => {
                    return (
                        ProcessingOutcome::FailedFatal {
                            reason: format!("freshness check: {e}"),
                        },
                        0,
                    )
                }
            }
        }

        let raw = match reader::read_unit(&task.input) {
            Ok(value) => value,
            Err(e) => {
                return (
                    ProcessingOutcome::FailedFatal {
                        reason: e.to_string(),
                    },
                    0,
                )
            }
        };

        // validated up front in run()
        let schema = match self.registry.get(&task.record_type) {
            Ok(schema) => schema,
            Err(e) => {
                return (
                    ProcessingOutcome::FailedFatal {
                        reason: e.to_string(),
                    },
                    0,
                )
            }
        };

        let unit = match reconcile_unit(&raw, schema, task.policy) {
            Ok(unit) => unit,
            Err(e) => {
                return (
                    ProcessingOutcome::FailedFatal {
                        reason: e.to_string(),
                    },
                    0,
                )
            }
        };

        for warning in &unit.warnings {
            tracing::warn!(
                unit = %task.unit,
                column = %warning.column,
                row = warning.row,
                "{}",
                warning.reason
            );
        }

        match writer::write_table(&unit.table, &task.output) {
            Ok(()) => match unit.structural_failure {
                None => (ProcessingOutcome::Written, unit.warnings.len()),
                Some(reason) => (
                    ProcessingOutcome::FailedRecoverable { reason },
                    unit.warnings.len(),
                ),
            },
            Err(e) => (
                ProcessingOutcome::FailedFatal {
                    reason: format!("write failed: {e}"),
                },
                unit.warnings.len(),
            ),
        }
    }
}
