//! Batch pipeline - reader, fallback controller, change gate,
//! columnar writer, and the driver that runs units through them.
//!
//! Data flows reader -> flatten -> canonicalize -> reconcile ->
//! write, gated up front by the freshness check and wrapped
//! end-to-end by the fallback controller.

pub mod driver;
pub mod fallback;
pub mod gate;
pub mod reader;
pub mod writer;

pub use driver::{
    BatchDriver, DataSourceSpec, DriverOptions, OutcomeCounts, OutcomeObserver, RecordTypeSpec,
    RunManifest, RunSummary, TracingObserver, UnitFailure, UnitReport,
};
pub use fallback::{reconcile_unit, FlattenPath, ProcessingOutcome, UnitResult};
pub use gate::should_process;
pub use reader::read_unit;
pub use writer::{read_table, write_table, OUTPUT_EXTENSION};
