//! # Kiln - Football Feed Ingestion
//!
//! A batch engine that bakes heterogeneous football vendor feeds
//! (deeply nested event JSON, flat tracking exports, delimited mapping
//! tables) into uniform, schema-enforced, compressed columnar units.
//!
//! ## Modules
//!
//! - **flatten**: expand nested records into flat tables (strict and
//!   permissive paths plus the column-name canonicalizer)
//! - **schema**: canonical per-record-type schemas and reconciliation
//! - **pipeline**: reader, fallback controller, change gate, columnar
//!   writer, and the batch driver
//!
//! ## Quick Start
//!
//! ```rust
//! use kiln::flatten::ListPolicy;
//! use kiln::pipeline::reconcile_unit;
//! use kiln::schema::{CanonicalSchema, ColumnSpec, ColumnType};
//! use serde_json::json;
//!
//! # fn main() -> kiln::Result<()> {
//! let raw = json!({
//!     "match_id": 7,
//!     "home_team": {"name": "A"},
//!     "events": [
//!         {"type": "pass", "x": 1},
//!         {"type": "shot", "x": 2}
//!     ]
//! });
//!
//! let schema = CanonicalSchema::new("events", vec![
//!     ColumnSpec::new("match_id", ColumnType::Integer),
//!     ColumnSpec::new("event_type", ColumnType::Text).with_alias("type"),
//!     ColumnSpec::new("x", ColumnType::Float),
//!     ColumnSpec::new("home_team_name", ColumnType::Text),
//! ]);
//!
//! let unit = reconcile_unit(&raw, &schema, ListPolicy::ExplodeRows)?;
//! assert_eq!(unit.table.rows.len(), 2); // one row per event
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod flatten;
pub mod pipeline;
pub mod schema;

// Re-export commonly used types for convenience
pub use flatten::{FlatTable, ListPolicy, PermissiveFlattener, Scalar, StrictFlattener};
pub use pipeline::{
    reconcile_unit, BatchDriver, DriverOptions, ProcessingOutcome, RunManifest, RunSummary,
};
pub use schema::{CanonicalSchema, ColumnSpec, ColumnType, ReconciledTable, SchemaRegistry};

/// Error taxonomy for the ingestion engine.
#[derive(Debug, Error)]
pub enum KilnError {
    /// The raw input's nesting shape prevents a single column
    /// derivation. Recovered locally by the permissive fallback path.
    #[error("structural parse failure at '{path}': {detail}")]
    StructuralParse { path: String, detail: String },

    /// The raw input cannot be parsed as structured data by either
    /// path. Fatal for the unit only.
    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    /// No canonical schema registered for a record type. Fatal to the
    /// entire run.
    #[error("no canonical schema registered for record type '{0}'")]
    SchemaMissing(String),

    #[error("worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KilnError>;
