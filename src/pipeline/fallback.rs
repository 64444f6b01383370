//! Fallback controller - supervise the strict and permissive
//! flattening paths for one unit.
//!
//! Every unit first runs the strict, type-aware path. A structural
//! parse failure switches to the permissive all-text path, which
//! sacrifices type fidelity for completeness; a unit recovered that
//! way is recorded distinctly so downstream consumers can audit it.
//! Only when both paths fail does the unit fail fatally, and a fatal
//! unit never aborts the batch.

use serde_json::Value;

use crate::flatten::{
    canonicalize_table, ListPolicy, PermissiveFlattener, StrictFlattener,
};
use crate::schema::reconcile::{reconcile, CoercionWarning, ReconciledTable};
use crate::schema::CanonicalSchema;
use crate::{KilnError, Result};

/// Terminal state of one input unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// Processed through the strict path and written with full type
    /// fidelity.
    Written,
    /// The output was already fresh; nothing was reprocessed.
    SkippedUnchanged,
    /// The permissive path recovered the unit; written with reduced
    /// type fidelity.
    FailedRecoverable { reason: String },
    /// Both paths failed; nothing was written.
    FailedFatal { reason: String },
}

impl ProcessingOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingOutcome::Written => "written",
            ProcessingOutcome::SkippedUnchanged => "skipped_unchanged",
            ProcessingOutcome::FailedRecoverable { .. } => "failed_recoverable",
            ProcessingOutcome::FailedFatal { .. } => "failed_fatal",
        }
    }
}

/// Which flattening path produced a unit's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenPath {
    Strict,
    Permissive,
}

/// The reconciled result of one unit, before it reaches the writer.
#[derive(Debug)]
pub struct UnitResult {
    pub table: ReconciledTable,
    pub warnings: Vec<CoercionWarning>,
    pub path: FlattenPath,
    /// The strict path's failure, when the permissive path was used.
    pub structural_failure: Option<String>,
}

/// Run one raw record through flatten -> canonicalize -> reconcile,
/// falling back to the permissive path on structural failure.
pub fn reconcile_unit(
    raw: &Value,
    schema: &CanonicalSchema,
    policy: ListPolicy,
) -> Result<UnitResult> {
    match StrictFlattener::new(policy).flatten(raw) {
        Ok(flat) => {
            let (table, warnings) = reconcile(canonicalize_table(flat), schema);
            Ok(UnitResult {
                table,
                warnings,
                path: FlattenPath::Strict,
                structural_failure: None,
            })
        }
        Err(err @ KilnError::StructuralParse { .. }) => {
            tracing::warn!(
                record_type = %schema.record_type,
                error = %err,
                "strict flatten failed, retrying with permissive path"
            );
            let flat = PermissiveFlattener::new(policy).flatten(raw)?;
            let (table, warnings) = reconcile(canonicalize_table(flat), schema);
            Ok(UnitResult {
                table,
                warnings,
                path: FlattenPath::Permissive,
                structural_failure: Some(err.to_string()),
            })
        }
        Err(other) => Err(other),
    }
}
