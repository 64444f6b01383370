//! Canonical schemas - the authoritative column/type contract for
//! each record type, supplied as static configuration and never
//! mutated at run time.

pub mod reconcile;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{KilnError, Result};

pub use reconcile::{reconcile, CoercionWarning, ReconciledTable};

/// Scalar type a schema column is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    /// ISO-8601 date/time kept as validated text (or an epoch integer).
    Timestamp,
    /// Serialized nested structure carried through untouched.
    Opaque,
}

/// One declared column: canonical name, type, and any vendor source
/// names (post-canonicalization) that map onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        ColumnSpec {
            name: name.into(),
            ty,
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// What happens to flattened columns the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraColumnPolicy {
    /// Undeclared columns are dropped (the default).
    #[default]
    Drop,
    /// Undeclared columns are appended after the schema columns, as
    /// text, in discovery order. Schema column positions never move.
    Preserve,
}

/// The column contract for one record type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub record_type: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub extra_columns: ExtraColumnPolicy,
}

impl CanonicalSchema {
    pub fn new(record_type: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        CanonicalSchema {
            record_type: record_type.into(),
            columns,
            extra_columns: ExtraColumnPolicy::default(),
        }
    }

    pub fn with_extra_columns(mut self, policy: ExtraColumnPolicy) -> Self {
        self.extra_columns = policy;
        self
    }
}

/// All schemas for a run, keyed by record type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, CanonicalSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    pub fn insert(&mut self, schema: CanonicalSchema) {
        self.schemas.insert(schema.record_type.clone(), schema);
    }

    /// Load a registry from a JSON file holding an array of schemas.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let schemas: Vec<CanonicalSchema> = serde_json::from_slice(&raw).map_err(|e| {
            KilnError::SourceUnreadable(format!("schema file {}: {e}", path.display()))
        })?;

        let mut registry = SchemaRegistry::new();
        for schema in schemas {
            registry.insert(schema);
        }
        Ok(registry)
    }

    /// Look up the schema for a record type. A miss is fatal to the
    /// whole run, not just one unit.
    pub fn get(&self, record_type: &str) -> Result<&CanonicalSchema> {
        self.schemas
            .get(record_type)
            .ok_or_else(|| KilnError::SchemaMissing(record_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
