use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single flattened cell value. Flattening guarantees no nested
/// objects or lists survive past this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Convert a JSON leaf into a typed scalar. Returns `None` for
    /// objects and arrays, which are not leaves.
    pub fn from_leaf(value: &Value) -> Option<Scalar> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Scalar::Int(i))
                } else {
                    n.as_f64().map(Scalar::Float)
                }
            }
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Render the value as text. Nulls stay null rather than becoming
    /// the string "null".
    pub fn render_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Text(s) => Some(s.clone()),
        }
    }
}

/// One fully expanded row: compound column name to scalar value.
pub type FlatRow = BTreeMap<String, Scalar>;

/// The output of one flattening pass: rows plus the column names in
/// the order they were first discovered. Discovery order is what the
/// reconciler uses when appending preserved extra columns.
#[derive(Debug, Clone, Default)]
pub struct FlatTable {
    pub columns: Vec<String>,
    pub rows: Vec<FlatRow>,
}

impl FlatTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Record a column name the first time it appears.
    pub fn note_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }
}

/// How lists encountered in a raw record are handled. Fixed per record
/// type and applied consistently across every unit of that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPolicy {
    /// Lists of objects become one output row per element, each row
    /// inheriting the parent-level scalar fields (record-per-event
    /// types, e.g. an events collection).
    ExplodeRows,
    /// Lists are serialized to a single opaque JSON-text field (single
    /// match records with auxiliary nested collections).
    #[default]
    SerializeOpaque,
}
