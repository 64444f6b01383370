//! Permissive, type-agnostic flattening — the fallback path.
//!
//! Every leaf becomes text and no structural consistency is required
//! across siblings, so a unit the strict flattener rejects still
//! produces a complete (if type-degraded) table. Compound keys are
//! joined with `_`; the canonicalizer makes that convention and the
//! strict `.` convention converge on identical column names.

use serde_json::{Map, Value};

use crate::flatten::types::{FlatRow, FlatTable, ListPolicy, Scalar};
use crate::Result;

const SEPARATOR: &str = "_";

/// Column used when a record has no keyed structure at all (a bare
/// scalar root or scalar elements of a root array).
const BARE_VALUE_COLUMN: &str = "value";

pub struct PermissiveFlattener {
    policy: ListPolicy,
}

impl PermissiveFlattener {
    pub fn new(policy: ListPolicy) -> Self {
        PermissiveFlattener { policy }
    }

    /// Flatten one raw record, treating every leaf as text. Never
    /// fails on shape: whatever structure is present is expanded and
    /// divergent siblings simply contribute divergent columns.
    pub fn flatten(&self, raw: &Value) -> Result<FlatTable> {
        let mut table = FlatTable::default();

        match raw {
            Value::Null => {}
            Value::Array(elems) => {
                for elem in elems {
                    if elem.is_null() {
                        continue;
                    }
                    self.flatten_record(elem, &mut table);
                }
            }
            other => self.flatten_record(other, &mut table),
        }

        Ok(table)
    }

    fn flatten_record(&self, value: &Value, table: &mut FlatTable) {
        let obj = match value {
            Value::Object(map) => map,
            leaf => {
                let mut row = FlatRow::new();
                table.note_column(BARE_VALUE_COLUMN);
                row.insert(BARE_VALUE_COLUMN.to_string(), textify(leaf));
                table.rows.push(row);
                return;
            }
        };

        let mut context = FlatRow::new();
        let mut exploded: Vec<(String, &Vec<Value>)> = Vec::new();
        self.walk_object(obj, "", &mut context, table, Some(&mut exploded));

        if exploded.is_empty() {
            if !context.is_empty() {
                table.rows.push(context);
            }
            return;
        }

        for (path, elems) in exploded {
            for elem in elems {
                let mut row = context.clone();
                match elem {
                    Value::Object(fields) => {
                        self.walk_object(fields, "", &mut row, table, None);
                    }
                    leaf => {
                        // scalar element in an object list: keep it
                        // under the list's own column
                        table.note_column(&path);
                        row.insert(path.clone(), textify(leaf));
                    }
                }
                table.rows.push(row);
            }
        }
    }

    fn walk_object<'a>(
        &self,
        obj: &'a Map<String, Value>,
        prefix: &str,
        row: &mut FlatRow,
        table: &mut FlatTable,
        mut exploded: Option<&mut Vec<(String, &'a Vec<Value>)>>,
    ) {
        for (key, value) in obj {
            let path = join(prefix, key);
            match value {
                Value::Object(inner) => {
                    self.walk_object(inner, &path, row, table, None);
                }
                Value::Array(elems) => {
                    if let Some(out) = exploded.as_deref_mut() {
                        if self.policy == ListPolicy::ExplodeRows
                            && (elems.is_empty() || elems.iter().any(Value::is_object))
                        {
                            out.push((path, elems));
                            continue;
                        }
                    }
                    if elems.is_empty() {
                        continue;
                    }
                    table.note_column(&path);
                    row.insert(path, textify(value));
                }
                leaf => {
                    table.note_column(&path);
                    row.insert(path, textify(leaf));
                }
            }
        }
    }
}

/// Render any leaf (or opaque container) as text. Nulls stay null so
/// the reconciler's null-fill semantics are preserved.
fn textify(value: &Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::String(s) => Scalar::Text(s.clone()),
        other => Scalar::Text(other.to_string()),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flatten(policy: ListPolicy, value: Value) -> FlatTable {
        PermissiveFlattener::new(policy).flatten(&value).unwrap()
    }

    #[test]
    fn every_leaf_becomes_text() {
        let table = flatten(
            ListPolicy::SerializeOpaque,
            json!({"match_id": 7, "neutral": true, "home_team": {"name": "A"}}),
        );

        let row = &table.rows[0];
        assert_eq!(row.get("match_id"), Some(&Scalar::Text("7".into())));
        assert_eq!(row.get("neutral"), Some(&Scalar::Text("true".into())));
        assert_eq!(row.get("home_team_name"), Some(&Scalar::Text("A".into())));
    }

    #[test]
    fn inconsistent_siblings_do_not_fail() {
        let table = flatten(
            ListPolicy::ExplodeRows,
            json!({
                "events": [
                    {"pass": {"length": 12.5}},
                    {"pass": "incomplete"}
                ]
            }),
        );

        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0].get("pass_length"),
            Some(&Scalar::Text("12.5".into()))
        );
        assert_eq!(
            table.rows[1].get("pass"),
            Some(&Scalar::Text("incomplete".into()))
        );
    }

    #[test]
    fn mixed_list_keeps_scalar_elements() {
        let table = flatten(
            ListPolicy::ExplodeRows,
            json!({"events": [{"type": "pass"}, 42]}),
        );

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].get("events"), Some(&Scalar::Text("42".into())));
    }

    #[test]
    fn nulls_stay_null() {
        let table = flatten(ListPolicy::SerializeOpaque, json!({"referee": null}));
        assert_eq!(table.rows[0].get("referee"), Some(&Scalar::Null));
    }

    #[test]
    fn bare_scalar_root_gets_value_column() {
        let table = flatten(ListPolicy::SerializeOpaque, json!("garbage"));
        assert_eq!(
            table.rows[0].get("value"),
            Some(&Scalar::Text("garbage".into()))
        );
    }
}
