//! Strict, type-aware flattening — the primary path.
//!
//! Walks a raw record depth-first, joining nested keys with `.` and
//! keeping the JSON types of every leaf. Structural inconsistencies
//! between sibling elements (the same key appearing as an object in
//! one element and a scalar in another) abort the pass with
//! [`KilnError::StructuralParse`]; the fallback controller catches
//! that and retries with the permissive flattener.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::flatten::types::{FlatRow, FlatTable, ListPolicy, Scalar};
use crate::{KilnError, Result};

const SEPARATOR: &str = ".";

/// What a node looked like the first time a path was visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Object,
    List,
}

impl Shape {
    fn describe(self) -> &'static str {
        match self {
            Shape::Scalar => "a scalar",
            Shape::Object => "an object",
            Shape::List => "a list",
        }
    }
}

/// Tracks the shape observed at each compound path across sibling
/// elements so a single column derivation exists for the whole unit.
#[derive(Default)]
struct ShapeTracker {
    shapes: HashMap<String, Shape>,
}

impl ShapeTracker {
    fn note(&mut self, path: &str, shape: Shape) -> Result<()> {
        match self.shapes.get(path) {
            Some(prev) if *prev != shape => Err(KilnError::StructuralParse {
                path: path.to_string(),
                detail: format!(
                    "{} in one sibling, {} in another",
                    prev.describe(),
                    shape.describe()
                ),
            }),
            Some(_) => Ok(()),
            None => {
                self.shapes.insert(path.to_string(), shape);
                Ok(())
            }
        }
    }
}

pub struct StrictFlattener {
    policy: ListPolicy,
}

impl StrictFlattener {
    pub fn new(policy: ListPolicy) -> Self {
        StrictFlattener { policy }
    }

    /// Flatten one raw record into zero or more rows. Empty input
    /// (`null`, `{}`, `[]`) yields zero rows, not an error.
    pub fn flatten(&self, raw: &Value) -> Result<FlatTable> {
        let mut table = FlatTable::default();
        let mut shapes = ShapeTracker::default();

        match raw {
            Value::Null => {}
            Value::Array(elems) => {
                for elem in elems {
                    if elem.is_null() {
                        continue;
                    }
                    self.flatten_record(elem, &mut shapes, &mut table)?;
                }
            }
            Value::Object(_) => {
                self.flatten_record(raw, &mut shapes, &mut table)?;
            }
            _ => {
                return Err(KilnError::StructuralParse {
                    path: String::new(),
                    detail: "root value is a bare scalar".to_string(),
                })
            }
        }

        Ok(table)
    }

    /// Flatten one logical record (a root object, or one element of a
    /// root array) and append its rows to `table`.
    fn flatten_record(
        &self,
        value: &Value,
        shapes: &mut ShapeTracker,
        table: &mut FlatTable,
    ) -> Result<()> {
        let Value::Object(obj) = value else {
            return Err(KilnError::StructuralParse {
                path: String::new(),
                detail: format!("record is {}, not an object", kind_name(value)),
            });
        };

        let mut context = FlatRow::new();
        let mut exploded: Vec<(String, &Vec<Value>)> = Vec::new();
        self.walk_object(obj, "", shapes, &mut context, table, Some(&mut exploded))?;

        if exploded.is_empty() {
            if !context.is_empty() {
                table.rows.push(context);
            }
            return Ok(());
        }

        // One row per element, denormalized with the parent scalars.
        // Element fields land unprefixed: the element is the record.
        for (path, elems) in exploded {
            for elem in elems {
                let Value::Object(fields) = elem else {
                    return Err(KilnError::StructuralParse {
                        path: path.clone(),
                        detail: "exploded list mixes objects and scalars".to_string(),
                    });
                };
                let mut row = context.clone();
                self.walk_object(fields, "", shapes, &mut row, table, None)?;
                table.rows.push(row);
            }
        }

        Ok(())
    }

    /// Walk one object level. `exploded` is `Some` only at the top
    /// level of a record; deeper lists always serialize opaque so a
    /// nested collection never multiplies rows.
    fn walk_object<'a>(
        &self,
        obj: &'a Map<String, Value>,
        prefix: &str,
        shapes: &mut ShapeTracker,
        row: &mut FlatRow,
        table: &mut FlatTable,
        mut exploded: Option<&mut Vec<(String, &'a Vec<Value>)>>,
    ) -> Result<()> {
        for (key, value) in obj {
            let path = join(prefix, key);
            match value {
                Value::Null => {
                    table.note_column(&path);
                    row.insert(path, Scalar::Null);
                }
                Value::Object(inner) => {
                    shapes.note(&path, Shape::Object)?;
                    self.walk_object(inner, &path, shapes, row, table, None)?;
                }
                Value::Array(elems) => {
                    shapes.note(&path, Shape::List)?;
                    if let Some(out) = exploded.as_deref_mut() {
                        if self.policy == ListPolicy::ExplodeRows && explodable(elems) {
                            out.push((path, elems));
                            continue;
                        }
                    }
                    if elems.is_empty() {
                        continue;
                    }
                    let opaque = serde_json::to_string(value).map_err(|e| {
                        KilnError::StructuralParse {
                            path: path.clone(),
                            detail: format!("unserializable list: {e}"),
                        }
                    })?;
                    table.note_column(&path);
                    row.insert(path, Scalar::Text(opaque));
                }
                leaf => {
                    shapes.note(&path, Shape::Scalar)?;
                    let scalar = Scalar::from_leaf(leaf).ok_or_else(|| {
                        KilnError::StructuralParse {
                            path: path.clone(),
                            detail: "leaf value has no scalar form".to_string(),
                        }
                    })?;
                    table.note_column(&path);
                    row.insert(path, scalar);
                }
            }
        }
        Ok(())
    }
}

/// A top-level list explodes when it contains objects. An empty list
/// is treated as an exploded list with no elements, so a
/// record-per-event unit with no events yields zero rows. A mix of
/// objects and scalars still explodes and is then rejected as a
/// structural inconsistency by the caller.
fn explodable(elems: &[Value]) -> bool {
    elems.is_empty() || elems.iter().any(Value::is_object)
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{key}")
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flatten(policy: ListPolicy, value: Value) -> Result<FlatTable> {
        StrictFlattener::new(policy).flatten(&value)
    }

    #[test]
    fn scalar_leaves_join_paths_with_dots() {
        let table = flatten(
            ListPolicy::SerializeOpaque,
            json!({"match_id": 7, "home_team": {"name": "A", "manager": {"id": 3}}}),
        )
        .unwrap();

        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.get("match_id"), Some(&Scalar::Int(7)));
        assert_eq!(row.get("home_team.name"), Some(&Scalar::Text("A".into())));
        assert_eq!(row.get("home_team.manager.id"), Some(&Scalar::Int(3)));
    }

    #[test]
    fn explode_rows_denormalizes_parent_scalars() {
        let table = flatten(
            ListPolicy::ExplodeRows,
            json!({
                "match_id": 7,
                "home_team": {"name": "A"},
                "events": [
                    {"type": "pass", "x": 1},
                    {"type": "shot", "x": 2},
                    {"type": "carry", "x": 3}
                ]
            }),
        )
        .unwrap();

        assert_eq!(table.rows.len(), 3);
        for row in &table.rows {
            assert_eq!(row.get("match_id"), Some(&Scalar::Int(7)));
            assert_eq!(row.get("home_team.name"), Some(&Scalar::Text("A".into())));
        }
        assert_eq!(table.rows[1].get("type"), Some(&Scalar::Text("shot".into())));
        assert_eq!(table.rows[2].get("x"), Some(&Scalar::Int(3)));
    }

    #[test]
    fn empty_event_list_yields_zero_rows() {
        let table = flatten(
            ListPolicy::ExplodeRows,
            json!({"match_id": 7, "events": []}),
        )
        .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn empty_input_yields_zero_rows() {
        for raw in [json!(null), json!({}), json!([])] {
            assert!(flatten(ListPolicy::ExplodeRows, raw).unwrap().is_empty());
        }
    }

    #[test]
    fn serialize_opaque_keeps_one_row() {
        let table = flatten(
            ListPolicy::SerializeOpaque,
            json!({"match_id": 7, "lineup": [{"player": 10}, {"player": 4}]}),
        )
        .unwrap();

        assert_eq!(table.rows.len(), 1);
        let opaque = table.rows[0].get("lineup").unwrap();
        assert_eq!(
            opaque,
            &Scalar::Text("[{\"player\":10},{\"player\":4}]".into())
        );
    }

    #[test]
    fn sibling_shape_conflict_is_structural() {
        let err = flatten(
            ListPolicy::ExplodeRows,
            json!({
                "events": [
                    {"pass": {"length": 12.5}},
                    {"pass": "incomplete"}
                ]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, KilnError::StructuralParse { .. }));
    }

    #[test]
    fn mixed_object_scalar_list_is_structural() {
        let err = flatten(
            ListPolicy::ExplodeRows,
            json!({"events": [{"type": "pass"}, 42]}),
        )
        .unwrap_err();
        assert!(matches!(err, KilnError::StructuralParse { .. }));
    }

    #[test]
    fn root_array_is_one_row_per_element() {
        let table = flatten(
            ListPolicy::SerializeOpaque,
            json!([
                {"frame": 1, "ball": {"x": 0.3}},
                {"frame": 2, "ball": {"x": 0.4}}
            ]),
        )
        .unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].get("ball.x"), Some(&Scalar::Float(0.4)));
    }

    #[test]
    fn nested_list_inside_element_stays_opaque() {
        let table = flatten(
            ListPolicy::ExplodeRows,
            json!({
                "events": [
                    {"type": "shot", "freeze_frame": [{"player": 9}]}
                ]
            }),
        )
        .unwrap();

        assert_eq!(table.rows.len(), 1);
        assert_eq!(
            table.rows[0].get("freeze_frame"),
            Some(&Scalar::Text("[{\"player\":9}]".into()))
        );
    }
}
