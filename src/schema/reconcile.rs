//! Schema reconciliation - conform a flattened table to the canonical
//! schema for its record type.
//!
//! Missing schema columns are added as null, undeclared columns are
//! dropped or appended per the schema's extra-column policy, and every
//! retained value is coerced to its declared type. A value that will
//! not coerce becomes null plus a recorded warning; it never aborts
//! the column or the unit.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::flatten::canonical::canonicalize;
use crate::flatten::types::{FlatTable, Scalar};
use crate::schema::{CanonicalSchema, ColumnSpec, ColumnType, ExtraColumnPolicy};

// Pre-compiled ISO-8601 patterns for temporal validation
static ISO_DATETIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});

static ISO_DATE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

static ISO_TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(.\d+)?$").unwrap());

/// A table conformed to a schema: every row has exactly the same
/// column set, in schema order, with preserved extras appended. This
/// uniformity is the contract the columnar writer depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledTable {
    pub record_type: String,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Scalar>>,
}

impl ReconciledTable {
    /// Position of a column by canonical name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// One value that could not be coerced to its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionWarning {
    pub row: usize,
    pub column: String,
    pub reason: String,
}

/// Conform `table` to `schema`. Column names in `table` are expected
/// to already be canonical.
pub fn reconcile(
    table: FlatTable,
    schema: &CanonicalSchema,
) -> (ReconciledTable, Vec<CoercionWarning>) {
    // Source names (canonical column name plus aliases) claimed by
    // each schema column, in declaration order.
    let mut claimed: Vec<Vec<String>> = Vec::with_capacity(schema.columns.len());
    for spec in &schema.columns {
        let mut names = vec![canonicalize(&spec.name)];
        names.extend(spec.aliases.iter().map(|a| canonicalize(a)));
        claimed.push(names);
    }

    let mut columns: Vec<ColumnSpec> = schema.columns.clone();
    if schema.extra_columns == ExtraColumnPolicy::Preserve {
        for name in &table.columns {
            let taken = claimed.iter().any(|names| names.iter().any(|n| n == name));
            if !taken {
                columns.push(ColumnSpec::new(name.clone(), ColumnType::Text));
                claimed.push(vec![name.clone()]);
            }
        }
    }

    let mut warnings = Vec::new();
    let mut rows = Vec::with_capacity(table.rows.len());

    for (row_idx, row) in table.rows.iter().enumerate() {
        let mut out = Vec::with_capacity(columns.len());
        for (spec, names) in columns.iter().zip(&claimed) {
            let value = names.iter().find_map(|n| row.get(n));
            match value {
                None => out.push(Scalar::Null),
                Some(v) => match coerce(v, spec.ty) {
                    Ok(coerced) => out.push(coerced),
                    Err(reason) => {
                        warnings.push(CoercionWarning {
                            row: row_idx,
                            column: spec.name.clone(),
                            reason,
                        });
                        out.push(Scalar::Null);
                    }
                },
            }
        }
        rows.push(out);
    }

    (
        ReconciledTable {
            record_type: schema.record_type.clone(),
            columns,
            rows,
        },
        warnings,
    )
}

/// Coerce one value to a declared type. Null always passes through.
pub fn coerce(value: &Scalar, ty: ColumnType) -> Result<Scalar, String> {
    if value.is_null() {
        return Ok(Scalar::Null);
    }

    match ty {
        ColumnType::Integer => match value {
            Scalar::Int(i) => Ok(Scalar::Int(*i)),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(Scalar::Int(*f as i64))
            }
            Scalar::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Scalar::Int)
                .map_err(|_| format!("'{s}' is not an integer")),
            other => Err(format!("{other:?} is not an integer")),
        },
        ColumnType::Float => match value {
            Scalar::Float(f) => Ok(Scalar::Float(*f)),
            Scalar::Int(i) => Ok(Scalar::Float(*i as f64)),
            Scalar::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Scalar::Float)
                .map_err(|_| format!("'{s}' is not a number")),
            other => Err(format!("{other:?} is not a number")),
        },
        ColumnType::Boolean => match value {
            Scalar::Bool(b) => Ok(Scalar::Bool(*b)),
            Scalar::Int(0) => Ok(Scalar::Bool(false)),
            Scalar::Int(1) => Ok(Scalar::Bool(true)),
            Scalar::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Scalar::Bool(true)),
                "false" | "f" | "0" => Ok(Scalar::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            other => Err(format!("{other:?} is not a boolean")),
        },
        ColumnType::Text => value
            .render_text()
            .map(Scalar::Text)
            .ok_or_else(|| "unrenderable value".to_string()),
        ColumnType::Timestamp => match value {
            // epoch seconds or milliseconds pass through unchanged
            Scalar::Int(i) => Ok(Scalar::Int(*i)),
            Scalar::Text(s) => {
                let t = s.trim();
                if ISO_DATETIME_REGEX.is_match(t)
                    || ISO_DATE_REGEX.is_match(t)
                    || ISO_TIME_REGEX.is_match(t)
                {
                    Ok(Scalar::Text(t.to_string()))
                } else {
                    Err(format!("'{s}' is not an ISO-8601 timestamp"))
                }
            }
            other => Err(format!("{other:?} is not a timestamp")),
        },
        ColumnType::Opaque => value
            .render_text()
            .map(Scalar::Text)
            .ok_or_else(|| "unrenderable value".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::types::FlatRow;

    fn events_schema() -> CanonicalSchema {
        CanonicalSchema::new(
            "events",
            vec![
                ColumnSpec::new("match_id", ColumnType::Integer),
                ColumnSpec::new("event_type", ColumnType::Text).with_alias("type"),
                ColumnSpec::new("x", ColumnType::Float),
                ColumnSpec::new("home_team_name", ColumnType::Text),
            ],
        )
    }

    fn row(cells: &[(&str, Scalar)]) -> FlatRow {
        cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn table(columns: &[&str], rows: Vec<FlatRow>) -> FlatTable {
        FlatTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn missing_schema_column_is_null_filled() {
        let input = table(
            &["match_id"],
            vec![row(&[("match_id", Scalar::Int(7))])],
        );
        let (out, warnings) = reconcile(input, &events_schema());

        assert!(warnings.is_empty());
        assert_eq!(out.columns.len(), 4);
        assert_eq!(out.rows[0][0], Scalar::Int(7));
        assert_eq!(out.rows[0][3], Scalar::Null);
    }

    #[test]
    fn schema_closure_drops_extras_by_default() {
        let input = table(
            &["match_id", "vendor_flag"],
            vec![row(&[
                ("match_id", Scalar::Int(7)),
                ("vendor_flag", Scalar::Bool(true)),
            ])],
        );
        let (out, _) = reconcile(input, &events_schema());

        assert_eq!(out.columns.len(), 4);
        assert!(out.column_index("vendor_flag").is_none());
    }

    #[test]
    fn preserve_policy_appends_extras_after_schema_columns() {
        let schema = events_schema().with_extra_columns(ExtraColumnPolicy::Preserve);
        let input = table(
            &["vendor_flag", "match_id"],
            vec![row(&[
                ("match_id", Scalar::Int(7)),
                ("vendor_flag", Scalar::Bool(true)),
            ])],
        );
        let (out, _) = reconcile(input, &schema);

        assert_eq!(out.columns.len(), 5);
        assert_eq!(out.columns[4].name, "vendor_flag");
        assert_eq!(out.rows[0][4], Scalar::Text("true".into()));
    }

    #[test]
    fn aliases_map_vendor_names_onto_schema_columns() {
        let input = table(
            &["type"],
            vec![row(&[("type", Scalar::Text("pass".into()))])],
        );
        let (out, _) = reconcile(input, &events_schema());

        let idx = out.column_index("event_type").unwrap();
        assert_eq!(out.rows[0][idx], Scalar::Text("pass".into()));
    }

    #[test]
    fn coercion_failure_is_null_plus_warning() {
        let input = table(
            &["match_id", "x"],
            vec![row(&[
                ("match_id", Scalar::Text("not a number".into())),
                ("x", Scalar::Float(1.0)),
            ])],
        );
        let (out, warnings) = reconcile(input, &events_schema());

        assert_eq!(out.rows[0][0], Scalar::Null);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].column, "match_id");
        assert_eq!(warnings[0].row, 0);
    }

    #[test]
    fn text_numbers_coerce_back_to_numbers() {
        assert_eq!(
            coerce(&Scalar::Text("7".into()), ColumnType::Integer),
            Ok(Scalar::Int(7))
        );
        assert_eq!(
            coerce(&Scalar::Text("1.5".into()), ColumnType::Float),
            Ok(Scalar::Float(1.5))
        );
        assert_eq!(
            coerce(&Scalar::Text("true".into()), ColumnType::Boolean),
            Ok(Scalar::Bool(true))
        );
    }

    #[test]
    fn timestamps_validate_iso_shapes() {
        for ok in ["2024-08-17", "00:00:02.500", "2024-08-17T15:04:05Z"] {
            assert!(coerce(&Scalar::Text(ok.into()), ColumnType::Timestamp).is_ok());
        }
        assert!(coerce(&Scalar::Text("yesterday".into()), ColumnType::Timestamp).is_err());
        // epoch integers are accepted as-is
        assert_eq!(
            coerce(&Scalar::Int(1_724_000_000), ColumnType::Timestamp),
            Ok(Scalar::Int(1_724_000_000))
        );
    }

    #[test]
    fn every_row_has_identical_column_count() {
        let input = table(
            &["match_id", "type"],
            vec![
                row(&[("match_id", Scalar::Int(7))]),
                row(&[("type", Scalar::Text("shot".into()))]),
            ],
        );
        let (out, _) = reconcile(input, &events_schema());

        for r in &out.rows {
            assert_eq!(r.len(), out.columns.len());
        }
    }
}
