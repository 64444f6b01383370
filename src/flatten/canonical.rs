//! Column-name canonicalization.
//!
//! The strict flattener joins compound paths with `.` and the
//! permissive one with `_`. Left as-is, the same logical field would
//! surface as two distinct columns depending on which path produced
//! it, silently corrupting the reconciler's null-filling. Every
//! column name therefore passes through [`canonicalize`] before
//! reconciliation: ASCII-lowercased, every run of non-alphanumeric
//! characters collapsed to a single `_`, no leading or trailing `_`.
//! The rewrite is idempotent.

use crate::flatten::types::{FlatRow, FlatTable};

pub fn canonicalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}

/// Rewrite every column of a flattened table in place. When two
/// source columns collapse to the same canonical name, the first
/// non-null value in each row wins and discovery order keeps the
/// earlier column's position.
pub fn canonicalize_table(table: FlatTable) -> FlatTable {
    let mut columns: Vec<String> = Vec::with_capacity(table.columns.len());
    for name in &table.columns {
        let canon = canonicalize(name);
        if !canon.is_empty() && !columns.contains(&canon) {
            columns.push(canon);
        }
    }

    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            let mut out = FlatRow::new();
            for (name, value) in row {
                let canon = canonicalize(&name);
                if canon.is_empty() {
                    continue;
                }
                match out.get(&canon) {
                    Some(existing) if !existing.is_null() => {}
                    _ => {
                        out.insert(canon, value);
                    }
                }
            }
            out
        })
        .collect();

    FlatTable { columns, rows }
}
