//! Columnar writer - persist a reconciled table as one compressed
//! column-major unit.
//!
//! The container is self-describing: one block per column carrying
//! the name, declared type, and value vector, zstd-compressed. Writes
//! are atomic with respect to crashes: the container is written to a
//! temp file in the destination directory and renamed over the final
//! path only once complete, so a partial write never becomes visible.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::flatten::types::Scalar;
use crate::schema::reconcile::ReconciledTable;
use crate::schema::{ColumnSpec, ColumnType};
use crate::{KilnError, Result};

/// File extension of one written unit (kiln table container).
pub const OUTPUT_EXTENSION: &str = "ktc.zst";

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct ColumnBlock {
    name: String,
    #[serde(rename = "type")]
    ty: ColumnType,
    values: Vec<Scalar>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableContainer {
    record_type: String,
    rows: usize,
    columns: Vec<ColumnBlock>,
}

/// Persist `table` at `dest`, atomically.
pub fn write_table(table: &ReconciledTable, dest: &Path) -> Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let container = to_container(table);

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    let mut encoder = zstd::Encoder::new(tmp.as_file_mut(), ZSTD_LEVEL)?;
    serde_json::to_writer(&mut encoder, &container)
        .map_err(|e| KilnError::Io(e.into()))?;
    encoder.finish()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| KilnError::Io(e.error))?;

    Ok(())
}

/// Decode a written unit back into a table, for audits and tests.
pub fn read_table(path: &Path) -> Result<ReconciledTable> {
    let file = File::open(path)?;
    let decoder = zstd::Decoder::new(file)?;
    let container: TableContainer = serde_json::from_reader(decoder).map_err(|e| {
        KilnError::SourceUnreadable(format!("{}: {e}", path.display()))
    })?;
    from_container(container, path)
}

fn to_container(table: &ReconciledTable) -> TableContainer {
    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, spec)| ColumnBlock {
            name: spec.name.clone(),
            ty: spec.ty,
            values: table.rows.iter().map(|row| row[idx].clone()).collect(),
        })
        .collect();

    TableContainer {
        record_type: table.record_type.clone(),
        rows: table.rows.len(),
        columns,
    }
}

fn from_container(container: TableContainer, path: &Path) -> Result<ReconciledTable> {
    for block in &container.columns {
        if block.values.len() != container.rows {
            return Err(KilnError::SourceUnreadable(format!(
                "{}: column '{}' holds {} values for {} rows",
                path.display(),
                block.name,
                block.values.len(),
                container.rows
            )));
        }
    }

    let columns: Vec<ColumnSpec> = container
        .columns
        .iter()
        .map(|b| ColumnSpec::new(b.name.clone(), b.ty))
        .collect();

    let rows = (0..container.rows)
        .map(|r| {
            container
                .columns
                .iter()
                .map(|b| b.values[r].clone())
                .collect()
        })
        .collect();

    Ok(ReconciledTable {
        record_type: container.record_type,
        columns,
        rows,
    })
}
