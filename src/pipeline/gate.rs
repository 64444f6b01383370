//! Change-detection gate - skip units whose output is already fresh.
//!
//! The check is existence plus modification time: skip when the
//! output exists and is not older than its source. This is a cheap,
//! conservative freshness test, not a content hash. Known trade-off:
//! a source overwritten without its mtime advancing (or with clock
//! skew between source and output storage) is incorrectly skipped.
//! Content hashing would close that gap at the cost of reading every
//! source on every run.

use std::io::ErrorKind;
use std::path::Path;

use crate::Result;

/// Decide Process (`true`) vs Skip (`false`) for one unit.
pub fn should_process(source: &Path, output: &Path) -> Result<bool> {
    let source_mtime = std::fs::metadata(source)?.modified()?;

    match std::fs::metadata(output) {
        Ok(meta) => Ok(meta.modified()? < source_mtime),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};

    #[test]
    fn missing_output_means_process() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("match.json");
        fs::write(&source, b"{}").unwrap();

        assert!(should_process(&source, &dir.path().join("match.ktc.zst")).unwrap());
    }

    #[test]
    fn fresh_output_means_skip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("match.json");
        let output = dir.path().join("match.ktc.zst");
        fs::write(&source, b"{}").unwrap();
        fs::write(&output, b"out").unwrap();

        // output written after source
        assert!(!should_process(&source, &output).unwrap());
    }

    #[test]
    fn stale_output_means_process() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("match.json");
        let output = dir.path().join("match.ktc.zst");
        fs::write(&output, b"out").unwrap();
        fs::write(&source, b"{}").unwrap();

        // push the source mtime past the output's
        let later = SystemTime::now() + Duration::from_secs(5);
        let file = fs::File::options().append(true).open(&source).unwrap();
        file.set_modified(later).unwrap();

        assert!(should_process(&source, &output).unwrap());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(should_process(
            &dir.path().join("gone.json"),
            &dir.path().join("out.ktc.zst")
        )
        .is_err());
    }
}
