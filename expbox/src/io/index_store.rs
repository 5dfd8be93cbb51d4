//! Per-experiment index files under `.expbox/index/`.

use std::fs;

use tracing::debug;

use super::layout::ProjectPaths;
use super::meta_store::write_json_atomic;
use crate::core::index::IndexRecord;
use crate::error::{ExpboxError, Result};

/// Write (or overwrite) `<index_dir>/<exp_id>.json`.
pub fn write_index(project: &ProjectPaths, record: &IndexRecord) -> Result<()> {
    let path = project.index_path(&record.exp_id);
    debug!(path = %path.display(), privacy = %record.privacy, "writing index record");
    write_json_atomic(&path, record)
}

/// Read an index record. `Ok(None)` when there is none.
pub fn read_index(project: &ProjectPaths, exp_id: &str) -> Result<Option<IndexRecord>> {
    let path = project.index_path(exp_id);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .map_err(|err| ExpboxError::persistence(format!("read {}", path.display()), err))?;
    let record = serde_json::from_str(&contents)
        .map_err(|err| ExpboxError::persistence(format!("parse {}", path.display()), err))?;
    Ok(Some(record))
}
