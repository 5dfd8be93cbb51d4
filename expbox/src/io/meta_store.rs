//! `meta.json` storage.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use super::layout::META_FILE;
use crate::core::meta::ExpMeta;
use crate::error::{ExpboxError, Result};

/// Load the record under an experiment root.
///
/// A missing file is [`ExpboxError::RecordNotFound`]; an unreadable or corrupt
/// one is a persistence failure.
pub fn load_meta(root: &Path) -> Result<ExpMeta> {
    let path = root.join(META_FILE);
    debug!(path = %path.display(), "loading meta");
    if !path.is_file() {
        return Err(ExpboxError::RecordNotFound { path });
    }
    let contents = fs::read_to_string(&path)
        .map_err(|err| ExpboxError::persistence(format!("read {}", path.display()), err))?;
    let meta: ExpMeta = serde_json::from_str(&contents)
        .map_err(|err| ExpboxError::persistence(format!("parse {}", path.display()), err))?;
    debug!(exp_id = %meta.exp_id, status = ?meta.status, "meta loaded");
    Ok(meta)
}

/// Write the record under an experiment root (temp file + rename).
pub fn save_meta(meta: &ExpMeta, root: &Path) -> Result<()> {
    let path = root.join(META_FILE);
    debug!(path = %path.display(), exp_id = %meta.exp_id, status = ?meta.status, "writing meta");
    write_json_atomic(&path, meta)
}

/// Pretty JSON with a trailing newline, replaced atomically.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .map_err(|err| ExpboxError::persistence(format!("serialize {}", path.display()), err))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        ExpboxError::persistence(
            format!("write {}", path.display()),
            "path has no parent directory",
        )
    })?;
    fs::create_dir_all(parent).map_err(|err| {
        ExpboxError::persistence(format!("create directory {}", parent.display()), err)
    })?;
    // Unique temp name per writer: concurrent checkpoints race on the rename
    // only, and the last one wins.
    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| {
        ExpboxError::persistence(format!("create temp file in {}", parent.display()), err)
    })?;
    tmp.write_all(contents.as_bytes())
        .map_err(|err| ExpboxError::persistence(format!("write {}", tmp.path().display()), err))?;
    tmp.persist(path)
        .map_err(|err| ExpboxError::persistence(format!("replace {}", path.display()), err))?;
    Ok(())
}
