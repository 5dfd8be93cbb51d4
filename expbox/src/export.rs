//! Read-only summaries across experiment boxes and CSV export.
//!
//! Nothing here writes to a box. Index files are preferred when they match the
//! record; otherwise an equivalent index record is rebuilt from `meta.json`
//! and the config snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::core::flatten::{FlatRow, flatten};
use crate::core::index::{IndexLocation, IndexRecord, Privacy, build_index};
use crate::error::{ExpboxError, Result};
use crate::io::config::{ConfigMap, ConfigSource, load_config};
use crate::io::csv::write_csv;
use crate::io::index_store::read_index;
use crate::io::layout::{META_FILE, ProjectPaths, absolute};
use crate::io::meta_store::load_meta;

/// Default CSV file name.
pub const DEFAULT_CSV_NAME: &str = "expbox_experiments.csv";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub results_root: PathBuf,
    /// Explicit ordered column list; the union of all keys when `None`.
    pub fields: Option<Vec<String>>,
    /// Applied to records rebuilt from `meta.json`.
    pub privacy: Privacy,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            results_root: PathBuf::from("results"),
            fields: None,
            privacy: Privacy::Safe,
        }
    }
}

/// Experiment roots under `results_root` (directories holding `meta.json`),
/// sorted by name. A missing results root has no boxes.
pub fn iter_boxes(results_root: &Path) -> Result<Vec<PathBuf>> {
    let results_root = absolute(results_root);
    if !results_root.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(&results_root).map_err(|err| {
        ExpboxError::persistence(format!("list {}", results_root.display()), err)
    })?;
    let mut boxes: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && path.join(META_FILE).is_file())
        .collect();
    boxes.sort();
    Ok(boxes)
}

/// Summarize one box as an index record.
pub fn summarize_box(
    project: &ProjectPaths,
    box_root: &Path,
    privacy: Privacy,
) -> Result<IndexRecord> {
    let box_root = absolute(box_root);
    let meta = load_meta(&box_root)?;
    let loc = IndexLocation {
        exp_root: &box_root,
        project_root: &project.project_root,
    };

    match read_index(project, &meta.exp_id) {
        Ok(Some(record)) if record.exp_id == meta.exp_id && record.created_at == meta.created_at => {
            debug!(exp_id = %meta.exp_id, indexed = %record.privacy, "using index record");
            // Safe narrows a record indexed in full mode; full cannot widen a safe one.
            return Ok(match privacy {
                Privacy::Safe => record.filtered(Privacy::Safe, loc),
                Privacy::Full => record,
            });
        }
        Ok(_) => {}
        Err(err) => debug!(exp_id = %meta.exp_id, err = %err, "unreadable index, rebuilding"),
    }

    let config = snapshot_or_empty(&box_root, meta.config_path.as_deref());
    Ok(build_index(&meta, &config, loc).filtered(privacy, loc))
}

fn snapshot_or_empty(box_root: &Path, config_path: Option<&str>) -> ConfigMap {
    let Some(rel) = config_path else {
        return ConfigMap::new();
    };
    load_config(&ConfigSource::File(box_root.join(rel))).unwrap_or_else(|err| {
        debug!(err = %err, "config snapshot unavailable");
        ConfigMap::new()
    })
}

/// Summarize every box under `results_root`. Boxes whose record cannot be
/// read are skipped with a warning.
pub fn summarize_boxes(
    project: &ProjectPaths,
    results_root: &Path,
    privacy: Privacy,
) -> Result<Vec<IndexRecord>> {
    let mut records = Vec::new();
    for box_root in iter_boxes(results_root)? {
        match summarize_box(project, &box_root, privacy) {
            Ok(record) => records.push(record),
            Err(err) => warn!(path = %box_root.display(), err = %err, "skipping unreadable box"),
        }
    }
    Ok(records)
}

/// Flatten records into rows.
pub fn flatten_records(records: &[IndexRecord]) -> Result<Vec<FlatRow>> {
    records
        .iter()
        .map(|record| {
            serde_json::to_value(record)
                .map(|value| flatten(&value))
                .map_err(|err| ExpboxError::persistence(format!("serialize {}", record.exp_id), err))
        })
        .collect()
}

/// Union of row keys in first-seen order.
pub fn union_header(rows: &[FlatRow]) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    for key in rows.iter().flat_map(FlatRow::keys) {
        if !header.iter().any(|seen| seen == key) {
            header.push(key.to_string());
        }
    }
    header
}

/// Write one CSV row per experiment and return the absolute output path.
///
/// Relative paths (results root and `csv_path`) resolve against the project
/// root.
#[instrument(skip_all, fields(project_root = %project_root.display()))]
pub fn export_csv(project_root: &Path, csv_path: &Path, opts: &ExportOptions) -> Result<PathBuf> {
    let project = ProjectPaths::new(project_root);
    let results_root = project.resolve(&opts.results_root);
    let csv_path = project.resolve(csv_path);

    let records = summarize_boxes(&project, &results_root, opts.privacy)?;
    let rows = flatten_records(&records)?;
    let header = match &opts.fields {
        Some(fields) => fields.clone(),
        None => union_header(&rows),
    };
    write_csv(&csv_path, &header, &rows)?;
    info!(rows = rows.len(), path = %csv_path.display(), "csv exported");
    Ok(csv_path)
}
