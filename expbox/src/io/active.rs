//! Active-experiment pointer file (`.expbox/active`).
//!
//! One line holding an experiment id. Written by `init`/`load` when asked,
//! never cleared automatically; readers must re-validate the target.

use std::fs;

use tracing::debug;

use super::layout::{ProjectPaths, create_dir};
use crate::core::ids::validate_exp_id;
use crate::error::{ExpboxError, Result};

/// Read the pointer. A missing or empty file is `NoActiveExperiment`.
pub fn read_active(project: &ProjectPaths) -> Result<String> {
    let path = &project.active_path;
    if !path.is_file() {
        return Err(ExpboxError::NoActiveExperiment {
            pointer: path.clone(),
        });
    }
    let contents = fs::read_to_string(path)
        .map_err(|err| ExpboxError::persistence(format!("read {}", path.display()), err))?;
    let exp_id = contents.lines().next().unwrap_or_default().trim().to_string();
    if exp_id.is_empty() {
        return Err(ExpboxError::NoActiveExperiment {
            pointer: path.clone(),
        });
    }
    debug!(exp_id = %exp_id, "active pointer read");
    Ok(exp_id)
}

pub fn write_active(project: &ProjectPaths, exp_id: &str) -> Result<()> {
    validate_exp_id(exp_id)?;
    create_dir(&project.state_dir)?;
    let path = &project.active_path;
    fs::write(path, format!("{exp_id}\n"))
        .map_err(|err| ExpboxError::persistence(format!("write {}", path.display()), err))?;
    debug!(exp_id, path = %path.display(), "active pointer written");
    Ok(())
}
