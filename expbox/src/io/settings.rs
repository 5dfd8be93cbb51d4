//! Project settings stored under `.expbox/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::ids::{IdSpec, IdStyle, LinkStyle};
use crate::core::index::Privacy;
use crate::error::{ExpboxError, Result};
use crate::io::exp_logger::LoggerBackend;

/// Project-wide defaults (TOML).
///
/// Intended to be edited by hand. Missing fields take the defaults below and
/// every command-line flag overrides the matching field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectSettings {
    /// Results root, relative to the project root unless absolute.
    pub results_root: PathBuf,

    /// Logger backend attached by `init` ("none" or "file").
    pub logger: String,

    /// Privacy mode for index records written on checkpoint.
    pub index_privacy: Privacy,

    /// File name of the config snapshot under `artifacts/`.
    pub config_snapshot_name: String,

    pub id: IdSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdSettings {
    pub style: IdStyle,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub link_style: LinkStyle,
}

impl IdSettings {
    pub fn to_spec(&self) -> IdSpec {
        IdSpec {
            style: self.style,
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            link_style: self.link_style,
        }
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            results_root: PathBuf::from("results"),
            logger: "none".to_string(),
            index_privacy: Privacy::Safe,
            config_snapshot_name: "config.yaml".to_string(),
            id: IdSettings::default(),
        }
    }
}

impl ProjectSettings {
    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.results_root.as_os_str().is_empty() {
            return Err(ExpboxError::config(path, "results_root must not be empty"));
        }
        self.logger
            .parse::<LoggerBackend>()
            .map_err(|err| ExpboxError::config(path, err.to_string()))?;
        let name = self.config_snapshot_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ExpboxError::config(
                path,
                "config_snapshot_name must be a bare file name",
            ));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `ProjectSettings::default()`.
pub fn load_settings(path: &Path) -> Result<ProjectSettings> {
    if !path.exists() {
        return Ok(ProjectSettings::default());
    }
    let contents =
        fs::read_to_string(path).map_err(|err| ExpboxError::config(path, err.to_string()))?;
    let settings: ProjectSettings =
        toml::from_str(&contents).map_err(|err| ExpboxError::config(path, err.to_string()))?;
    settings.validate(path)?;
    Ok(settings)
}

pub fn write_settings(path: &Path, settings: &ProjectSettings) -> Result<()> {
    settings.validate(path)?;
    let context = || format!("write settings {}", path.display());
    let mut buf =
        toml::to_string_pretty(settings).map_err(|err| ExpboxError::persistence(context(), err))?;
    buf.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ExpboxError::persistence(context(), err))?;
    }
    fs::write(path, buf).map_err(|err| ExpboxError::persistence(context(), err))
}
