//! Experiment configuration: loading from a source and snapshotting.
//!
//! The snapshot written at creation is the only config read back on resume;
//! the source file is never read again.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ExpboxError, Result};

/// In-memory config mapping (insertion ordered).
pub type ConfigMap = Map<String, Value>;

/// Where a config comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConfigSource {
    #[default]
    None,
    Inline(ConfigMap),
    File(PathBuf),
}

impl From<ConfigMap> for ConfigSource {
    fn from(map: ConfigMap) -> Self {
        Self::Inline(map)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl ConfigSource {
    /// Interpret a command-line argument: an inline JSON object literal, or a path.
    pub fn from_arg(arg: &str) -> Result<Self> {
        let trimmed = arg.trim();
        if trimmed.starts_with('{') {
            let value: Value = serde_json::from_str(trimmed)
                .map_err(|err| ExpboxError::config("<inline>", err.to_string()))?;
            return match value {
                Value::Object(map) => Ok(Self::Inline(map)),
                _ => Err(ExpboxError::config("<inline>", "config must be a mapping")),
            };
        }
        Ok(Self::File(PathBuf::from(trimmed)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Toml,
}

fn format_for(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "json" => Some(Format::Json),
        "yaml" | "yml" => Some(Format::Yaml),
        "toml" => Some(Format::Toml),
        _ => None,
    }
}

/// Normalize a config source into a mapping.
pub fn load_config(source: &ConfigSource) -> Result<ConfigMap> {
    match source {
        ConfigSource::None => Ok(ConfigMap::new()),
        ConfigSource::Inline(map) => Ok(map.clone()),
        ConfigSource::File(path) => load_config_file(path),
    }
}

fn load_config_file(path: &Path) -> Result<ConfigMap> {
    debug!(path = %path.display(), "loading config");
    if !path.is_file() {
        return Err(ExpboxError::config(path, "config file does not exist"));
    }
    let Some(format) = format_for(path) else {
        return Err(ExpboxError::config(path, "unsupported config file type"));
    };
    let text = fs::read_to_string(path).map_err(|err| ExpboxError::config(path, err.to_string()))?;
    let value: Value = match format {
        Format::Json => serde_json::from_str(&text)
            .map_err(|err| ExpboxError::config(path, format!("invalid JSON: {err}")))?,
        Format::Yaml => serde_yaml::from_str(&text)
            .map_err(|err| ExpboxError::config(path, format!("invalid YAML: {err}")))?,
        Format::Toml => toml::from_str(&text)
            .map_err(|err| ExpboxError::config(path, format!("invalid TOML: {err}")))?,
    };
    match value {
        Value::Object(map) => Ok(map),
        // An empty YAML document parses as null.
        Value::Null => Ok(ConfigMap::new()),
        _ => Err(ExpboxError::config(path, "config must be a mapping")),
    }
}

/// Write `config` to `dest`, choosing the format from the extension.
/// Unknown extensions are written as JSON.
pub fn snapshot_config(config: &ConfigMap, dest: &Path) -> Result<()> {
    debug!(path = %dest.display(), keys = config.len(), "writing config snapshot");
    let context = || format!("write config snapshot {}", dest.display());
    let mut buf = match format_for(dest).unwrap_or(Format::Json) {
        Format::Json => serde_json::to_string_pretty(config)
            .map_err(|err| ExpboxError::persistence(context(), err))?,
        Format::Yaml => serde_yaml::to_string(config)
            .map_err(|err| ExpboxError::persistence(context(), err))?,
        Format::Toml => toml::to_string_pretty(config)
            .map_err(|err| ExpboxError::persistence(context(), err))?,
    };
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| ExpboxError::persistence(context(), err))?;
    }
    fs::write(dest, buf).map_err(|err| ExpboxError::persistence(context(), err))
}
