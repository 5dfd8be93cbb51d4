//! Denormalized per-experiment index record and its privacy filter.
//!
//! The index is a convenience projection of `meta.json` plus a few
//! config-derived fields. It is rebuilt on every checkpoint and never read
//! back as a source of truth.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::meta::{ExpMeta, GitRemote, GitSnapshot};

/// Environment keys kept in [`Privacy::Safe`] mode.
const SAFE_ENV_KEYS: [&str; 3] = ["platform", "gpu", "cuda_visible_devices"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    /// Strip absolute paths, dirty-file lists and dataset paths.
    #[default]
    Safe,
    Full,
}

impl FromStr for Privacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown privacy mode '{other}' (expected safe|full)")),
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => f.write_str("safe"),
            Self::Full => f.write_str("full"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub exp_id: String,
    pub project: String,
    pub title: Option<String>,
    pub purpose: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logger_backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_path: Option<String>,
    pub config_path: Option<String>,
    pub git: IndexGit,
    pub env: Map<String, Value>,
    pub env_note: Option<String>,
    pub final_note: Option<String>,
    pub dataset: IndexDataset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    pub privacy: Privacy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexGit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<String>,
    pub start: Option<GitSnapshot>,
    pub last: Option<GitSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty_files: Option<Vec<String>>,
    pub remote: Option<GitRemote>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDataset {
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub version: Option<String>,
}

/// Where an experiment lives, for path fields in the index.
#[derive(Debug, Clone, Copy)]
pub struct IndexLocation<'a> {
    /// Absolute experiment root (`<results_root>/<exp_id>`).
    pub exp_root: &'a Path,
    pub project_root: &'a Path,
}

/// Build the full (unfiltered) index record.
pub fn build_index(
    meta: &ExpMeta,
    config: &Map<String, Value>,
    loc: IndexLocation<'_>,
) -> IndexRecord {
    let git = meta
        .git
        .as_ref()
        .map(|g| IndexGit {
            repo_root: g.repo_root.clone(),
            start: g.start.clone(),
            last: g.last.clone(),
            dirty_files: Some(g.dirty_files.clone()),
            remote: g.remote.clone(),
        })
        .unwrap_or_default();

    IndexRecord {
        exp_id: meta.exp_id.clone(),
        project: meta.project.clone(),
        title: meta.title.clone(),
        purpose: meta.purpose.clone(),
        status: meta.status.clone(),
        created_at: meta.created_at,
        finished_at: meta.finished_at,
        logger_backend: meta.logger_backend.clone(),
        results_path: Some(loc.exp_root.display().to_string()),
        config_path: meta.config_path.clone(),
        git,
        env: meta.env_auto().cloned().unwrap_or_default(),
        env_note: meta.env_note.clone(),
        final_note: meta.final_note.clone(),
        dataset: dataset_fields(config),
        superseded_by: meta.superseded_by().map(str::to_string),
        privacy: Privacy::Full,
    }
}

impl IndexRecord {
    /// Apply a privacy mode. `Full` is the identity.
    pub fn filtered(mut self, privacy: Privacy, loc: IndexLocation<'_>) -> Self {
        self.privacy = privacy;
        if privacy == Privacy::Full {
            return self;
        }
        self.results_path = loc
            .exp_root
            .strip_prefix(loc.project_root)
            .ok()
            .map(|rel| rel.display().to_string())
            .filter(|rel| !rel.is_empty());
        self.config_path = self.config_path.filter(|p| !Path::new(p).is_absolute());
        self.git.repo_root = None;
        self.git.dirty_files = None;
        self.dataset.path = None;
        self.env = narrow_env(&self.env);
        self
    }
}

/// Keep coarse environment fields only; GPU entries keep just their names.
fn narrow_env(env: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for key in SAFE_ENV_KEYS {
        let Some(value) = env.get(key) else {
            continue;
        };
        let value = if key == "gpu" {
            gpu_names(value)
        } else {
            value.clone()
        };
        out.insert(key.to_string(), value);
    }
    out
}

fn gpu_names(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| item.get("name").cloned().unwrap_or_else(|| item.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Pull `dataset.{name,path,version}` out of a config mapping, tolerating any shape.
fn dataset_fields(config: &Map<String, Value>) -> IndexDataset {
    let Some(dataset) = config.get("dataset").and_then(Value::as_object) else {
        return IndexDataset::default();
    };
    let field = |key: &str| dataset.get(key).and_then(scalar_to_string);
    IndexDataset {
        name: field("name"),
        path: field("path"),
        version: field("version"),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
