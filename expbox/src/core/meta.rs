//! Experiment record persisted as `meta.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under [`ExpMeta::extra`] holding the creation-time environment snapshot.
pub const ENV_AUTO_KEY: &str = "env_auto";
/// Key under [`ExpMeta::extra`] recording which experiment replaced this one.
pub const SUPERSEDED_BY_KEY: &str = "superseded_by";

/// Machine-readable metadata for one experiment.
///
/// `exp_id`, `project` and `created_at` are fixed at creation. `finished_at`
/// stays `None` until the first checkpoint and is overwritten by every
/// checkpoint after that, intermediate or final.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpMeta {
    pub exp_id: String,
    pub project: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Latest known commit id, kept next to `git` for quick lookups.
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,

    /// Config snapshot path relative to the experiment root.
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default = "default_backend_name")]
    pub logger_backend: String,

    /// Free-form status ("running", "done", "failed", "stale", ...).
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub env_note: Option<String>,
    #[serde(default)]
    pub final_note: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn default_backend_name() -> String {
    "none".to_string()
}

impl ExpMeta {
    pub fn new(exp_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            exp_id: exp_id.into(),
            project: project.into(),
            title: None,
            purpose: None,
            created_at: Utc::now(),
            finished_at: None,
            git_commit: None,
            git: None,
            config_path: None,
            logger_backend: default_backend_name(),
            status: None,
            env_note: None,
            final_note: None,
            extra: Map::new(),
        }
    }

    /// Environment snapshot captured at creation, if any.
    pub fn env_auto(&self) -> Option<&Map<String, Value>> {
        self.extra.get(ENV_AUTO_KEY).and_then(Value::as_object)
    }

    pub fn superseded_by(&self) -> Option<&str> {
        self.extra.get(SUPERSEDED_BY_KEY).and_then(Value::as_str)
    }

    /// Append a line to the final note, creating it if absent.
    pub fn append_final_note(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.final_note = Some(match self.final_note.take() {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}\n{line}"),
            _ => line.to_string(),
        });
    }

    /// An experiment that was started but never checkpointed.
    pub fn is_abandoned(&self) -> bool {
        self.status.as_deref() == Some("running") && self.finished_at.is_none()
    }
}

/// Version-control state for one experiment.
///
/// `start` is captured once at creation; `last`, `dirty_files` and `remote`
/// are refreshed on checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitInfo {
    #[serde(default)]
    pub repo_root: Option<String>,
    #[serde(default)]
    pub project_relpath: Option<String>,
    #[serde(default)]
    pub start: Option<GitSnapshot>,
    #[serde(default)]
    pub last: Option<GitSnapshot>,
    #[serde(default)]
    pub dirty_files: Vec<String>,
    #[serde(default)]
    pub remote: Option<GitRemote>,
}

/// Point-in-time HEAD description. Every field is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitSnapshot {
    pub commit: Option<String>,
    pub branch: Option<String>,
    pub dirty: Option<bool>,
    pub subject: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub captured_at: DateTime<Utc>,
}

impl GitSnapshot {
    /// First seven characters of the commit id.
    pub fn short_commit(&self) -> Option<&str> {
        self.commit.as_deref().map(|c| match c.char_indices().nth(7) {
            Some((end, _)) => &c[..end],
            None => c,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitRemote {
    pub name: String,
    pub url: String,
    /// Web link to the commit, when the remote is a known hosting service.
    #[serde(default)]
    pub commit_url: Option<String>,
}

/// Timestamp parsing for records written by other tools.
///
/// RFC 3339 is accepted as is. ISO 8601 without an offset
/// (`2024-11-25T13:20:00.123456`) is read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp {raw:?}")))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp {raw:?}")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_unfinished_without_git() {
        let meta = ExpMeta::new("241125-1320", "proj");
        assert!(meta.finished_at.is_none());
        assert!(meta.git.is_none());
        assert_eq!(meta.logger_backend, "none");

        let json = serde_json::to_value(&meta).expect("serialize");
        assert!(json.get("git").is_none(), "git section must be omitted");
        assert!(json.get("finished_at").expect("key").is_null());
    }

    #[test]
    fn deserializes_minimal_record() {
        let raw = r#"{"exp_id":"a","project":"p","created_at":"2024-11-25T13:20:00Z"}"#;
        let meta: ExpMeta = serde_json::from_str(raw).expect("parse");
        assert_eq!(meta.exp_id, "a");
        assert_eq!(meta.logger_backend, "none");
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn append_final_note_accumulates_lines() {
        let mut meta = ExpMeta::new("a", "p");
        meta.append_final_note("first");
        meta.append_final_note("  ");
        meta.append_final_note("second");
        assert_eq!(meta.final_note.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn abandoned_means_running_and_never_saved() {
        let mut meta = ExpMeta::new("a", "p");
        assert!(!meta.is_abandoned());
        meta.status = Some("running".to_string());
        assert!(meta.is_abandoned());
        meta.finished_at = Some(Utc::now());
        assert!(!meta.is_abandoned());
    }

    #[test]
    fn short_commit_truncates() {
        let snap = GitSnapshot {
            commit: Some("0123456789abcdef".to_string()),
            branch: None,
            dirty: None,
            subject: None,
            captured_at: Utc::now(),
        };
        assert_eq!(snap.short_commit(), Some("0123456"));
    }

    #[test]
    fn short_commit_respects_char_boundaries() {
        let snap = GitSnapshot {
            commit: Some("ééééééééé".to_string()),
            branch: None,
            dirty: None,
            subject: None,
            captured_at: Utc::now(),
        };
        assert_eq!(snap.short_commit(), Some("ééééééé"));
        let short = GitSnapshot {
            commit: Some("abc".to_string()),
            ..snap
        };
        assert_eq!(short.short_commit(), Some("abc"));
    }

    #[test]
    fn timestamps_without_offset_are_utc() {
        let raw = r#"{
            "exp_id": "a",
            "project": "p",
            "created_at": "2024-11-25T13:20:00.123456",
            "finished_at": "2024-11-25 14:00:00",
            "git": {
                "start": {"commit": null, "branch": null, "dirty": null, "subject": null,
                          "captured_at": "2024-11-25T13:20:00"}
            }
        }"#;
        let meta: ExpMeta = serde_json::from_str(raw).expect("parse");
        assert_eq!(
            meta.created_at.to_rfc3339(),
            "2024-11-25T13:20:00.123456+00:00"
        );
        assert_eq!(
            meta.finished_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-11-25T14:00:00+00:00")
        );
        let start = meta.git.and_then(|g| g.start).expect("start");
        assert_eq!(start.captured_at.to_rfc3339(), "2024-11-25T13:20:00+00:00");
    }

    #[test]
    fn offset_timestamps_are_normalized_and_garbage_rejected() {
        let parsed = timestamp::parse("2024-11-25T15:20:00+02:00").expect("parse");
        assert_eq!(parsed.to_rfc3339(), "2024-11-25T13:20:00+00:00");
        assert!(timestamp::parse("yesterday").is_none());

        let raw = r#"{"exp_id":"a","project":"p","created_at":"yesterday"}"#;
        assert!(serde_json::from_str::<ExpMeta>(raw).is_err());
    }
}
