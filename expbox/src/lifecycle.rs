//! Experiment lifecycle: create, resume and checkpoint.
//!
//! Every operation takes the project root explicitly. Relative results roots
//! and config paths are resolved against it, and the `.expbox/` state
//! directory (index, active pointer) lives under it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::core::ids::{IdSpec, generate_exp_id, validate_exp_id};
use crate::core::index::{IndexLocation, Privacy, build_index};
use crate::core::meta::{ENV_AUTO_KEY, ExpMeta};
use crate::core::summary::format_summary;
use crate::error::{ExpboxError, Result};
use crate::io::config::{ConfigMap, ConfigSource, load_config, snapshot_config};
use crate::io::env::collect_env_auto;
use crate::io::exp_logger::{ExpLogger, LoggerBackend};
use crate::io::git::{collect_git_info, refresh_git_info};
use crate::io::index_store::write_index;
use crate::io::layout::{ExpPaths, ProjectPaths, absolute};
use crate::io::meta_store::{load_meta, save_meta};
use crate::io::settings::ProjectSettings;

/// Status given to new experiments unless overridden.
pub const DEFAULT_STATUS: &str = "running";

/// Everything a running experiment needs, owned by the caller.
#[derive(Debug)]
pub struct ExpContext {
    pub exp_id: String,
    pub project: String,
    pub project_root: PathBuf,
    pub paths: ExpPaths,
    pub config: ConfigMap,
    pub meta: ExpMeta,
    pub logger: ExpLogger,
}

impl ExpContext {
    pub fn project_paths(&self) -> ProjectPaths {
        ProjectPaths::new(&self.project_root)
    }

    /// Environment snapshot captured at creation.
    pub fn env_auto(&self) -> Option<&Map<String, Value>> {
        self.meta.env_auto()
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Defaults to the project root's directory name.
    pub project: Option<String>,
    pub title: Option<String>,
    pub purpose: Option<String>,
    pub config: ConfigSource,
    pub results_root: PathBuf,
    /// Explicit id; generated from `id` when absent.
    pub exp_id: Option<String>,
    pub id: IdSpec,
    pub logger: LoggerBackend,
    pub config_snapshot_name: String,
    pub status: Option<String>,
    pub env_note: Option<String>,
    /// Merged into `meta.extra` before the environment snapshot.
    pub extra: Map<String, Value>,
    pub probe_env: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self::from_settings(&ProjectSettings::default())
    }
}

impl InitOptions {
    /// Defaults taken from project settings. An invalid logger tag falls back
    /// to `none`; settings are validated when loaded.
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        Self {
            project: None,
            title: None,
            purpose: None,
            config: ConfigSource::None,
            results_root: settings.results_root.clone(),
            exp_id: None,
            id: settings.id.to_spec(),
            logger: settings.logger.parse().unwrap_or_default(),
            config_snapshot_name: settings.config_snapshot_name.clone(),
            status: Some(DEFAULT_STATUS.to_string()),
            env_note: None,
            extra: Map::new(),
            probe_env: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub results_root: PathBuf,
    /// Fresh backend for this session, independent of the one used before.
    pub logger: LoggerBackend,
    /// Treat an unreadable config snapshot as an empty config instead of
    /// failing. Maintenance passes set this; they only touch the record.
    pub record_only: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from_settings(&ProjectSettings::default())
    }
}

impl LoadOptions {
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        Self {
            results_root: settings.results_root.clone(),
            logger: LoggerBackend::None,
            record_only: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub status: Option<String>,
    pub final_note: Option<String>,
    pub update_git: bool,
    pub privacy: Privacy,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            status: None,
            final_note: None,
            update_git: true,
            privacy: Privacy::Safe,
        }
    }
}

/// Result of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub exp_id: String,
    /// One-line human-readable summary.
    pub summary: String,
    pub index_written: bool,
}

/// Directory name of `project_root`, or `"default"` for a bare root.
pub fn default_project_name(project_root: &Path) -> String {
    absolute(project_root)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("default")
        .to_string()
}

/// Create a new experiment box and return its context.
#[instrument(skip_all, fields(project_root = %project_root.display()))]
pub fn init_exp(project_root: &Path, opts: InitOptions) -> Result<ExpContext> {
    let project_paths = ProjectPaths::new(project_root);
    let project_root = project_paths.project_root.clone();
    let exp_id = match opts.exp_id {
        Some(id) => id,
        None => generate_exp_id(&opts.id),
    };
    validate_exp_id(&exp_id)?;

    let results_root = project_paths.resolve(&opts.results_root);
    let exp_root = results_root.join(&exp_id);
    if exp_root.join(crate::io::layout::META_FILE).exists() {
        warn!(exp_id = %exp_id, "experiment record already exists, overwriting");
    }
    let source = match opts.config {
        ConfigSource::File(path) => ConfigSource::File(project_paths.resolve(&path)),
        other => other,
    };
    let config = load_config(&source)?;

    let paths = ExpPaths::create(&exp_root)?;
    let config_path = if config.is_empty() {
        None
    } else {
        let dest = paths.artifacts.join(&opts.config_snapshot_name);
        snapshot_config(&config, &dest)?;
        Some(format!("artifacts/{}", opts.config_snapshot_name))
    };

    let project = opts
        .project
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| default_project_name(&project_root));

    let git = collect_git_info(&project_root);
    let mut meta = ExpMeta::new(&exp_id, &project);
    meta.title = opts.title;
    meta.purpose = opts.purpose;
    meta.git_commit = git
        .as_ref()
        .and_then(|g| g.start.as_ref())
        .and_then(|s| s.commit.clone());
    meta.git = git;
    meta.config_path = config_path;
    meta.logger_backend = opts.logger.as_str().to_string();
    meta.status = opts.status;
    meta.env_note = opts.env_note;
    meta.extra = opts.extra;
    if opts.probe_env && !meta.extra.contains_key(ENV_AUTO_KEY) {
        meta.extra
            .insert(ENV_AUTO_KEY.to_string(), Value::Object(collect_env_auto()));
    }

    save_meta(&meta, &paths.root)?;
    let logger = ExpLogger::build(opts.logger, &paths)?;

    info!(exp_id = %exp_id, project = %project, root = %paths.root.display(), "experiment created");
    Ok(ExpContext {
        exp_id,
        project,
        project_root,
        paths,
        config,
        meta,
        logger,
    })
}

/// Re-open an existing experiment from its record and config snapshot.
#[instrument(skip_all, fields(exp_id = %exp_id))]
pub fn load_exp(project_root: &Path, exp_id: &str, opts: &LoadOptions) -> Result<ExpContext> {
    validate_exp_id(exp_id)?;
    let project_root = absolute(project_root);
    let exp_root = ProjectPaths::new(&project_root)
        .resolve(&opts.results_root)
        .join(exp_id);

    let meta = load_meta(&exp_root)?;
    // Recreate any subdirectory removed since the last session.
    let paths = ExpPaths::create(&exp_root)?;
    let config = match meta.config_path.as_deref() {
        Some(rel) => match load_config(&ConfigSource::File(paths.root.join(rel))) {
            Ok(config) => config,
            Err(err) if opts.record_only => {
                warn!(err = %err, "config snapshot unreadable, continuing with empty config");
                ConfigMap::new()
            }
            Err(err) => return Err(err),
        },
        None => ConfigMap::new(),
    };
    let logger = ExpLogger::build(opts.logger, &paths)?;

    debug!(exp_id = %meta.exp_id, status = ?meta.status, "experiment loaded");
    Ok(ExpContext {
        exp_id: meta.exp_id.clone(),
        project: meta.project.clone(),
        project_root,
        paths,
        config,
        meta,
        logger,
    })
}

/// Checkpoint: update status and notes, stamp `finished_at`, refresh git,
/// persist the record, write the index and close the logger.
///
/// Only the record write and the logger close can fail the call.
#[instrument(skip_all, fields(exp_id = %ctx.exp_id))]
pub fn save_exp(ctx: &mut ExpContext, opts: &SaveOptions) -> Result<SaveOutcome> {
    let meta = &mut ctx.meta;
    if let Some(status) = &opts.status {
        meta.status = Some(status.clone());
    }
    if let Some(note) = &opts.final_note {
        meta.final_note = Some(note.clone());
    }
    meta.finished_at = Some(Utc::now());

    if opts.update_git {
        refresh_git(meta, &ctx.project_root);
    }
    meta.logger_backend = ctx.logger.backend().as_str().to_string();

    save_meta(meta, &ctx.paths.root)?;

    let project_paths = ProjectPaths::new(&ctx.project_root);
    let loc = IndexLocation {
        exp_root: &ctx.paths.root,
        project_root: &project_paths.project_root,
    };
    let record = build_index(meta, &ctx.config, loc).filtered(opts.privacy, loc);
    let index_written = match write_index(&project_paths, &record) {
        Ok(()) => true,
        Err(err) => {
            warn!(err = %err, "index write failed, continuing");
            false
        }
    };

    ctx.logger.close().map_err(|err| {
        ExpboxError::persistence(format!("close logger for {}", ctx.exp_id), err)
    })?;

    let summary = format_summary(&ctx.meta, &ctx.paths.root);
    info!(status = ?ctx.meta.status, index_written, "experiment saved");
    Ok(SaveOutcome {
        exp_id: ctx.exp_id.clone(),
        summary,
        index_written,
    })
}

/// Refresh the `last` git section. `start` is never touched and a failed
/// probe leaves the record as it was.
pub fn refresh_git(meta: &mut ExpMeta, project_root: &Path) {
    let mut info = meta.git.clone().unwrap_or_default();
    if !refresh_git_info(&mut info, project_root) {
        return;
    }
    if let Some(commit) = info.last.as_ref().and_then(|s| s.commit.clone()) {
        meta.git_commit = Some(commit);
    }
    meta.git = Some(info);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quiet_opts() -> InitOptions {
        InitOptions {
            project: Some("p1".to_string()),
            probe_env: false,
            ..InitOptions::default()
        }
    }

    #[test]
    fn empty_config_records_no_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = init_exp(temp.path(), quiet_opts()).expect("init");
        assert_eq!(ctx.meta.config_path, None);
        assert!(ctx.config.is_empty());
        assert_eq!(std::fs::read_dir(&ctx.paths.artifacts).expect("read").count(), 0);
        assert_eq!(ctx.meta.status.as_deref(), Some(DEFAULT_STATUS));
        assert_eq!(ctx.meta.finished_at, None);
    }

    #[test]
    fn inline_config_is_snapshotted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = json!({"lr": 0.001}).as_object().cloned().expect("object");
        let ctx = init_exp(
            temp.path(),
            InitOptions {
                config: config.clone().into(),
                ..quiet_opts()
            },
        )
        .expect("init");
        assert_eq!(ctx.meta.config_path.as_deref(), Some("artifacts/config.yaml"));
        let snapshot = ctx.paths.root.join("artifacts/config.yaml");
        let reloaded = load_config(&snapshot.into()).expect("reload");
        assert_eq!(reloaded, config);
    }

    #[test]
    fn unsupported_config_fails_before_record_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = init_exp(
            temp.path(),
            InitOptions {
                exp_id: Some("bad-config".to_string()),
                config: ConfigSource::File(PathBuf::from("missing.yaml")),
                ..quiet_opts()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ExpboxError::ConfigInvalid { .. }), "{err}");
        assert!(!temp.path().join("results/bad-config").exists());
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = init_exp(
            temp.path(),
            InitOptions {
                exp_id: Some("a/b".to_string()),
                ..quiet_opts()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ExpboxError::InvalidId(_)), "{err}");
    }

    #[test]
    fn project_defaults_to_directory_name() {
        assert_eq!(default_project_name(Path::new("/work/my-proj")), "my-proj");
    }

    #[test]
    fn load_missing_record_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_exp(temp.path(), "nope", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ExpboxError::RecordNotFound { .. }), "{err}");
        assert!(!temp.path().join("results/nope").exists());
    }

    #[test]
    fn save_syncs_backend_name_and_sets_finished_at() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = init_exp(
            temp.path(),
            InitOptions {
                logger: LoggerBackend::File,
                ..quiet_opts()
            },
        )
        .expect("init");
        let id = ctx.exp_id.clone();
        drop(ctx);

        let mut resumed = load_exp(temp.path(), &id, &LoadOptions::default()).expect("load");
        assert_eq!(resumed.meta.logger_backend, "file");
        let outcome = save_exp(
            &mut resumed,
            &SaveOptions {
                status: Some("done".to_string()),
                update_git: false,
                ..SaveOptions::default()
            },
        )
        .expect("save");
        assert!(outcome.index_written);
        assert!(outcome.summary.contains("status=done"), "{}", outcome.summary);

        ctx = load_exp(temp.path(), &id, &LoadOptions::default()).expect("reload");
        assert_eq!(ctx.meta.logger_backend, "none");
        assert_eq!(ctx.meta.status.as_deref(), Some("done"));
        let finished = ctx.meta.finished_at.expect("finished_at");
        assert!(finished > ctx.meta.created_at);
    }
}
