//! Soft-archive and stale-run sweeps. Both only ever checkpoint; no file is
//! deleted.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::index::Privacy;
use crate::core::meta::SUPERSEDED_BY_KEY;
use crate::error::Result;
use crate::export::iter_boxes;
use crate::io::layout::ProjectPaths;
use crate::io::meta_store::load_meta;
use crate::lifecycle::{LoadOptions, SaveOptions, SaveOutcome, load_exp, save_exp};

pub const ARCHIVED_STATUS: &str = "archived";
pub const STALE_STATUS: &str = "stale";
pub const STALE_NOTE: &str = "marked stale by sweep: run was never checkpointed";

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub status: String,
    /// Appended to the final note.
    pub reason: Option<String>,
    pub superseded_by: Option<String>,
    pub update_git: bool,
    pub privacy: Privacy,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            status: ARCHIVED_STATUS.to_string(),
            reason: None,
            superseded_by: None,
            update_git: false,
            privacy: Privacy::Safe,
        }
    }
}

/// Mark an experiment as no longer active and checkpoint it.
#[instrument(skip_all, fields(exp_id = %exp_id))]
pub fn archive_exp(
    project_root: &Path,
    results_root: &Path,
    exp_id: &str,
    opts: &ArchiveOptions,
) -> Result<SaveOutcome> {
    let load = LoadOptions {
        results_root: results_root.to_path_buf(),
        record_only: true,
        ..LoadOptions::default()
    };
    let mut ctx = load_exp(project_root, exp_id, &load)?;
    if let Some(reason) = &opts.reason {
        ctx.meta.append_final_note(reason);
    }
    if let Some(next) = &opts.superseded_by {
        ctx.meta
            .extra
            .insert(SUPERSEDED_BY_KEY.to_string(), Value::from(next.as_str()));
    }
    let outcome = save_exp(
        &mut ctx,
        &SaveOptions {
            status: Some(opts.status.clone()),
            final_note: None,
            update_git: opts.update_git,
            privacy: opts.privacy,
        },
    )?;
    info!(status = %opts.status, superseded_by = ?opts.superseded_by, "experiment archived");
    Ok(outcome)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Ids that were (or, in a dry run, would be) marked stale.
    pub stale: Vec<String>,
    /// Boxes that could not be read or checkpointed. The sweep moves on.
    pub failed: Vec<SweepFailure>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    /// Experiment id, or the box directory name when the record is unreadable.
    pub exp_id: String,
    pub error: String,
}

/// Mark every experiment that is still `running` and was never checkpointed
/// as stale. A dry run only reports.
///
/// Each box is handled on its own: a box that fails is recorded in
/// [`SweepReport::failed`] and the remaining boxes are still swept.
#[instrument(skip_all, fields(dry_run = dry_run))]
pub fn sweep_stale(
    project_root: &Path,
    results_root: &Path,
    dry_run: bool,
    privacy: Privacy,
) -> Result<SweepReport> {
    let project = ProjectPaths::new(project_root);
    let results_root = project.resolve(results_root);
    let mut report = SweepReport {
        dry_run,
        ..SweepReport::default()
    };

    for box_root in iter_boxes(&results_root)? {
        let meta = match load_meta(&box_root) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %box_root.display(), err = %err, "skipping unreadable box");
                report.failed.push(SweepFailure {
                    exp_id: box_name(&box_root),
                    error: err.to_string(),
                });
                continue;
            }
        };
        if !meta.is_abandoned() {
            continue;
        }
        debug!(exp_id = %meta.exp_id, "abandoned run found");
        if !dry_run && let Err(err) = mark_stale(&project, &results_root, &meta.exp_id, privacy) {
            warn!(exp_id = %meta.exp_id, err = %err, "could not mark run stale");
            report.failed.push(SweepFailure {
                exp_id: meta.exp_id,
                error: err.to_string(),
            });
            continue;
        }
        report.stale.push(meta.exp_id);
    }

    info!(
        count = report.stale.len(),
        failed = report.failed.len(),
        dry_run,
        "sweep finished"
    );
    Ok(report)
}

fn mark_stale(
    project: &ProjectPaths,
    results_root: &Path,
    exp_id: &str,
    privacy: Privacy,
) -> Result<()> {
    let load = LoadOptions {
        results_root: results_root.to_path_buf(),
        record_only: true,
        ..LoadOptions::default()
    };
    let mut ctx = load_exp(&project.project_root, exp_id, &load)?;
    ctx.meta.append_final_note(STALE_NOTE);
    save_exp(
        &mut ctx,
        &SaveOptions {
            status: Some(STALE_STATUS.to_string()),
            final_note: None,
            update_git: false,
            privacy,
        },
    )?;
    Ok(())
}

fn box_name(box_root: &Path) -> String {
    box_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| box_root.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{InitOptions, init_exp};

    fn create(root: &Path, id: &str) {
        init_exp(
            root,
            InitOptions {
                exp_id: Some(id.to_string()),
                project: Some("p".to_string()),
                probe_env: false,
                ..InitOptions::default()
            },
        )
        .expect("init");
    }

    #[test]
    fn archive_appends_reason_and_cross_reference() {
        let temp = tempfile::tempdir().expect("tempdir");
        create(temp.path(), "old");
        let opts = ArchiveOptions {
            reason: Some("bad seed".to_string()),
            superseded_by: Some("new".to_string()),
            ..ArchiveOptions::default()
        };
        archive_exp(temp.path(), Path::new("results"), "old", &opts).expect("archive");
        archive_exp(
            temp.path(),
            Path::new("results"),
            "old",
            &ArchiveOptions {
                reason: Some("superseded".to_string()),
                ..ArchiveOptions::default()
            },
        )
        .expect("archive again");

        let meta = load_meta(&temp.path().join("results/old")).expect("meta");
        assert_eq!(meta.status.as_deref(), Some(ARCHIVED_STATUS));
        assert_eq!(meta.final_note.as_deref(), Some("bad seed\nsuperseded"));
        assert_eq!(meta.superseded_by(), Some("new"));
        assert!(temp.path().join("results/old/artifacts").is_dir());
    }

    #[test]
    fn sweep_marks_only_abandoned_runs() {
        let temp = tempfile::tempdir().expect("tempdir");
        create(temp.path(), "abandoned");
        create(temp.path(), "finished");
        let mut ctx = crate::lifecycle::load_exp(
            temp.path(),
            "finished",
            &LoadOptions::default(),
        )
        .expect("load");
        save_exp(
            &mut ctx,
            &SaveOptions {
                update_git: false,
                ..SaveOptions::default()
            },
        )
        .expect("checkpoint");

        let dry = sweep_stale(temp.path(), Path::new("results"), true, Privacy::Safe)
            .expect("dry run");
        assert_eq!(dry.stale, vec!["abandoned".to_string()]);
        let untouched = load_meta(&temp.path().join("results/abandoned")).expect("meta");
        assert_eq!(untouched.status.as_deref(), Some("running"));
        assert_eq!(untouched.finished_at, None);

        let real = sweep_stale(temp.path(), Path::new("results"), false, Privacy::Safe)
            .expect("sweep");
        assert_eq!(real.stale, vec!["abandoned".to_string()]);
        let swept = load_meta(&temp.path().join("results/abandoned")).expect("meta");
        assert_eq!(swept.status.as_deref(), Some(STALE_STATUS));
        assert_eq!(swept.final_note.as_deref(), Some(STALE_NOTE));
        assert!(swept.finished_at.is_some());

        let again = sweep_stale(temp.path(), Path::new("results"), false, Privacy::Safe)
            .expect("sweep again");
        assert!(again.stale.is_empty());
        assert!(again.failed.is_empty());
    }

    fn create_with_config(root: &Path, id: &str) {
        init_exp(
            root,
            InitOptions {
                exp_id: Some(id.to_string()),
                project: Some("p".to_string()),
                config: crate::io::config::ConfigSource::Inline(
                    serde_json::json!({"lr": 0.1})
                        .as_object()
                        .cloned()
                        .expect("object"),
                ),
                probe_env: false,
                ..InitOptions::default()
            },
        )
        .expect("init");
    }

    #[test]
    fn sweep_does_not_need_config_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        create_with_config(temp.path(), "a-no-snapshot");
        create(temp.path(), "b-fine");
        std::fs::remove_file(temp.path().join("results/a-no-snapshot/artifacts/config.yaml"))
            .expect("remove snapshot");

        let report = sweep_stale(temp.path(), Path::new("results"), false, Privacy::Safe)
            .expect("sweep");
        assert_eq!(
            report.stale,
            vec!["a-no-snapshot".to_string(), "b-fine".to_string()]
        );
        assert!(report.failed.is_empty());
        for id in ["a-no-snapshot", "b-fine"] {
            let meta = load_meta(&temp.path().join("results").join(id)).expect("meta");
            assert_eq!(meta.status.as_deref(), Some(STALE_STATUS), "{id}");
        }
        // The record keeps pointing at the snapshot it was created with.
        let meta = load_meta(&temp.path().join("results/a-no-snapshot")).expect("meta");
        assert_eq!(meta.config_path.as_deref(), Some("artifacts/config.yaml"));
    }

    #[test]
    fn failing_box_does_not_stop_the_sweep() {
        let temp = tempfile::tempdir().expect("tempdir");
        create(temp.path(), "a-broken");
        create(temp.path(), "b-fine");
        create(temp.path(), "c-corrupt");
        // A file where the logs directory belongs makes the checkpoint fail.
        let broken = temp.path().join("results/a-broken");
        std::fs::remove_dir_all(broken.join("logs")).expect("remove logs");
        std::fs::write(broken.join("logs"), "not a directory").expect("block logs");
        std::fs::write(temp.path().join("results/c-corrupt/meta.json"), "{not json")
            .expect("corrupt");

        let dry = sweep_stale(temp.path(), Path::new("results"), true, Privacy::Safe)
            .expect("dry run");
        assert_eq!(dry.stale, vec!["a-broken".to_string(), "b-fine".to_string()]);

        let report = sweep_stale(temp.path(), Path::new("results"), false, Privacy::Safe)
            .expect("sweep");
        assert_eq!(report.stale, vec!["b-fine".to_string()]);
        let failed: Vec<&str> = report.failed.iter().map(|f| f.exp_id.as_str()).collect();
        assert_eq!(failed, vec!["a-broken", "c-corrupt"]);
        let still_running = load_meta(&broken).expect("meta");
        assert_eq!(still_running.status.as_deref(), Some("running"));
        let fine = load_meta(&temp.path().join("results/b-fine")).expect("meta");
        assert_eq!(fine.status.as_deref(), Some(STALE_STATUS));
    }

    #[test]
    fn archive_does_not_need_config_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        create_with_config(temp.path(), "old");
        std::fs::remove_file(temp.path().join("results/old/artifacts/config.yaml"))
            .expect("remove snapshot");
        archive_exp(
            temp.path(),
            Path::new("results"),
            "old",
            &ArchiveOptions::default(),
        )
        .expect("archive");
        let meta = load_meta(&temp.path().join("results/old")).expect("meta");
        assert_eq!(meta.status.as_deref(), Some(ARCHIVED_STATUS));
    }
}
