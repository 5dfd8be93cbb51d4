//! Session handle: the "current experiment" for shorthand calls.
//!
//! A [`Session`] owns at most one [`ExpContext`] and mirrors its id to
//! `.expbox/active`. Nothing clears the pointer file; every accessor
//! re-validates that the record it points at still exists on disk.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::core::meta::ExpMeta;
use crate::error::{ExpboxError, Result};
use crate::io::active::{read_active, write_active};
use crate::io::config::ConfigMap;
use crate::io::exp_logger::ExpLogger;
use crate::io::layout::{ExpPaths, ProjectPaths};
use crate::io::settings::{ProjectSettings, load_settings};
use crate::lifecycle::{
    ExpContext, InitOptions, LoadOptions, SaveOptions, SaveOutcome, init_exp, load_exp, save_exp,
};

#[derive(Debug)]
pub struct Session {
    project: ProjectPaths,
    settings: ProjectSettings,
    current: Option<ExpContext>,
}

impl Session {
    /// Open a session, reading `.expbox/config.toml` when present.
    pub fn open(project_root: &Path) -> Result<Self> {
        let project = ProjectPaths::new(project_root);
        let settings = load_settings(&project.settings_path)?;
        Ok(Self::with_settings(project, settings))
    }

    pub fn with_settings(project: ProjectPaths, settings: ProjectSettings) -> Self {
        Self {
            project,
            settings,
            current: None,
        }
    }

    pub fn project_paths(&self) -> &ProjectPaths {
        &self.project
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    pub fn init_options(&self) -> InitOptions {
        InitOptions::from_settings(&self.settings)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::from_settings(&self.settings)
    }

    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            privacy: self.settings.index_privacy,
            ..SaveOptions::default()
        }
    }

    /// Create an experiment and make it current. With `activate`, also
    /// point `.expbox/active` at it.
    #[instrument(skip_all, fields(activate = activate))]
    pub fn init(&mut self, opts: InitOptions, activate: bool) -> Result<&mut ExpContext> {
        let ctx = init_exp(&self.project.project_root, opts)?;
        if activate {
            write_active(&self.project, &ctx.exp_id)?;
        }
        Ok(self.replace(ctx))
    }

    /// Resume `exp_id`, or the experiment named by the pointer file.
    ///
    /// Without an id and without a pointer this is `NoActiveExperiment`; a
    /// pointer to a record that is gone is `StaleActivePointer`.
    #[instrument(skip_all)]
    pub fn load(
        &mut self,
        exp_id: Option<&str>,
        opts: &LoadOptions,
        activate: bool,
    ) -> Result<&mut ExpContext> {
        let ctx = match exp_id {
            Some(id) => load_exp(&self.project.project_root, id, opts)?,
            None => {
                let id = read_active(&self.project)?;
                load_exp(&self.project.project_root, &id, opts).map_err(|err| match err {
                    ExpboxError::RecordNotFound { path } => ExpboxError::StaleActivePointer {
                        exp_id: id.clone(),
                        expected: path,
                    },
                    other => other,
                })?
            }
        };
        if activate {
            write_active(&self.project, &ctx.exp_id)?;
        }
        Ok(self.replace(ctx))
    }

    /// Checkpoint the current experiment.
    pub fn save(&mut self, opts: &SaveOptions) -> Result<SaveOutcome> {
        save_exp(self.active_mut()?, opts)
    }

    /// Drop the in-memory context. The pointer file is left alone.
    pub fn clear(&mut self) -> Option<ExpContext> {
        self.current.take()
    }

    /// The current context, re-validated against the filesystem.
    pub fn active(&self) -> Result<&ExpContext> {
        let ctx = self.current.as_ref().ok_or_else(|| ExpboxError::NoActiveExperiment {
            pointer: self.project.active_path.clone(),
        })?;
        revalidate(ctx)?;
        Ok(ctx)
    }

    pub fn active_mut(&mut self) -> Result<&mut ExpContext> {
        let pointer = self.project.active_path.clone();
        let ctx = self
            .current
            .as_mut()
            .ok_or(ExpboxError::NoActiveExperiment { pointer })?;
        revalidate(ctx)?;
        Ok(ctx)
    }

    pub fn exp_id(&self) -> Result<&str> {
        Ok(&self.active()?.exp_id)
    }

    pub fn project(&self) -> Result<&str> {
        Ok(&self.active()?.project)
    }

    pub fn paths(&self) -> Result<&ExpPaths> {
        Ok(&self.active()?.paths)
    }

    pub fn config(&self) -> Result<&ConfigMap> {
        Ok(&self.active()?.config)
    }

    pub fn meta(&self) -> Result<&ExpMeta> {
        Ok(&self.active()?.meta)
    }

    pub fn meta_mut(&mut self) -> Result<&mut ExpMeta> {
        Ok(&mut self.active_mut()?.meta)
    }

    pub fn logger_mut(&mut self) -> Result<&mut ExpLogger> {
        Ok(&mut self.active_mut()?.logger)
    }

    /// `extra.env_auto` of the current experiment; empty when absent.
    pub fn env_auto(&self) -> Result<Map<String, Value>> {
        Ok(self.active()?.env_auto().cloned().unwrap_or_default())
    }

    fn replace(&mut self, ctx: ExpContext) -> &mut ExpContext {
        if let Some(mut previous) = self.current.take()
            && let Err(err) = previous.logger.close()
        {
            debug!(exp_id = %previous.exp_id, err = %err, "closing replaced logger failed");
        }
        self.current.insert(ctx)
    }
}

fn revalidate(ctx: &ExpContext) -> Result<()> {
    let meta_path = ctx.paths.meta_path();
    if ctx.paths.root.is_dir() && meta_path.is_file() {
        return Ok(());
    }
    Err(ExpboxError::StaleActivePointer {
        exp_id: ctx.exp_id.clone(),
        expected: meta_path,
    })
}
