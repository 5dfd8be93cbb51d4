//! Test-only helpers: a scratch git repository and quiet option presets.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::lifecycle::{InitOptions, SaveOptions};

/// Temporary git repository with one commit on `main`.
#[derive(Debug)]
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q", "-b", "main"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "expbox test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write_file("README.md", "scratch\n")?;
        repo.commit_all("initial commit")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])
    }

    /// Add an `origin` remote (never contacted).
    pub fn set_origin(&self, url: &str) -> Result<()> {
        self.git(&["remote", "add", "origin", url])
    }

    pub fn head(&self) -> Result<String> {
        let out = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.path())
            .output()
            .context("spawn git rev-parse")?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    pub fn git(&self, args: &[&str]) -> Result<()> {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// Init options with a fixed id and no environment probe.
pub fn init_opts(project: &str, exp_id: &str) -> InitOptions {
    InitOptions {
        project: Some(project.to_string()),
        exp_id: Some(exp_id.to_string()),
        probe_env: false,
        ..InitOptions::default()
    }
}

/// Save options that set a status.
pub fn save_status(status: &str) -> SaveOptions {
    SaveOptions {
        status: Some(status.to_string()),
        ..SaveOptions::default()
    }
}
