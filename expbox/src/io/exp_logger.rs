//! Experiment logger backends: scalar metrics and file artifacts.
//!
//! This is product output written into the experiment box, not diagnostics
//! (see [`crate::logging`] for those). The set of backends is closed:
//!
//! - [`LoggerBackend::None`] discards everything;
//! - [`LoggerBackend::File`] appends JSON lines to `logs/metrics.jsonl` and
//!   copies artifacts into `artifacts/`.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ExpboxError, Result};
use crate::io::layout::ExpPaths;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggerBackend {
    #[default]
    None,
    File,
}

impl LoggerBackend {
    /// Tag stored in `meta.json`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
        }
    }
}

impl FromStr for LoggerBackend {
    type Err = ExpboxError;

    /// Case-insensitive; `""` and `"null"` are aliases of `"none"`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "null" => Ok(Self::None),
            "file" => Ok(Self::File),
            _ => Err(ExpboxError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for LoggerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger attached to an experiment context.
#[derive(Debug)]
pub enum ExpLogger {
    Null,
    File(FileLogger),
}

impl ExpLogger {
    pub fn build(backend: LoggerBackend, paths: &ExpPaths) -> Result<Self> {
        debug!(backend = %backend, root = %paths.root.display(), "building logger");
        match backend {
            LoggerBackend::None => Ok(Self::Null),
            LoggerBackend::File => Ok(Self::File(FileLogger::open(
                &paths.logs,
                &paths.artifacts,
            )?)),
        }
    }

    pub fn backend(&self) -> LoggerBackend {
        match self {
            Self::Null => LoggerBackend::None,
            Self::File(_) => LoggerBackend::File,
        }
    }

    /// Record scalar metrics, optionally tagged with a step.
    pub fn log_metrics<I, K, V>(&mut self, step: Option<u64>, metrics: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        match self {
            Self::Null => Ok(()),
            Self::File(file) => {
                let entry = metrics
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect();
                file.write_entry(step, entry)
            }
        }
    }

    /// Record an artifact; returns where it was copied, if anywhere.
    pub fn log_artifact(&mut self, src: &Path, name: Option<&str>) -> Result<Option<PathBuf>> {
        match self {
            Self::Null => Ok(None),
            Self::File(file) => file.copy_artifact(src, name).map(Some),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            Self::Null => Ok(()),
            Self::File(file) => file.close(),
        }
    }
}

/// JSON-lines metrics writer plus artifact copier.
#[derive(Debug)]
pub struct FileLogger {
    metrics_path: PathBuf,
    artifacts_dir: PathBuf,
    file: Option<File>,
}

impl FileLogger {
    /// Open `logs_dir/metrics.jsonl` for appending.
    pub fn open(logs_dir: &Path, artifacts_dir: &Path) -> Result<Self> {
        let metrics_path = logs_dir.join("metrics.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&metrics_path)
            .map_err(|err| {
                ExpboxError::persistence(format!("open {}", metrics_path.display()), err)
            })?;
        Ok(Self {
            metrics_path,
            artifacts_dir: artifacts_dir.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }

    /// Append one line and flush it before returning.
    fn write_entry(&mut self, step: Option<u64>, mut entry: Map<String, Value>) -> Result<()> {
        if let Some(step) = step {
            entry.insert("step".to_string(), Value::from(step));
        }
        let context = || format!("append {}", self.metrics_path.display());
        let Some(file) = self.file.as_mut() else {
            return Err(ExpboxError::persistence(context(), "metrics stream is closed"));
        };
        let mut line = serde_json::to_string(&entry)
            .map_err(|err| ExpboxError::persistence(context(), err))?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|err| ExpboxError::persistence(context(), err))
    }

    /// Copy `src` byte-for-byte into the artifacts directory, keeping its
    /// permissions and modification time.
    fn copy_artifact(&self, src: &Path, name: Option<&str>) -> Result<PathBuf> {
        if !src.is_file() {
            return Err(ExpboxError::ArtifactMissing {
                path: src.to_path_buf(),
            });
        }
        let file_name = match name {
            Some(name) => name.into(),
            None => src
                .file_name()
                .map(|n| n.to_os_string())
                .ok_or_else(|| ExpboxError::ArtifactMissing {
                    path: src.to_path_buf(),
                })?,
        };
        let dst = self.artifacts_dir.join(file_name);
        let context = || format!("copy {} -> {}", src.display(), dst.display());
        fs::copy(src, &dst).map_err(|err| ExpboxError::persistence(context(), err))?;
        let modified = fs::metadata(src)
            .and_then(|meta| meta.modified())
            .map_err(|err| ExpboxError::persistence(context(), err))?;
        File::options()
            .write(true)
            .open(&dst)
            .and_then(|f| f.set_modified(modified))
            .map_err(|err| ExpboxError::persistence(context(), err))?;
        debug!(dst = %dst.display(), "artifact copied");
        Ok(dst)
    }

    /// Release the file handle. Flush failures are logged, never returned.
    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take()
            && let Err(err) = file.flush().and_then(|()| file.sync_all())
        {
            warn!(path = %self.metrics_path.display(), err = %err, "metrics close failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(temp: &Path) -> ExpPaths {
        ExpPaths::create(temp.join("box")).expect("paths")
    }

    #[test]
    fn backend_tags_parse_case_insensitively() {
        assert_eq!("FILE".parse::<LoggerBackend>().expect("file"), LoggerBackend::File);
        assert_eq!("".parse::<LoggerBackend>().expect("empty"), LoggerBackend::None);
        assert_eq!("null".parse::<LoggerBackend>().expect("null"), LoggerBackend::None);
        let err = "wandb".parse::<LoggerBackend>().unwrap_err();
        assert!(err.to_string().contains("wandb"), "{err}");
    }

    #[test]
    fn null_logger_does_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths(temp.path());
        let dummy = temp.path().join("dummy.txt");
        fs::write(&dummy, "hello").expect("write");

        let mut logger = ExpLogger::build(LoggerBackend::None, &paths).expect("build");
        logger.log_metrics(Some(0), [("loss", 1.0)]).expect("metrics");
        assert_eq!(logger.log_artifact(&dummy, None).expect("artifact"), None);
        logger.close().expect("close");

        assert!(!paths.metrics_path().exists());
        assert!(!paths.artifacts.join("dummy.txt").exists());
    }

    #[test]
    fn file_logger_writes_metrics_and_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths(temp.path());
        let mut logger = ExpLogger::build(LoggerBackend::File, &paths).expect("build");

        logger.log_metrics(Some(1), [("loss", 0.5)]).expect("metrics 1");
        logger
            .log_metrics(Some(2), [("loss", 0.3), ("acc", 0.8)])
            .expect("metrics 2");
        logger
            .log_metrics(None, [("note", Value::from("eval"))])
            .expect("metrics 3");

        let src = temp.path().join("model.pt");
        fs::write(&src, b"dummy-model").expect("write model");
        let copied = logger.log_artifact(&src, None).expect("artifact");
        let renamed = logger.log_artifact(&src, Some("best.pt")).expect("renamed");
        logger.close().expect("close");

        let text = fs::read_to_string(paths.metrics_path()).expect("metrics");
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["step"], 1);
        assert_eq!(lines[0]["loss"], 0.5);
        assert_eq!(lines[1]["acc"], 0.8);
        assert!(lines[2].get("step").is_none());

        assert_eq!(copied, Some(paths.artifacts.join("model.pt")));
        assert_eq!(renamed, Some(paths.artifacts.join("best.pt")));
        assert_eq!(fs::read(paths.artifacts.join("model.pt")).expect("read"), b"dummy-model");

        let src_mtime = fs::metadata(&src).and_then(|m| m.modified()).expect("src mtime");
        let dst_mtime = fs::metadata(paths.artifacts.join("best.pt"))
            .and_then(|m| m.modified())
            .expect("dst mtime");
        assert_eq!(src_mtime, dst_mtime);
    }

    #[test]
    fn missing_artifact_propagates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths(temp.path());
        let mut logger = ExpLogger::build(LoggerBackend::File, &paths).expect("build");
        let err = logger
            .log_artifact(&temp.path().join("nope.bin"), None)
            .unwrap_err();
        assert!(matches!(err, ExpboxError::ArtifactMissing { .. }), "{err}");
    }

    #[test]
    fn metrics_append_across_reopen() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths(temp.path());
        for step in 0..2u64 {
            let mut logger = ExpLogger::build(LoggerBackend::File, &paths).expect("build");
            logger.log_metrics(Some(step), [("loss", 1.0)]).expect("metrics");
            logger.close().expect("close");
        }
        let text = fs::read_to_string(paths.metrics_path()).expect("metrics");
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn writing_after_close_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths(temp.path());
        let mut logger = ExpLogger::build(LoggerBackend::File, &paths).expect("build");
        logger.close().expect("close");
        logger.close().expect("close twice");
        assert!(logger.log_metrics(Some(1), [("loss", 1.0)]).is_err());
    }
}
