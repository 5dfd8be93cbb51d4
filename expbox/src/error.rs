//! Error taxonomy for experiment bookkeeping.
//!
//! Record, config and backend failures always surface to the caller. Probe
//! failures (git, environment, GPU) never reach this type: those helpers
//! return `Option` instead.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ExpboxError> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ExpboxError {
    #[error("meta.json not found: {}", path.display())]
    RecordNotFound { path: PathBuf },

    #[error("no active experiment (pointer file {} is missing)", pointer.display())]
    NoActiveExperiment { pointer: PathBuf },

    #[error("active experiment '{exp_id}' is stale: expected record at {}", expected.display())]
    StaleActivePointer { exp_id: String, expected: PathBuf },

    #[error("config error: {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("unsupported logger backend: {0:?}")]
    UnsupportedBackend(String),

    #[error("artifact does not exist: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("invalid experiment id {0:?}")]
    InvalidId(String),
}

impl ExpboxError {
    /// Wrap a filesystem or serialization failure with a short context label.
    pub fn persistence(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Persistence {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for every "the experiment you asked for is not there" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RecordNotFound { .. }
                | Self::NoActiveExperiment { .. }
                | Self::StaleActivePointer { .. }
        )
    }

    /// Multi-line remediation hint for not-found failures.
    pub fn hint(&self) -> Option<&'static str> {
        if self.is_not_found() {
            Some(
                "hint:\n  - start a fresh experiment:   expbox init --project <name>\n  - resume a specific one:      expbox load <exp_id>",
            )
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_class_covers_pointer_errors() {
        let missing = ExpboxError::RecordNotFound {
            path: PathBuf::from("results/x/meta.json"),
        };
        let no_active = ExpboxError::NoActiveExperiment {
            pointer: PathBuf::from(".expbox/active"),
        };
        let stale = ExpboxError::StaleActivePointer {
            exp_id: "x".to_string(),
            expected: PathBuf::from("results/x/meta.json"),
        };
        assert!(missing.is_not_found());
        assert!(no_active.is_not_found());
        assert!(stale.is_not_found());
        assert!(stale.hint().is_some());
        assert!(!ExpboxError::UnsupportedBackend("wandb".into()).is_not_found());
    }

    #[test]
    fn persistence_keeps_source_message() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ExpboxError::persistence("write meta.json", io);
        assert_eq!(err.to_string(), "write meta.json: denied");
    }
}
