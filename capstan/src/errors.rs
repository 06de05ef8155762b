//! Error types for capstan

use thiserror::Error;

/// Main error type for capstan
#[derive(Error, Debug)]
pub enum CapstanError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A local or remote command exited non-zero or could not be spawned.
    /// Carries the trimmed stderr of the command.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Source cache operation failed; fatal for the whole run.
    #[error("Sync error: {0}")]
    SyncError(String),

    /// Stage, shared-link or post-stage hook failure.
    #[error("Stage error: {0}")]
    StageError(String),

    #[error("Activation error: {0}")]
    ActivationError(String),

    #[error("Prune error: {0}")]
    PruneError(String),

    #[error("Connection error: {0}")]
    ConnectError(String),

    #[error("Distribution error: {0}")]
    DistributionError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CapstanError {
    /// Whether the release directory of a failed host has to be removed.
    ///
    /// Only failures before a completed activation qualify. A failed
    /// activation leaves `current` on the previous release, so a rollback
    /// never has to touch the `current` symlink.
    pub fn needs_rollback(&self) -> bool {
        matches!(
            self,
            CapstanError::StageError(_) | CapstanError::ActivationError(_)
        )
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            CapstanError::IoError(e) => e.to_string(),
            CapstanError::JsonError(e) => e.to_string(),
            CapstanError::ConfigError(m)
            | CapstanError::ExecutionError(m)
            | CapstanError::SyncError(m)
            | CapstanError::StageError(m)
            | CapstanError::ActivationError(m)
            | CapstanError::PruneError(m)
            | CapstanError::ConnectError(m)
            | CapstanError::DistributionError(m)
            | CapstanError::StateError(m)
            | CapstanError::Internal(m) => m.clone(),
        }
    }
}

impl From<toml::de::Error> for CapstanError {
    fn from(err: toml::de::Error) -> Self {
        CapstanError::ConfigError(err.to_string())
    }
}

impl From<anyhow::Error> for CapstanError {
    fn from(err: anyhow::Error) -> Self {
        CapstanError::Internal(err.to_string())
    }
}
