//! Error types for the provisioner

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// How a step failure affects the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the run
    Fatal,

    /// Report a warning and keep going
    Degraded,
}

/// A subordinate tool that exited unsuccessfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// The command line that failed (no environment, no stdin)
    pub operation: String,

    /// Exit status of the tool
    pub status: i32,

    /// Call site that issued the command (`file:line`)
    pub location: String,

    /// Last line of the tool's diagnostic output, if any
    pub detail: Option<String>,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` exited with status {}", self.operation, self.status)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Database problems. None of these stop the run.
#[derive(Error, Debug)]
pub enum MigrationFailure {
    #[error("could not inspect the database, table count unknown: {0}")]
    ConnectivityUnknown(String),

    #[error("database bootstrap failed: {0}")]
    BootstrapFailed(CommandFailure),

    #[error("backup tool unavailable: {0}")]
    BackupUnavailable(String),

    #[error("backup failed, schema push skipped: {0}")]
    BackupFailed(String),

    #[error("schema push failed: {0}")]
    ApplyFailed(CommandFailure),
}

/// Main error type for the provisioner
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration source not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("Required setting {0} is missing or empty")]
    MissingRequiredKey(String),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Install error: {0}")]
    InstallError(CommandFailure),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Extraction error: {0}")]
    ExtractionCommand(CommandFailure),

    #[error("Migration error: {0}")]
    MigrationError(#[from] MigrationFailure),

    #[error("Supervisor error: {0}")]
    SupervisorError(CommandFailure),

    #[error("Boot persistence error: {0}")]
    BootPersistenceError(CommandFailure),

    #[error("Logging error: {0}")]
    LoggingError(String),
}

impl ProvisionError {
    /// Whether this failure halts the pipeline
    pub fn severity(&self) -> Severity {
        match self {
            ProvisionError::MigrationError(_) | ProvisionError::BootPersistenceError(_) => {
                Severity::Degraded
            }
            _ => Severity::Fatal,
        }
    }

    /// The failed tool invocation behind this error, if there is one
    pub fn command(&self) -> Option<&CommandFailure> {
        match self {
            ProvisionError::InstallError(c)
            | ProvisionError::ExtractionCommand(c)
            | ProvisionError::SupervisorError(c)
            | ProvisionError::BootPersistenceError(c) => Some(c),
            ProvisionError::MigrationError(MigrationFailure::ApplyFailed(c))
            | ProvisionError::MigrationError(MigrationFailure::BootstrapFailed(c)) => Some(c),
            _ => None,
        }
    }

    /// Exit status to propagate. Errors raised without a tool behind them map to 1.
    pub fn exit_status(&self) -> i32 {
        match self.command() {
            Some(c) if c.status != 0 => c.status,
            _ => 1,
        }
    }
}
