//! Failure reporter
//!
//! The one place a fatal step failure turns into a diagnostic and an exit status.

use std::fmt;

use colored::Colorize;
use tracing::error;

use crate::errors::ProvisionError;

/// A fatal failure caught at the pipeline boundary
#[derive(Debug)]
pub struct Fatal {
    /// Pipeline step that failed
    pub step: &'static str,

    /// Where the failure was raised (`file:line`)
    pub location: String,

    pub error: ProvisionError,
}

impl Fatal {
    pub fn new(step: &'static str, location: String, error: ProvisionError) -> Self {
        // A failed tool knows its own call site better than the pipeline does
        let location = error
            .command()
            .map(|c| c.location.clone())
            .unwrap_or(location);
        Self {
            step,
            location,
            error,
        }
    }

    /// Text of the operation that failed
    pub fn operation(&self) -> String {
        match self.error.command() {
            Some(c) => c.operation.clone(),
            None => self.step.to_string(),
        }
    }

    pub fn exit_status(&self) -> i32 {
        self.error.exit_status()
    }
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at {}: {}", self.step, self.location, self.error)
    }
}

/// Print the diagnostic for `fatal` and return the status to exit with
pub fn report_failure(fatal: &Fatal) -> i32 {
    let status = fatal.exit_status();

    error!(
        step = fatal.step,
        location = %fatal.location,
        status,
        "{}",
        fatal.error
    );

    eprintln!();
    eprintln!("{} {}", "Provisioning failed:".red().bold(), fatal.step);
    eprintln!("  {:<10} {}", "operation".bold(), fatal.operation());
    eprintln!("  {:<10} {}", "location".bold(), fatal.location);
    eprintln!("  {:<10} {}", "status".bold(), status);
    eprintln!("  {:<10} {}", "error".bold(), fatal.error);
    if let Some(detail) = fatal.error.command().and_then(|c| c.detail.as_deref()) {
        eprintln!("  {:<10} {}", "output".bold(), detail);
    }
    eprintln!("  {:<10} {}", "hint".yellow().bold(), hint(&fatal.error));

    status
}

/// Remediation hint for a fatal error
pub fn hint(error: &ProvisionError) -> &'static str {
    match error {
        ProvisionError::MissingSource(_) => {
            "Create deploy.env next to the provision binary or pass --config=<path>."
        }
        ProvisionError::MissingRequiredKey(_) => {
            "Add the setting to the configuration file or export it in the environment."
        }
        ProvisionError::InvalidSetting { .. } => "Correct the setting's value and re-run.",
        ProvisionError::UnsupportedPlatform(_) => {
            "Install the missing prerequisites manually, or run on a host with apt-get or Homebrew."
        }
        ProvisionError::InstallError(_) => {
            "Check network access and package manager locks, then re-run. \
             Installed packages are skipped."
        }
        ProvisionError::ExtractionError(_) | ProvisionError::ExtractionCommand(_) => {
            "Make sure both archives sit next to the configuration file \
             and are valid .tar.gz files."
        }
        ProvisionError::SupervisorError(_) => {
            "Inspect `pm2 logs` as APP_USER and check that the invoking user may sudo to it."
        }
        ProvisionError::LoggingError(_) => {
            "Check that the --log-file directory exists and is writable."
        }
        ProvisionError::IoError(_) => {
            "Check that the base directory is writable by the invoking user."
        }
        ProvisionError::MigrationError(_) | ProvisionError::BootPersistenceError(_) => {
            "Re-run once the reported warning is resolved."
        }
    }
}
