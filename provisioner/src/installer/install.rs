//! Idempotent prerequisite installation

use tracing::{info, warn};

use crate::config::settings::Settings;
use crate::errors::{CommandFailure, ProvisionError};
use crate::exec::command::CommandSpec;
use crate::exec::runner::CommandRunner;
use crate::platform::detect::{CapabilityDescriptor, Prerequisite};
use crate::platform::strategy::{PackageStrategy, RuntimeInstall};
use crate::trace;

/// What an install pass changed on the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// System packages installed by the package manager
    pub packages: Vec<String>,

    /// Runtime install outcome, `None` when it was already present
    pub runtime: Option<RuntimeInstall>,

    /// Whether the supervisor was installed
    pub supervisor: bool,
}

impl InstallReport {
    /// Nothing was installed
    pub fn is_noop(&self) -> bool {
        self.packages.is_empty() && self.runtime.is_none() && !self.supervisor
    }
}

/// Install whatever the descriptor reports missing.
///
/// Every category is checked first and left alone when present, so a second pass against the
/// same host installs nothing.
pub async fn install(
    runner: &dyn CommandRunner,
    descriptor: &CapabilityDescriptor,
    settings: &Settings,
) -> Result<InstallReport, ProvisionError> {
    let mut report = InstallReport::default();

    if !descriptor.installation_required() {
        info!("No installation required");
        return Ok(report);
    }

    let strategy = descriptor.strategy;

    // Bootstrap packages
    let mut missing = Vec::new();
    for package in strategy.bootstrap_packages(descriptor.db_client) {
        if !strategy.is_installed(runner, package).await? {
            missing.push(package);
        }
    }
    if missing.is_empty() {
        info!("Bootstrap packages already installed");
    } else {
        if strategy == PackageStrategy::Apt {
            strategy.update_index(runner, descriptor.elevate).await?;
        }
        strategy.install(runner, &missing, descriptor.elevate).await?;
        report.packages = missing.iter().map(|p| p.to_string()).collect();
    }

    // Runtime
    let major = settings.node_major();
    if descriptor.runtime {
        check_runtime_version(runner, major).await?;
    } else {
        info!("Installing Node.js {}", major);
        let outcome = strategy.install_runtime(runner, major, descriptor.elevate).await?;
        verify_present(runner, Prerequisite::Runtime, &format!("install Node.js {}", major)).await?;
        report.runtime = Some(outcome);
    }

    // Process supervisor
    if descriptor.supervisor {
        info!("pm2 already installed");
    } else {
        let spec = CommandSpec::new("npm")
            .args(["install", "-g", "pm2"])
            .elevated(descriptor.elevate);
        info!("Installing pm2");
        runner
            .run(&spec)
            .await?
            .check(&spec, trace!())
            .map_err(ProvisionError::InstallError)?;
        verify_present(runner, Prerequisite::Supervisor, &spec.to_string()).await?;
        report.supervisor = true;
    }

    if !descriptor.db_client && !runner.has_binary(Prerequisite::DatabaseClient.binary()).await {
        // Homebrew's mysql-client is keg-only and stays off PATH
        warn!("MySQL client installed but not on PATH; database inspection may be skipped");
    }

    Ok(report)
}

async fn check_runtime_version(
    runner: &dyn CommandRunner,
    major: &str,
) -> Result<(), ProvisionError> {
    let out = runner.run(&CommandSpec::new("node").arg("--version")).await?;
    let installed = out.stdout.trim();
    match installed_major(installed) {
        Some(found) if found == major => {
            info!("Node.js {} already installed", installed);
        }
        Some(_) => {
            warn!(
                "Node.js {} is installed but {} was requested; keeping the existing runtime",
                installed, major
            );
        }
        None => {
            warn!("Could not determine the installed Node.js version ({:?})", installed);
        }
    }
    Ok(())
}

fn installed_major(version: &str) -> Option<&str> {
    let version = version.trim().trim_start_matches('v');
    let major = version.split('.').next()?;
    if !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()) {
        Some(major)
    } else {
        None
    }
}

async fn verify_present(
    runner: &dyn CommandRunner,
    prerequisite: Prerequisite,
    operation: &str,
) -> Result<(), ProvisionError> {
    if runner.has_binary(prerequisite.binary()).await {
        return Ok(());
    }
    Err(ProvisionError::InstallError(CommandFailure {
        operation: operation.to_string(),
        status: 1,
        location: trace!(),
        detail: Some(format!("{} still missing after install", prerequisite)),
    }))
}
