//! Package manager strategies

use tracing::{info, warn};

use crate::errors::ProvisionError;
use crate::exec::command::CommandSpec;
use crate::exec::runner::CommandRunner;
use crate::trace;

/// The package manager selected for this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStrategy {
    /// Debian-family `apt-get`/`dpkg`
    Apt,

    /// macOS Homebrew
    Brew,

    /// No supported package manager on this host
    NoneDetected,
}

/// How the runtime ended up installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeInstall {
    /// The requested major version
    Pinned(String),

    /// Whatever version the package manager ships
    Unpinned,
}

impl PackageStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PackageStrategy::Apt => "apt",
            PackageStrategy::Brew => "brew",
            PackageStrategy::NoneDetected => "none",
        }
    }

    /// Packages every provisioned host needs before the runtime goes in
    pub fn bootstrap_packages(&self, db_client_present: bool) -> Vec<&'static str> {
        match self {
            PackageStrategy::Apt => {
                let mut packages = vec!["curl", "ca-certificates", "tar"];
                if !db_client_present {
                    packages.push("default-mysql-client");
                }
                packages
            }
            PackageStrategy::Brew if !db_client_present => vec!["mysql-client"],
            PackageStrategy::Brew | PackageStrategy::NoneDetected => Vec::new(),
        }
    }

    /// Is `package` installed according to the package manager?
    pub async fn is_installed(
        &self,
        runner: &dyn CommandRunner,
        package: &str,
    ) -> Result<bool, ProvisionError> {
        let spec = match self {
            PackageStrategy::Apt => CommandSpec::new("dpkg").args(["-s", package]),
            PackageStrategy::Brew => CommandSpec::new("brew").args(["list", "--versions", package]),
            PackageStrategy::NoneDetected => return Ok(false),
        };
        let out = runner.run(&spec).await?;
        // `brew list --versions` exits 0 with empty output for unknown formulae on some versions
        Ok(out.is_success() && !(self == &PackageStrategy::Brew && out.stdout.trim().is_empty()))
    }

    /// Refresh the package index
    pub async fn update_index(
        &self,
        runner: &dyn CommandRunner,
        elevate: bool,
    ) -> Result<(), ProvisionError> {
        let spec = match self {
            PackageStrategy::Apt => CommandSpec::new("apt-get").arg("update").elevated(elevate),
            PackageStrategy::Brew => CommandSpec::new("brew").arg("update"),
            PackageStrategy::NoneDetected => {
                return Err(self.unsupported("update the package index"))
            }
        };
        info!("Updating package index ({})", self.name());
        runner
            .run(&spec)
            .await?
            .check(&spec, trace!())
            .map_err(ProvisionError::InstallError)?;
        Ok(())
    }

    /// Install `packages` in a single transaction
    pub async fn install(
        &self,
        runner: &dyn CommandRunner,
        packages: &[&str],
        elevate: bool,
    ) -> Result<(), ProvisionError> {
        if packages.is_empty() {
            return Ok(());
        }
        let spec = match self {
            PackageStrategy::Apt => CommandSpec::new("apt-get")
                .args(["install", "-y"])
                .args(packages.iter().copied())
                .env("DEBIAN_FRONTEND", "noninteractive")
                .elevated(elevate),
            PackageStrategy::Brew => CommandSpec::new("brew")
                .arg("install")
                .args(packages.iter().copied()),
            PackageStrategy::NoneDetected => return Err(self.unsupported("install packages")),
        };
        info!("Installing packages with {}: {}", self.name(), packages.join(", "));
        runner
            .run(&spec)
            .await?
            .check(&spec, trace!())
            .map_err(ProvisionError::InstallError)?;
        Ok(())
    }

    /// Install the runtime at major version `major`.
    ///
    /// Apt pins through the NodeSource repository and fails if that fails. Brew tries the
    /// versioned formula and falls back to the unversioned one.
    pub async fn install_runtime(
        &self,
        runner: &dyn CommandRunner,
        major: &str,
        elevate: bool,
    ) -> Result<RuntimeInstall, ProvisionError> {
        match self {
            PackageStrategy::Apt => {
                let setup = CommandSpec::new("bash")
                    .args([
                        "-c".to_string(),
                        format!("curl -fsSL https://deb.nodesource.com/setup_{}.x | bash -", major),
                    ])
                    .elevated(elevate);
                info!("Adding NodeSource repository for Node.js {}", major);
                runner
                    .run(&setup)
                    .await?
                    .check(&setup, trace!())
                    .map_err(ProvisionError::InstallError)?;
                self.install(runner, &["nodejs"], elevate).await?;
                Ok(RuntimeInstall::Pinned(major.to_string()))
            }
            PackageStrategy::Brew => {
                let formula = format!("node@{}", major);
                let pinned = CommandSpec::new("brew").args(["install", formula.as_str()]);
                let out = runner.run(&pinned).await?;
                if out.is_success() {
                    // versioned formulae are keg-only
                    let link = CommandSpec::new("brew").args([
                        "link",
                        "--overwrite",
                        "--force",
                        formula.as_str(),
                    ]);
                    let linked = runner.run(&link).await?;
                    if !linked.is_success() {
                        warn!("Could not link {}: {}", formula, linked.combined().trim());
                    }
                    return Ok(RuntimeInstall::Pinned(major.to_string()));
                }

                warn!(
                    "Homebrew has no {} formula (status {}), falling back to unpinned node",
                    formula, out.status
                );
                self.install(runner, &["node"], elevate).await?;
                Ok(RuntimeInstall::Unpinned)
            }
            PackageStrategy::NoneDetected => Err(self.unsupported("install the runtime")),
        }
    }

    fn unsupported(&self, what: &str) -> ProvisionError {
        ProvisionError::UnsupportedPlatform(format!("no package manager available to {}", what))
    }
}
