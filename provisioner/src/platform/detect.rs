//! Platform and capability detection

use std::fmt;

use sysinfo::System;
use tracing::{info, warn};

use crate::errors::ProvisionError;
use crate::exec::command::CommandSpec;
use crate::exec::runner::CommandRunner;
use crate::platform::strategy::PackageStrategy;

/// Operating system family of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Linux,
    MacOs,
    Other,
}

impl HostOs {
    /// The OS this binary was built for
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => HostOs::Linux,
            "macos" => HostOs::MacOs,
            _ => HostOs::Other,
        }
    }
}

/// A binary the deployment cannot run without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    Runtime,
    Supervisor,
    DatabaseClient,
}

impl Prerequisite {
    pub const ALL: [Prerequisite; 3] = [
        Prerequisite::Runtime,
        Prerequisite::Supervisor,
        Prerequisite::DatabaseClient,
    ];

    /// Binary probed to decide presence
    pub fn binary(&self) -> &'static str {
        match self {
            Prerequisite::Runtime => "node",
            Prerequisite::Supervisor => "pm2",
            Prerequisite::DatabaseClient => "mysql",
        }
    }
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Prerequisite::Runtime => "Node.js runtime",
            Prerequisite::Supervisor => "pm2 process supervisor",
            Prerequisite::DatabaseClient => "MySQL client",
        };
        write!(f, "{} ({})", name, self.binary())
    }
}

/// What the host offers, detected once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub host_os: HostOs,
    pub strategy: PackageStrategy,

    /// Prefix privileged commands with `sudo`
    pub elevate: bool,

    pub runtime: bool,
    pub supervisor: bool,
    pub db_client: bool,
}

impl CapabilityDescriptor {
    pub fn has(&self, prerequisite: Prerequisite) -> bool {
        match prerequisite {
            Prerequisite::Runtime => self.runtime,
            Prerequisite::Supervisor => self.supervisor,
            Prerequisite::DatabaseClient => self.db_client,
        }
    }

    pub fn missing(&self) -> Vec<Prerequisite> {
        Prerequisite::ALL
            .into_iter()
            .filter(|p| !self.has(*p))
            .collect()
    }

    /// False when nothing is missing and no package manager is needed
    pub fn installation_required(&self) -> bool {
        self.strategy != PackageStrategy::NoneDetected || !self.missing().is_empty()
    }
}

/// Probe the host.
///
/// Package managers are tried in priority order (apt, then Homebrew) and the first hit is used
/// exclusively. Without one, the host is only usable if every prerequisite already exists.
pub async fn detect(
    runner: &dyn CommandRunner,
    host_os: HostOs,
) -> Result<CapabilityDescriptor, ProvisionError> {
    info!("Detecting host platform: {}", describe_host());

    let strategy = if runner.has_binary("apt-get").await {
        PackageStrategy::Apt
    } else if runner.has_binary("brew").await {
        PackageStrategy::Brew
    } else {
        PackageStrategy::NoneDetected
    };

    let descriptor = CapabilityDescriptor {
        host_os,
        strategy,
        elevate: needs_elevation(runner, strategy).await?,
        runtime: runner.has_binary(Prerequisite::Runtime.binary()).await,
        supervisor: runner.has_binary(Prerequisite::Supervisor.binary()).await,
        db_client: runner.has_binary(Prerequisite::DatabaseClient.binary()).await,
    };

    let missing = descriptor.missing();
    if strategy == PackageStrategy::NoneDetected {
        if missing.is_empty() {
            info!("No package manager found, all prerequisites present: no installation required");
        } else {
            let guidance = remediation(host_os, &missing);
            for line in &guidance {
                warn!("{}", line);
            }
            return Err(ProvisionError::UnsupportedPlatform(guidance.join(" ")));
        }
    }

    info!(
        "Package manager: {}, runtime: {}, supervisor: {}, database client: {}",
        strategy.name(),
        descriptor.runtime,
        descriptor.supervisor,
        descriptor.db_client
    );
    Ok(descriptor)
}

async fn needs_elevation(
    runner: &dyn CommandRunner,
    strategy: PackageStrategy,
) -> Result<bool, ProvisionError> {
    // Homebrew refuses to run as root; only apt needs privileges
    if strategy != PackageStrategy::Apt {
        return Ok(false);
    }
    let out = runner.run(&CommandSpec::new("id").arg("-u")).await?;
    if out.is_success() && out.stdout.trim() == "0" {
        return Ok(false);
    }
    if runner.has_binary("sudo").await {
        return Ok(true);
    }
    warn!("Not running as root and sudo is unavailable; privileged steps may fail");
    Ok(false)
}

/// Guidance for a host with missing prerequisites and no package manager
pub fn remediation(host_os: HostOs, missing: &[Prerequisite]) -> Vec<String> {
    let list = missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![format!("Missing prerequisites: {}.", list)];
    match host_os {
        HostOs::MacOs => {
            lines.push(
                "Homebrew was not found. Install it from https://brew.sh and re-run.".to_string(),
            );
        }
        HostOs::Linux | HostOs::Other => {
            lines.push(
                "No supported package manager (apt-get) was found. Use a Debian/Ubuntu host \
                 or install the missing binaries manually and re-run."
                    .to_string(),
            );
        }
    }
    lines
}

fn describe_host() -> String {
    let os = System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string());
    match System::host_name() {
        Some(host) => format!("{} on {}", os, host),
        None => os,
    }
}
