//! Boot persistence

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::settings::Settings;
use crate::errors::ProvisionError;
use crate::exec::command::CommandSpec;
use crate::exec::runner::{run_tolerant, CommandRunner};
use crate::platform::detect::{CapabilityDescriptor, HostOs};
use crate::trace;

const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";

/// Init system pm2 can register itself with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    Launchd,
    Unsupported,
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitSystem::Systemd => write!(f, "systemd"),
            InitSystem::Launchd => write!(f, "launchd"),
            InitSystem::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Result of a boot persistence attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// `ENABLE_STARTUP` is off
    Disabled,

    Registered(InitSystem),

    /// No supported init system, skipped
    Unsupported,
}

pub async fn detect_init_system(runner: &dyn CommandRunner, host_os: HostOs) -> InitSystem {
    match host_os {
        HostOs::MacOs => InitSystem::Launchd,
        HostOs::Linux => {
            if runner.path_exists(Path::new(SYSTEMD_RUNTIME_DIR)).await {
                InitSystem::Systemd
            } else {
                InitSystem::Unsupported
            }
        }
        HostOs::Other => InitSystem::Unsupported,
    }
}

/// Register the supervisor to restore the saved process list at boot, when enabled
pub async fn register(
    runner: &dyn CommandRunner,
    settings: &Settings,
    descriptor: &CapabilityDescriptor,
) -> Result<BootOutcome, ProvisionError> {
    if !settings.enable_startup {
        info!("Boot persistence disabled");
        return Ok(BootOutcome::Disabled);
    }

    let init = detect_init_system(runner, descriptor.host_os).await;
    if init == InitSystem::Unsupported {
        warn!("No supported init system found, boot persistence skipped");
        return Ok(BootOutcome::Unsupported);
    }

    let home = user_home(settings, descriptor.host_os);
    let spec = CommandSpec::new("pm2")
        .arg("startup")
        .arg(init.to_string())
        .args(["-u", settings.app_user.as_str(), "--hp"])
        .arg(home.to_string_lossy())
        .elevated(descriptor.elevate);
    run_tolerant(runner, &spec)
        .await
        .check(&spec, trace!())
        .map_err(ProvisionError::BootPersistenceError)?;

    info!("Registered pm2 with {} for {}", init, settings.app_user);
    Ok(BootOutcome::Registered(init))
}

/// Home directory of the application user
pub fn user_home(settings: &Settings, host_os: HostOs) -> PathBuf {
    if let Some(home) = &settings.app_user_home {
        return home.clone();
    }
    match (host_os, settings.app_user.as_str()) {
        (HostOs::MacOs, user) => PathBuf::from("/Users").join(user),
        (_, "root") => PathBuf::from("/root"),
        (_, user) => PathBuf::from("/home").join(user),
    }
}
