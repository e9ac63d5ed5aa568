//! pm2 process lifecycle
//!
//! Processes are started in the pm2 daemon of the application user, the same daemon whose saved
//! process list boot persistence restores.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::settings::Settings;
use crate::deploy::artifacts::{chown, DeploymentTarget};
use crate::errors::ProvisionError;
use crate::exec::command::CommandSpec;
use crate::exec::runner::CommandRunner;
use crate::platform::detect::CapabilityDescriptor;
use crate::supervisor::manifest::SupervisorManifest;
use crate::supervisor::startup::user_home;
use crate::trace;

/// What the supervisor was left running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub manifest: PathBuf,
    pub processes: Vec<String>,

    /// pm2 state directory holding the saved process list
    pub pm2_home: PathBuf,
}

/// The application user's pm2 daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pm2Daemon {
    pub user: String,
    pub pm2_home: PathBuf,

    /// The invoking user is someone else
    pub switch_user: bool,
}

impl Pm2Daemon {
    /// Locate the daemon for `APP_USER`, under the home boot persistence registers
    pub async fn resolve(
        runner: &dyn CommandRunner,
        settings: &Settings,
        descriptor: &CapabilityDescriptor,
    ) -> Self {
        let user = settings.app_user.clone();
        let pm2_home = user_home(settings, descriptor.host_os).join(".pm2");

        let probe = CommandSpec::new("id").arg("-un");
        let switch_user = match runner.run(&probe).await {
            Ok(out) if out.is_success() => out.stdout.trim() != user,
            Ok(out) => {
                warn!("Could not determine the invoking user: {}", out.stderr.trim());
                false
            }
            Err(e) => {
                warn!("Could not determine the invoking user: {}", e);
                false
            }
        };
        debug!("pm2 daemon of {} at {}", user, pm2_home.display());

        Self {
            user,
            pm2_home,
            switch_user,
        }
    }

    /// A `pm2` invocation against this daemon
    pub fn command(&self) -> CommandSpec {
        let spec = CommandSpec::new("pm2").env("PM2_HOME", self.pm2_home.to_string_lossy());
        if self.switch_user {
            spec.run_as(&self.user)
        } else {
            spec
        }
    }
}

/// Write the manifest, replace the running processes with it and persist the process list
pub async fn configure(
    runner: &dyn CommandRunner,
    settings: &Settings,
    descriptor: &CapabilityDescriptor,
    target: &DeploymentTarget,
) -> Result<SupervisorReport, ProvisionError> {
    let manifest = SupervisorManifest::for_target(target, settings);
    let file = settings.layout().manifest_file();
    manifest.write(&file).await?;
    hand_over(runner, file.path(), &settings.app_user, descriptor.elevate).await?;
    info!("Wrote supervisor manifest {}", file.path().display());

    let daemon = Pm2Daemon::resolve(runner, settings, descriptor).await;
    for name in manifest.names() {
        delete(runner, &daemon, name).await?;
    }

    let start = daemon.command().arg("start").arg(file.path().to_string_lossy());
    info!("Starting {} as {}", manifest.names().join(", "), daemon.user);
    runner
        .run(&start)
        .await?
        .check(&start, trace!())
        .map_err(ProvisionError::SupervisorError)?;

    let save = daemon.command().arg("save");
    runner
        .run(&save)
        .await?
        .check(&save, trace!())
        .map_err(ProvisionError::SupervisorError)?;
    info!("Process list saved to {}", daemon.pm2_home.display());

    Ok(SupervisorReport {
        manifest: file.path().to_path_buf(),
        processes: manifest.names().into_iter().map(String::from).collect(),
        pm2_home: daemon.pm2_home,
    })
}

/// The manifest is written after the tree changed owner
async fn hand_over(
    runner: &dyn CommandRunner,
    path: &Path,
    user: &str,
    elevate: bool,
) -> Result<(), ProvisionError> {
    let spec = chown(path, user, false, elevate);
    runner
        .run(&spec)
        .await?
        .check(&spec, trace!())
        .map_err(ProvisionError::SupervisorError)?;
    Ok(())
}

async fn delete(
    runner: &dyn CommandRunner,
    daemon: &Pm2Daemon,
    name: &str,
) -> Result<(), ProvisionError> {
    let spec = daemon.command().args(["delete", name]);
    let out = runner.run(&spec).await?;
    if out.is_success() {
        debug!("Removed previous {} process", name);
        return Ok(());
    }
    if is_not_found(&out.combined()) {
        debug!("No previous {} process", name);
        return Ok(());
    }
    out.check(&spec, trace!())
        .map(|_| ())
        .map_err(ProvisionError::SupervisorError)
}

fn is_not_found(output: &str) -> bool {
    output.to_lowercase().contains("not found")
}
