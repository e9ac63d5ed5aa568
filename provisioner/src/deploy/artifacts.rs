//! Artifact deployment

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::settings::{ArtifactSettings, Settings};
use crate::deploy::envfile::{backend_env, frontend_env, EnvFile};
use crate::errors::ProvisionError;
use crate::exec::command::CommandSpec;
use crate::exec::runner::CommandRunner;
use crate::filesys::dir::Dir;
use crate::storage::layout::ENV_FILE;
use crate::trace;

/// One deployed artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTarget {
    /// Process name under the supervisor
    pub name: String,
    pub dir: PathBuf,
    pub port: u16,
    pub env_file: PathBuf,
}

/// Both deployed artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub base_dir: PathBuf,
    pub backend: ArtifactTarget,
    pub frontend: ArtifactTarget,
}

/// Replace both artifact trees with fresh extractions and write their env files
pub async fn deploy(
    runner: &dyn CommandRunner,
    settings: &Settings,
    elevate: bool,
) -> Result<DeploymentTarget, ProvisionError> {
    let layout = settings.layout();
    let base = layout.base();
    info!("Deploying artifacts to {}", base.path().display());
    base.create().await?;

    let backend_dir = layout.backend_dir();
    let frontend_dir = layout.frontend_dir();

    // Validate both archives before touching the current release
    let backend_archive = locate_archive(settings, &settings.backend, &backend_dir).await?;
    let frontend_archive = locate_archive(settings, &settings.frontend, &frontend_dir).await?;

    extract(runner, &backend_archive, &backend_dir).await?;
    extract(runner, &frontend_archive, &frontend_dir).await?;

    let backend = write_env(
        "backend",
        &backend_dir,
        settings.backend.port,
        &backend_env(settings)?,
    )
    .await?;
    let frontend = write_env(
        "frontend",
        &frontend_dir,
        settings.frontend.port,
        &frontend_env(settings),
    )
    .await?;

    take_ownership(runner, base.path(), &settings.app_user, elevate).await?;

    Ok(DeploymentTarget {
        base_dir: base.path().to_path_buf(),
        backend,
        frontend,
    })
}

async fn locate_archive(
    settings: &Settings,
    artifact: &ArtifactSettings,
    target: &Dir,
) -> Result<PathBuf, ProvisionError> {
    let archive = settings.archive_path(artifact);
    let is_file = tokio::fs::metadata(&archive)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ProvisionError::ExtractionError(format!(
            "archive not found: {}",
            archive.display()
        )));
    }
    if archive.starts_with(target.path()) {
        return Err(ProvisionError::ExtractionError(format!(
            "archive {} lies inside {}, which is replaced on deploy",
            archive.display(),
            target.path().display()
        )));
    }
    Ok(archive)
}

async fn extract(
    runner: &dyn CommandRunner,
    archive: &Path,
    target: &Dir,
) -> Result<(), ProvisionError> {
    debug!("Replacing {}", target.path().display());
    target.recreate().await?;

    let spec = CommandSpec::new("tar")
        .arg("-xzf")
        .arg(archive.to_string_lossy())
        .arg("-C")
        .arg(target.path().to_string_lossy());
    info!("Extracting {} into {}", archive.display(), target.path().display());
    runner
        .run(&spec)
        .await?
        .check(&spec, trace!())
        .map_err(ProvisionError::ExtractionCommand)?;
    Ok(())
}

async fn write_env(
    name: &str,
    dir: &Dir,
    port: u16,
    env: &EnvFile,
) -> Result<ArtifactTarget, ProvisionError> {
    let file = dir.file(ENV_FILE);
    file.write_private(&env.render()).await?;
    debug!("Wrote {}", file.path().display());

    Ok(ArtifactTarget {
        name: name.to_string(),
        dir: dir.path().to_path_buf(),
        port,
        env_file: file.path().to_path_buf(),
    })
}

async fn take_ownership(
    runner: &dyn CommandRunner,
    base: &Path,
    user: &str,
    elevate: bool,
) -> Result<(), ProvisionError> {
    let spec = chown(base, user, true, elevate);
    runner
        .run(&spec)
        .await?
        .check(&spec, trace!())
        .map_err(ProvisionError::ExtractionCommand)?;
    info!("{} now owned by {}", base.display(), user);
    Ok(())
}

/// `chown [-R] <user> <path>`
pub fn chown(path: &Path, user: &str, recursive: bool, elevate: bool) -> CommandSpec {
    let spec = CommandSpec::new("chown");
    let spec = if recursive { spec.arg("-R") } else { spec };
    spec.arg(user).arg(path.to_string_lossy()).elevated(elevate)
}
