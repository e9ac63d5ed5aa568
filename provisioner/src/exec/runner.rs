//! Command runner seam
//!
//! Every tool the provisioner drives (package managers, tar, mysql, pm2, npx)
//! is launched through a [`CommandRunner`], so the whole pipeline can be
//! exercised against a scripted host.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::ProvisionError;
use crate::exec::command::{CommandOutput, CommandSpec, STATUS_CANNOT_RUN, STATUS_NOT_FOUND};

/// Runs external commands to completion, one at a time
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and capture its output.
    ///
    /// A program that does not exist is reported as exit status 127, not as an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProvisionError>;

    /// Whether `name` resolves to an executable on this host
    async fn has_binary(&self, name: &str) -> bool;

    /// Whether a path exists on this host
    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

/// Runs commands on the local host with `tokio::process`
#[derive(Debug, Clone)]
pub struct SystemRunner {
    search_path: Vec<PathBuf>,
}

impl SystemRunner {
    /// Create a runner that resolves binaries against the given `PATH` value
    pub fn new(path_var: Option<&std::ffi::OsStr>) -> Self {
        let search_path = path_var
            .map(|p| std::env::split_paths(p).collect())
            .unwrap_or_default();
        Self { search_path }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        let argv = spec.argv();
        debug!("Running: {}", spec);

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CommandOutput::failure(
                    STATUS_NOT_FOUND,
                    format!("{}: command not found", argv[0]),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            // a tool that exits before reading its input reports through its exit status
            match stdin.write_all(input.as_bytes()).await {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("{} closed stdin early", argv[0]);
                }
                other => other?,
            }
            // close stdin so the tool sees EOF
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            // killed by a signal: report like a shell would
            status: output.status.code().unwrap_or(128),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn has_binary(&self, name: &str) -> bool {
        for dir in &self.search_path {
            let candidate = dir.join(name);
            if let Ok(meta) = tokio::fs::metadata(&candidate).await {
                if meta.is_file() && is_executable(&meta) {
                    return true;
                }
            }
        }
        false
    }
}

/// Run `spec`, folding a failure to launch or talk to the tool into exit status 126.
///
/// For steps whose failures are reported as warnings rather than ending the run.
pub async fn run_tolerant(runner: &dyn CommandRunner, spec: &CommandSpec) -> CommandOutput {
    match runner.run(spec).await {
        Ok(out) => out,
        Err(e) => {
            debug!("Could not run {}: {}", spec, e);
            CommandOutput::failure(STATUS_CANNOT_RUN, format!("{}: {}", spec.program, e))
        }
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}
