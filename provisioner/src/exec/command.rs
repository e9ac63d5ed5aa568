//! Command descriptions and their results

use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::CommandFailure;

/// Exit status used when a program cannot be found
pub const STATUS_NOT_FOUND: i32 = 127;

/// Exit status used when a program exists but could not be run
pub const STATUS_CANNOT_RUN: i32 = 126;

/// A single external tool invocation
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub elevated: bool,

    /// Run as this user through `sudo -u`, forwarding `envs` by name
    pub run_as: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run through `sudo` when `elevate` is set
    pub fn elevated(mut self, elevate: bool) -> Self {
        self.elevated = elevate;
        self
    }

    /// Run as `user` instead of the invoking user
    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    /// The program and arguments actually executed, including the `sudo` prefix
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 4);
        if let Some(user) = &self.run_as {
            argv.extend(["sudo".to_string(), "-u".to_string(), user.clone()]);
            if !self.envs.is_empty() {
                let names: Vec<&str> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
                argv.push(format!("--preserve-env={}", names.join(",")));
            }
        } else if self.elevated {
            argv.push("sudo".to_string());
            // keep DEBIAN_FRONTEND and friends across sudo
            if !self.envs.is_empty() {
                argv.push("-E".to_string());
            }
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Combined stdout/stderr, for matching on tool messages
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    /// Turn a non-zero exit into a `CommandFailure` tagged with the caller's location
    pub fn check(self, spec: &CommandSpec, location: String) -> Result<Self, CommandFailure> {
        if self.is_success() {
            return Ok(self);
        }
        let detail = self
            .stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string);
        Err(CommandFailure {
            operation: spec.to_string(),
            status: self.status,
            location,
            detail,
        })
    }
}
