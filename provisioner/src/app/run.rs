//! The provisioning pipeline
//!
//! Steps run strictly in order. A fatal error from any of them ends the run as a [`Fatal`];
//! degraded ones are collected as warnings and the pipeline moves on.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use colored::Colorize;
use tracing::{info, warn};

use crate::config::settings::{LoadContext, Settings};
use crate::database::migrate::{reconcile, MigrationState, TableCount};
use crate::deploy::artifacts::{deploy, DeploymentTarget};
use crate::errors::{ProvisionError, Severity};
use crate::exec::runner::CommandRunner;
use crate::installer::install::{install, InstallReport};
use crate::platform::detect::{detect, HostOs};
use crate::report::Fatal;
use crate::supervisor::pm2::{configure, SupervisorReport};
use crate::supervisor::startup::{register, BootOutcome};
use crate::trace;

/// Everything a successful run did
#[derive(Debug)]
pub struct RunSummary {
    pub environment: String,
    pub install: InstallReport,
    pub target: DeploymentTarget,
    pub migration: MigrationState,
    pub supervisor: SupervisorReport,

    /// `None` when registration failed (see `warnings`)
    pub boot: Option<BootOutcome>,

    /// Degraded step outcomes
    pub warnings: Vec<String>,
}

/// Run one provisioning pass against the host behind `runner`
pub async fn run(
    runner: &dyn CommandRunner,
    host_os: HostOs,
    config_path: &Path,
    ctx: &LoadContext,
    now: DateTime<Local>,
) -> Result<RunSummary, Fatal> {
    info!("Loading configuration from {}", config_path.display());
    let settings = Settings::load(config_path, ctx)
        .await
        .map_err(|e| Fatal::new("configuration", trace!(), e))?;

    let descriptor = detect(runner, host_os)
        .await
        .map_err(|e| Fatal::new("platform detection", trace!(), e))?;

    let install = install(runner, &descriptor, &settings)
        .await
        .map_err(|e| Fatal::new("installation", trace!(), e))?;

    let target = deploy(runner, &settings, descriptor.elevate)
        .await
        .map_err(|e| Fatal::new("artifact deployment", trace!(), e))?;

    let mut warnings = Vec::new();

    let migration = match reconcile(runner, &settings, &target, now).await {
        Ok(state) => state,
        Err(e) => {
            degrade("database migration", e, trace!(), &mut warnings)?;
            MigrationState::default()
        }
    };
    warnings.extend(migration.issues.iter().map(ToString::to_string));

    let supervisor = configure(runner, &settings, &descriptor, &target)
        .await
        .map_err(|e| Fatal::new("process supervisor", trace!(), e))?;

    let boot = match register(runner, &settings, &descriptor).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            degrade("boot persistence", e, trace!(), &mut warnings)?;
            None
        }
    };
    if boot == Some(BootOutcome::Unsupported) {
        warnings.push("boot persistence skipped: no supported init system".to_string());
    }

    Ok(RunSummary {
        environment: settings.environment.clone(),
        install,
        target,
        migration,
        supervisor,
        boot,
        warnings,
    })
}

/// Downgrade a tolerated failure to a warning. Anything fatal still ends the run.
fn degrade(
    step: &'static str,
    error: ProvisionError,
    location: String,
    warnings: &mut Vec<String>,
) -> Result<(), Fatal> {
    match error.severity() {
        Severity::Degraded => {
            warn!("{} failed, continuing: {}", step, error);
            warnings.push(format!("{}: {}", step, error));
            Ok(())
        }
        Severity::Fatal => Err(Fatal::new(step, location, error)),
    }
}

impl RunSummary {
    pub fn base_dir(&self) -> &Path {
        &self.target.base_dir
    }

    pub fn backup(&self) -> Option<&PathBuf> {
        self.migration.backup.as_ref()
    }

    /// Print the end-of-run banner
    pub fn print(&self) {
        println!();
        println!("{}", "Provisioning complete".green().bold());
        println!("  environment   {}", self.environment);
        println!("  base dir      {}", self.base_dir().display());
        if self.install.is_noop() {
            println!("  installed     nothing (host already provisioned)");
        } else {
            let mut installed = self.install.packages.clone();
            if self.install.runtime.is_some() {
                installed.push("node".to_string());
            }
            if self.install.supervisor {
                installed.push("pm2".to_string());
            }
            println!("  installed     {}", installed.join(", "));
        }
        match self.migration.table_count {
            Some(TableCount::Known(n)) => println!("  tables        {}", n),
            Some(TableCount::Unknown) | None => println!("  tables        unknown"),
        }
        if let Some(backup) = self.backup() {
            println!("  backup        {}", backup.display());
        }
        let schema = if self.migration.schema_pushed {
            "pushed"
        } else {
            "not pushed"
        };
        println!("  schema        {}", schema);
        println!("  processes     {}", self.supervisor.processes.join(", "));
        println!("  manifest      {}", self.supervisor.manifest.display());
        println!("  pm2 home      {}", self.supervisor.pm2_home.display());
        match self.boot {
            Some(BootOutcome::Registered(init)) => println!("  boot start    {}", init),
            Some(BootOutcome::Disabled) => println!("  boot start    disabled"),
            Some(BootOutcome::Unsupported) => println!("  boot start    unsupported, skipped"),
            None => println!("  boot start    failed"),
        }
        for warning in &self.warnings {
            println!("  {} {}", "warning".yellow().bold(), warning);
        }
    }
}
