//! Migration safety controller
//!
//! Inspects the target schema before the schema push. A populated schema is dumped to a
//! timestamped file next to the installation anchor first; an empty one is pushed directly.
//! Nothing in here aborts the run: problems are collected as [`MigrationFailure`]s for the
//! pipeline to report.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::config::settings::Settings;
use crate::database::bootstrap::ensure_database;
use crate::database::client::{database_url, parse_count, table_count_query, MysqlClient};
use crate::deploy::artifacts::DeploymentTarget;
use crate::errors::{MigrationFailure, ProvisionError};
use crate::exec::command::CommandSpec;
use crate::exec::runner::{run_tolerant, CommandRunner};
use crate::filesys::file::File;
use crate::trace;

/// Tables found in the target schema at inspection time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableCount {
    Known(u64),

    /// The inspection query could not run
    Unknown,
}

/// Outcome of one reconcile pass
#[derive(Debug, Default)]
pub struct MigrationState {
    pub table_count: Option<TableCount>,

    /// Backup written before the push, if one was needed and succeeded
    pub backup: Option<PathBuf>,

    /// Whether the schema push completed
    pub schema_pushed: bool,

    /// Degraded outcomes, for the pipeline to surface as warnings
    pub issues: Vec<MigrationFailure>,
}

/// Bootstrap, inspect, back up when needed, then push the schema
pub async fn reconcile(
    runner: &dyn CommandRunner,
    settings: &Settings,
    target: &DeploymentTarget,
    now: DateTime<Local>,
) -> Result<MigrationState, ProvisionError> {
    let db = &settings.database;
    let client = MysqlClient::new(db);
    let mut state = MigrationState::default();

    match ensure_database(runner, db).await {
        Ok(_) => {}
        Err(ProvisionError::MigrationError(failure)) => {
            warn!("{}", failure);
            state.issues.push(failure);
        }
        Err(e) => return Err(e),
    }

    let count = inspect(runner, &client, &db.name, &mut state).await;
    state.table_count = Some(count);

    match count {
        TableCount::Known(0) => {
            info!("Database {} is empty, pushing schema without backup", db.name);
        }
        TableCount::Known(n) => {
            info!("Database {} has {} tables, backing up before schema push", db.name, n);
            let proceed = backup(runner, settings, &client, now, &mut state).await;
            if !proceed {
                return Ok(state);
            }
        }
        TableCount::Unknown => {
            warn!("Table count unknown, attempting schema push anyway");
        }
    }

    push_schema(runner, settings, target, &mut state).await?;
    Ok(state)
}

async fn inspect(
    runner: &dyn CommandRunner,
    client: &MysqlClient<'_>,
    schema: &str,
    state: &mut MigrationState,
) -> TableCount {
    let spec = client.query(&table_count_query(schema));
    let out = run_tolerant(runner, &spec).await;

    let reason = if out.is_success() {
        match parse_count(&out.stdout) {
            Some(count) => return TableCount::Known(count),
            None => format!("unexpected output from `{}`: {:?}", spec, out.stdout.trim()),
        }
    } else {
        format!("`{}` exited with status {}: {}", spec, out.status, out.stderr.trim())
    };

    warn!("Could not count tables in {}: {}", schema, reason);
    state.issues.push(MigrationFailure::ConnectivityUnknown(reason));
    TableCount::Unknown
}

/// Dump the schema. Returns whether the schema push may go ahead.
async fn backup(
    runner: &dyn CommandRunner,
    settings: &Settings,
    client: &MysqlClient<'_>,
    now: DateTime<Local>,
    state: &mut MigrationState,
) -> bool {
    let db_name = &settings.database.name;

    if !runner.has_binary("mysqldump").await {
        let risk = format!(
            "mysqldump not found: database {} has existing tables \
             and is being modified WITHOUT a backup",
            db_name
        );
        warn!("{}", risk);
        state.issues.push(MigrationFailure::BackupUnavailable(risk));
        return true;
    }

    let file = settings.layout().backup_file(db_name, now);
    let spec = client.dump(file.path());
    info!("Backing up {} to {}", db_name, file.path().display());
    let out = run_tolerant(runner, &spec).await;

    let failure = if !out.is_success() {
        Some(format!("`{}` exited with status {}: {}", spec, out.status, out.stderr.trim()))
    } else if file.size().await == 0 {
        Some(format!("{} is missing or empty", file.path().display()))
    } else {
        None
    };

    match failure {
        None => {
            info!("Backup written: {}", file.path().display());
            state.backup = Some(file.path().to_path_buf());
            true
        }
        Some(reason) => {
            discard(&file).await;
            warn!("Backup of {} failed, not pushing schema: {}", db_name, reason);
            state.issues.push(MigrationFailure::BackupFailed(reason));
            false
        }
    }
}

async fn discard(file: &File) {
    if let Err(e) = file.delete().await {
        warn!("Could not remove incomplete backup {}: {}", file.path().display(), e);
    }
}

async fn push_schema(
    runner: &dyn CommandRunner,
    settings: &Settings,
    target: &DeploymentTarget,
    state: &mut MigrationState,
) -> Result<(), ProvisionError> {
    let url = database_url(&settings.database)?;
    let steps: [&[&str]; 2] = [&["prisma", "generate"], &["prisma", "db", "push"]];

    for args in steps {
        let spec = CommandSpec::new("npx")
            .args(args.iter().copied())
            .current_dir(&target.backend.dir)
            .env("DATABASE_URL", url.as_str());
        info!("Running {}", spec);
        let out = run_tolerant(runner, &spec).await;
        if let Err(failure) = out.check(&spec, trace!()) {
            warn!("Schema step failed: {}", failure);
            state.issues.push(MigrationFailure::ApplyFailed(failure));
            return Ok(());
        }
    }

    state.schema_pushed = true;
    info!("Schema is up to date");
    Ok(())
}
