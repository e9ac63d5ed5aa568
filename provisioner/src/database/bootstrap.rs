//! Database and application user creation

use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::settings::DatabaseSettings;
use crate::database::client::{escape_literal, quote_identifier, ClientAuth, MysqlClient};
use crate::errors::{MigrationFailure, ProvisionError};
use crate::exec::runner::{run_tolerant, CommandRunner};
use crate::trace;

/// Host part of the application account
fn account_host(db_host: &str) -> &'static str {
    match db_host {
        "localhost" | "127.0.0.1" | "::1" => "localhost",
        _ => "%",
    }
}

/// SQL that creates the schema and, when a password is configured, the application user
pub fn bootstrap_sql(db: &DatabaseSettings) -> String {
    let schema = quote_identifier(&db.name);
    let mut sql = format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;\n",
        schema
    );

    if let Some(password) = &db.password {
        let account = format!(
            "'{}'@'{}'",
            escape_literal(&db.user),
            account_host(&db.host)
        );
        let password = escape_literal(password.expose_secret());
        sql.push_str(&format!(
            "CREATE USER IF NOT EXISTS {account} IDENTIFIED BY '{password}';\n\
             ALTER USER {account} IDENTIFIED BY '{password}';\n\
             GRANT ALL PRIVILEGES ON {schema}.* TO {account};\n\
             FLUSH PRIVILEGES;\n"
        ));
    }
    sql
}

/// Ensure the schema (and application user) exist.
///
/// Only runs with root credentials; returns whether anything was executed.
pub async fn ensure_database(
    runner: &dyn CommandRunner,
    db: &DatabaseSettings,
) -> Result<bool, ProvisionError> {
    let client = MysqlClient::new(db);
    if client.auth() != ClientAuth::Root {
        debug!("No root credential configured, skipping database bootstrap");
        return Ok(false);
    }

    info!("Ensuring database {} exists", db.name);
    let spec = client.script(bootstrap_sql(db));
    run_tolerant(runner, &spec)
        .await
        .check(&spec, trace!())
        .map_err(|f| ProvisionError::MigrationError(MigrationFailure::BootstrapFailed(f)))?;
    Ok(true)
}
