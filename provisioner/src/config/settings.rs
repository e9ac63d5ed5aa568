//! Validated provisioning settings

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tracing::{debug, info};

use crate::config::source::SettingsSource;
use crate::errors::ProvisionError;
use crate::storage::layout::DeploymentLayout;

pub const APP_BASE_DIR: &str = "APP_BASE_DIR";
pub const BACKEND_ARCHIVE: &str = "BACKEND_ARCHIVE";
pub const FRONTEND_ARCHIVE: &str = "FRONTEND_ARCHIVE";
pub const BACKEND_PORT: &str = "BACKEND_PORT";
pub const FRONTEND_PORT: &str = "FRONTEND_PORT";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const APP_USER: &str = "APP_USER";
pub const NODE_VERSION: &str = "NODE_VERSION";

pub const DB_ROOT_PASSWORD: &str = "DB_ROOT_PASSWORD";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const DB_HOST: &str = "DB_HOST";
pub const DB_PORT: &str = "DB_PORT";
pub const ENABLE_STARTUP: &str = "ENABLE_STARTUP";
pub const DEPLOY_ENV: &str = "DEPLOY_ENV";
pub const JWT_SECRET: &str = "JWT_SECRET";
pub const PUBLIC_URL: &str = "PUBLIC_URL";
pub const APP_USER_HOME: &str = "APP_USER_HOME";

/// Required keys, in validation order
pub const REQUIRED_KEYS: [&str; 9] = [
    APP_BASE_DIR,
    BACKEND_ARCHIVE,
    FRONTEND_ARCHIVE,
    BACKEND_PORT,
    FRONTEND_PORT,
    DB_NAME,
    DB_USER,
    APP_USER,
    NODE_VERSION,
];

pub const OPTIONAL_KEYS: [&str; 9] = [
    DB_ROOT_PASSWORD,
    DB_PASSWORD,
    DB_HOST,
    DB_PORT,
    ENABLE_STARTUP,
    DEPLOY_ENV,
    JWT_SECRET,
    PUBLIC_URL,
    APP_USER_HOME,
];

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_environment() -> String {
    "production".to_string()
}

/// Provisioning settings, built once and read-only afterwards
#[derive(Debug)]
pub struct Settings {
    /// Deployment environment name (`NODE_ENV` of both artifacts)
    pub environment: String,

    /// Directory the artifacts are deployed under
    pub base_dir: PathBuf,

    /// Directory holding the settings source; archives and backups live here
    pub anchor: PathBuf,

    pub backend: ArtifactSettings,
    pub frontend: ArtifactSettings,
    pub database: DatabaseSettings,

    /// System user that owns the deployment
    pub app_user: String,

    /// Home directory of `app_user`, when it cannot be derived
    pub app_user_home: Option<PathBuf>,

    /// Runtime version, e.g. `20` or `20.11.1`
    pub node_version: String,

    /// Register the supervisor for boot-start
    pub enable_startup: bool,

    pub jwt_secret: Option<SecretString>,

    /// Public origin of the frontend
    pub public_url: Option<String>,
}

/// One deployable artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSettings {
    /// Archive path, relative to the anchor unless absolute
    pub archive: PathBuf,

    /// Listening port
    pub port: u16,
}

/// Database connection settings
#[derive(Debug)]
pub struct DatabaseSettings {
    pub name: String,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub root_password: Option<SecretString>,
    pub password: Option<SecretString>,
}

/// Host context the settings are resolved against
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    /// Working directory of the invoking process
    pub cwd: PathBuf,

    /// Process environment snapshot, used as an overlay
    pub env: HashMap<String, String>,
}

impl Settings {
    /// Read, overlay and validate the settings source at `path`
    pub async fn load(path: &Path, ctx: &LoadContext) -> Result<Self, ProvisionError> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            ctx.cwd.join(path)
        };

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProvisionError::MissingSource(path));
            }
            Err(e) => return Err(e.into()),
        };

        let mut source = SettingsSource::parse(&text);
        source.overlay(&ctx.env, &REQUIRED_KEYS);
        source.overlay(&ctx.env, &OPTIONAL_KEYS);
        debug!(
            "Settings from {}: {}",
            path.display(),
            source.keys().collect::<Vec<_>>().join(", ")
        );

        let anchor = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.cwd.clone());

        let settings = Self::from_source(source, anchor, &ctx.cwd)?;
        info!("Deployment environment: {}", settings.environment);
        Ok(settings)
    }

    /// Validate an already parsed source
    pub fn from_source(
        mut source: SettingsSource,
        anchor: PathBuf,
        cwd: &Path,
    ) -> Result<Self, ProvisionError> {
        let base_dir = resolve_base_dir(source.get(APP_BASE_DIR), cwd);
        source.set(APP_BASE_DIR, base_dir.to_string_lossy());

        for key in REQUIRED_KEYS {
            if source.get_non_empty(key).is_none() {
                return Err(ProvisionError::MissingRequiredKey(key.to_string()));
            }
        }
        let required = |key: &str| -> String {
            source.get_non_empty(key).unwrap_or_default().trim().to_string()
        };
        let optional = |key: &str| source.get_non_empty(key).map(|v| v.trim().to_string());
        let secret = |key: &str| {
            source
                .get_non_empty(key)
                .map(|v| SecretString::from(v.to_string()))
        };

        let database = DatabaseSettings {
            name: required(DB_NAME),
            user: required(DB_USER),
            host: optional(DB_HOST).unwrap_or_else(default_db_host),
            port: match optional(DB_PORT) {
                Some(v) => parse_port(DB_PORT, &v)?,
                None => default_db_port(),
            },
            root_password: secret(DB_ROOT_PASSWORD),
            password: secret(DB_PASSWORD),
        };

        Ok(Self {
            environment: optional(DEPLOY_ENV).unwrap_or_else(default_environment),
            base_dir,
            anchor,
            backend: ArtifactSettings {
                archive: PathBuf::from(required(BACKEND_ARCHIVE)),
                port: parse_port(BACKEND_PORT, &required(BACKEND_PORT))?,
            },
            frontend: ArtifactSettings {
                archive: PathBuf::from(required(FRONTEND_ARCHIVE)),
                port: parse_port(FRONTEND_PORT, &required(FRONTEND_PORT))?,
            },
            database,
            app_user: required(APP_USER),
            app_user_home: optional(APP_USER_HOME).map(PathBuf::from),
            node_version: required(NODE_VERSION),
            enable_startup: match optional(ENABLE_STARTUP) {
                Some(v) => parse_flag(ENABLE_STARTUP, &v)?,
                None => false,
            },
            jwt_secret: secret(JWT_SECRET),
            public_url: optional(PUBLIC_URL),
        })
    }

    /// On-disk layout of this deployment
    pub fn layout(&self) -> DeploymentLayout {
        DeploymentLayout::new(&self.base_dir, &self.anchor)
    }

    /// Major component of the configured runtime version
    pub fn node_major(&self) -> &str {
        let version = self.node_version.trim_start_matches('v');
        version.split('.').next().unwrap_or(version)
    }

    /// Resolve an archive path against the anchor
    pub fn archive_path(&self, artifact: &ArtifactSettings) -> PathBuf {
        if artifact.archive.is_absolute() {
            artifact.archive.clone()
        } else {
            self.anchor.join(&artifact.archive)
        }
    }
}

/// Resolve the base directory setting.
///
/// Unset, `.`, or an unexpanded variable reference (`$PWD`, `${HOME}/app`, `$(pwd)`) fall back to
/// the invocation working directory. Relative paths are resolved against it.
pub fn resolve_base_dir(value: Option<&str>, cwd: &Path) -> PathBuf {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() || value == "." || value == "./" || value.contains('$') {
        return cwd.to_path_buf();
    }
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ProvisionError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ProvisionError::InvalidSetting {
            key: key.to_string(),
            reason: format!("'{}' is not a valid port", value),
        }),
    }
}

/// Parse a boolean switch (`1/true/yes/on`, `0/false/no/off`)
pub fn parse_flag(key: &str, value: &str) -> Result<bool, ProvisionError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ProvisionError::InvalidSetting {
            key: key.to_string(),
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}
