//! Per-artifact environment files

use secrecy::ExposeSecret;

use crate::config::settings::Settings;
use crate::database::client::database_url;
use crate::errors::ProvisionError;

/// Ordered `KEY=value` lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.push((key.to_string(), value.into()));
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(&quote(value));
            out.push('\n');
        }
        out
    }
}

fn quote(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| !c.is_whitespace() && !matches!(c, '#' | '"' | '\'' | '\\' | '$' | '`'));
    if plain {
        return value.to_string();
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`");
    format!("\"{}\"", escaped)
}

fn public_url(settings: &Settings) -> String {
    settings
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", settings.frontend.port))
}

/// Environment of the backend process
pub fn backend_env(settings: &Settings) -> Result<EnvFile, ProvisionError> {
    let mut env = EnvFile::new()
        .set("NODE_ENV", settings.environment.as_str())
        .set("PORT", settings.backend.port.to_string())
        .set("DATABASE_URL", database_url(&settings.database)?);
    if let Some(secret) = &settings.jwt_secret {
        env = env.set("JWT_SECRET", secret.expose_secret());
    }
    Ok(env.set("CORS_ORIGIN", public_url(settings)))
}

/// Environment of the frontend process
pub fn frontend_env(settings: &Settings) -> EnvFile {
    EnvFile::new()
        .set("NODE_ENV", settings.environment.as_str())
        .set("PORT", settings.frontend.port.to_string())
        .set(
            "NEXT_PUBLIC_API_URL",
            format!("http://localhost:{}", settings.backend.port),
        )
        .set("PUBLIC_URL", public_url(settings))
}
