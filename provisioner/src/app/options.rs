//! Command line options

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::ProvisionError;
use crate::logs::{LogLevel, LogOptions};

/// Configuration file looked up next to the executable
pub const DEFAULT_CONFIG_FILE: &str = "deploy.env";

/// Options for one provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Settings source; its directory is the installation anchor
    pub config_path: PathBuf,

    pub log: LogOptions,

    /// Print version information and exit
    pub show_version: bool,
}

impl RunOptions {
    /// Build options from parsed flags. `exe_dir` locates the default configuration file.
    pub fn from_args(
        args: &HashMap<String, String>,
        exe_dir: &Path,
    ) -> Result<Self, ProvisionError> {
        let config_path = match args.get("config") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => exe_dir.join(DEFAULT_CONFIG_FILE),
        };

        let log_level = match args.get("log-level") {
            Some(level) => level
                .parse::<LogLevel>()
                .map_err(|reason| ProvisionError::InvalidSetting {
                    key: "--log-level".to_string(),
                    reason,
                })?,
            None => LogLevel::default(),
        };

        Ok(Self {
            config_path,
            log: LogOptions {
                log_level,
                log_file: args
                    .get("log-file")
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
                json_format: args.contains_key("log-json"),
            },
            show_version: args.contains_key("version"),
        })
    }
}

/// Collect `--key=value` and `--flag` arguments, skipping the program name
pub fn parse_args<I>(args: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = String>,
{
    let mut cli_args = HashMap::new();
    for arg in args.into_iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }
    cli_args
}
