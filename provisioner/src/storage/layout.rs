//! Deployment layout on disk

use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Name of the generated supervisor manifest
pub const MANIFEST_FILE: &str = "ecosystem.config.js";

/// Name of each artifact's environment file
pub const ENV_FILE: &str = ".env";

/// Prefix shared by all database backup files
pub const BACKUP_PREFIX: &str = "backup_";

/// Where a deployment lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentLayout {
    /// Base directory for both artifacts
    pub base_dir: PathBuf,

    /// Installation anchor (settings source directory)
    pub anchor: PathBuf,
}

impl DeploymentLayout {
    /// Create a new deployment layout
    pub fn new(base_dir: impl Into<PathBuf>, anchor: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            anchor: anchor.into(),
        }
    }

    pub fn base(&self) -> Dir {
        Dir::new(&self.base_dir)
    }

    /// Get the backend code tree
    pub fn backend_dir(&self) -> Dir {
        self.base().subdir("backend")
    }

    /// Get the frontend code tree
    pub fn frontend_dir(&self) -> Dir {
        self.base().subdir("frontend")
    }

    /// Get the supervisor manifest path
    pub fn manifest_file(&self) -> File {
        self.base().file(MANIFEST_FILE)
    }

    pub fn anchor_dir(&self) -> Dir {
        Dir::new(&self.anchor)
    }

    /// Backup file for `db_name` taken at `at`, e.g. `backup_shop_20261019_142501.sql`
    pub fn backup_file(&self, db_name: &str, at: DateTime<Local>) -> File {
        self.anchor_dir().file(&format!(
            "{}{}_{}.sql",
            BACKUP_PREFIX,
            db_name,
            at.format("%Y%m%d_%H%M%S")
        ))
    }
}
