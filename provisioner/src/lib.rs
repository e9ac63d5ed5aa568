//! Host provisioner
//!
//! Installs the prerequisites of a two-tier Node.js application, deploys its backend and
//! frontend archives, protects and updates its MySQL schema, and hands both processes to pm2.

pub mod app;
pub mod config;
pub mod database;
pub mod deploy;
pub mod errors;
pub mod exec;
pub mod filesys;
pub mod installer;
pub mod logs;
pub mod platform;
pub mod report;
pub mod storage;
pub mod supervisor;
pub mod utils;

/// Macro for creating trace information
#[macro_export]
macro_rules! trace {
    () => {
        format!("{}:{}", file!(), line!())
    };
}
