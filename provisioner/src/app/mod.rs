//! Provisioning entry point

pub mod options;
pub mod run;
