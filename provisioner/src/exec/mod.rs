//! External command execution

pub mod command;
pub mod runner;
