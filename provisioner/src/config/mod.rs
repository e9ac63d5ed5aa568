//! Configuration loading and validation

pub mod settings;
pub mod source;
