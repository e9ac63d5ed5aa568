//! Artifact deployment

pub mod artifacts;
pub mod envfile;
