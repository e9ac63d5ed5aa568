//! Prerequisite installation

pub mod install;
