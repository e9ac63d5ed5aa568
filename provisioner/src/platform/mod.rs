//! Host platform detection and package manager strategies

pub mod detect;
pub mod strategy;
