//! Database bootstrap and migration safety

pub mod bootstrap;
pub mod client;
pub mod migrate;
