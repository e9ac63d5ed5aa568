//! On-disk layout

pub mod layout;
