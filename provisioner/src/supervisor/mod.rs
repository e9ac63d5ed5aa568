//! pm2 process supervision

pub mod manifest;
pub mod pm2;
pub mod startup;
