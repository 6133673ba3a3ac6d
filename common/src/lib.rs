// Persistence layer for engagement widgets and their documents

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;
pub mod models;
pub mod telemetry;
