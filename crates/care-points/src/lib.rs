pub mod config;
pub mod error;
pub mod points;
pub mod telemetry;
