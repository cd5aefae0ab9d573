pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;

// Capability ports and their concrete adapters
pub mod app;
pub mod infra;
