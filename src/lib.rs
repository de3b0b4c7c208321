pub mod analytics;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod server;

// Domain data shapes shared across layers
pub mod domain;
