//! Brick common library
//!
//! This crate contains shared code used across Brick components.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::BrickConfig;
pub use error::{BrickError, Result};
pub use metrics::{LatencyTimer, MetricsRegistry, METRICS};
