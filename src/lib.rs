pub mod cli;
pub mod config;
pub mod core;
pub mod data;
pub mod errors;
pub mod monitoring;
pub mod stream;
pub mod utils;

#[cfg(feature = "dashboard")]
pub mod dashboard;

// Re-exports
pub use crate::config::Settings;
pub use crate::core::{Phase, ReplaySession, Snapshot, Summary};
pub use crate::data::{LabelStore, Series};
pub use crate::errors::{ReplayError, ReplayResult};
pub use crate::monitoring::{IsolationForest, IsolationForestConfig, OutlierDetector};
pub use crate::stream::{Batch, BatchStreamer};

#[cfg(feature = "dashboard")]
pub use crate::dashboard::start_dashboard;
