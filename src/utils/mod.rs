pub mod logging;

pub use logging::{init_tracing, LogTarget, DEFAULT_LOG_FILE};
