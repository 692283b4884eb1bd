use anyhow::Result;
use anomaly_replay::config::Settings;
use anomaly_replay::start_dashboard;
use anomaly_replay::utils::{init_tracing, LogTarget, DEFAULT_LOG_FILE};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    let log_file = settings
        .logging
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    init_tracing(&settings.logging.level, LogTarget::File(&log_file))?;

    start_dashboard(settings).await
}
