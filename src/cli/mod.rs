/*
* Replay Command Line Interface
* -----------------------------
*
* anomaly-replay
* ├── dashboard [overrides]        // live terminal view, logs go to a file
* ├── run [overrides] [--json]     // same state machine, no UI, summary at the end
* └── init [--force]               // writes config/default.toml
*
* Overrides sit on top of the layered configuration (defaults, config files,
* REPLAY_* environment). Ranges are checked once, after the overrides, and
* out-of-range values are rejected before anything is loaded.
*
* Usage:
* -----
* ```bash
* anomaly-replay dashboard --root ../NAB --series realKnownCause/nyc_taxi.csv
* anomaly-replay run --delay-ms 0 --json > summary.json
* ```
*/

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use crate::config::{generate_default_config, Settings};
use crate::core::{ReplaySession, Summary};
use crate::utils::{init_tracing, LogTarget, DEFAULT_LOG_FILE};

#[derive(Parser)]
#[command(name = "anomaly-replay")]
#[command(version, about = "Replay a time series through an isolation forest", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, value_name = "CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the live terminal dashboard
    #[cfg(feature = "dashboard")]
    Dashboard {
        #[command(flatten)]
        overrides: ReplayOverrides,
    },
    /// Replay without a UI and print a summary
    Run {
        #[command(flatten)]
        overrides: ReplayOverrides,

        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate default configuration
    Init {
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct ReplayOverrides {
    /// Corpus root containing data/ and labels/
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Series path relative to <root>/data
    #[arg(long)]
    pub series: Option<String>,

    /// Label file (defaults to <root>/labels/combined_windows.json)
    #[arg(long)]
    pub labels: Option<PathBuf>,

    /// Warm-up points used to fit the detector (50-5000)
    #[arg(long)]
    pub warmup: Option<usize>,

    /// Expected anomaly fraction in the warm-up (0.001-0.1)
    #[arg(long)]
    pub contamination: Option<f64>,

    /// Points per batch (1-50)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pause between batches in milliseconds (0-500)
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Score threshold; replaces the contamination boundary
    #[arg(long, allow_negative_numbers = true)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip the ground-truth overlay and metrics
    #[arg(long)]
    pub no_ground_truth: bool,
}

impl ReplayOverrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(root) = &self.root {
            settings.source.root = root.clone();
        }
        if let Some(series) = &self.series {
            settings.source.series = series.clone();
        }
        if let Some(labels) = &self.labels {
            settings.source.labels = Some(labels.clone());
        }
        if let Some(warmup) = self.warmup {
            settings.detector.warmup = warmup;
        }
        if let Some(contamination) = self.contamination {
            settings.detector.contamination = contamination;
        }
        if let Some(batch_size) = self.batch_size {
            settings.stream.batch_size = batch_size;
        }
        if let Some(delay_ms) = self.delay_ms {
            settings.stream.delay_ms = delay_ms;
        }
        if let Some(threshold) = self.threshold {
            settings.detector.threshold = Some(threshold);
        }
        if let Some(seed) = self.seed {
            settings.detector.seed = seed;
        }
        if self.no_ground_truth {
            settings.display.show_ground_truth = false;
        }
    }
}

/// Layers the command-line overrides on top and range-checks the result once.
pub fn load_settings(
    config: Option<&PathBuf>,
    overrides: &ReplayOverrides,
) -> anyhow::Result<Settings> {
    let mut settings = match config {
        Some(path) => Settings::from_file_unchecked(path)?,
        None => Settings::load_unchecked()?,
    };
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn log_level(settings: &Settings, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        settings.logging.level.clone()
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "dashboard")]
        Commands::Dashboard { overrides } => {
            let settings = load_settings(cli.config.as_ref(), &overrides)?;
            let log_file = settings
                .logging
                .file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
            init_tracing(&log_level(&settings, cli.verbose), LogTarget::File(&log_file))?;
            crate::dashboard::start_dashboard(settings).await?;
        }
        Commands::Run { overrides, json } => {
            let settings = load_settings(cli.config.as_ref(), &overrides)?;
            init_tracing(&log_level(&settings, cli.verbose), LogTarget::Stderr)?;
            handle_run_command(settings, json).await?;
        }
        Commands::Init { force } => {
            handle_init_command(force)?;
        }
    }

    Ok(())
}

async fn handle_run_command(settings: Settings, json: bool) -> anyhow::Result<()> {
    let mut session = ReplaySession::new(settings)?;
    info!(session = %session.id(), "Headless replay starting");

    let outcome = session.replay().await;
    let summary = session.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    outcome.context("Replay did not complete")?;
    Ok(())
}

pub fn print_summary(summary: &Summary) {
    println!("{} {}", "Replay".bold(), summary.series.cyan());
    println!("  session            {}", summary.session_id);
    println!("  phase              {}", summary.phase);
    println!("  series length      {}", summary.series_length);
    println!("  warm-up            {}", summary.warmup);
    println!("  points streamed    {}", summary.points_streamed);
    println!(
        "  anomalies flagged  {}",
        summary.anomalies_flagged.to_string().red().bold()
    );

    match summary.metrics {
        Some(m) => {
            println!("  precision          {:.3}", m.precision);
            println!("  recall             {:.3}", m.recall);
            println!("  f1                 {}", format!("{:.3}", m.f1).green());
        }
        None => println!("  {}", "ground truth unavailable".dimmed()),
    }

    if !summary.flagged.is_empty() {
        println!("{}", "Flagged:".bold());
        for ts in &summary.flagged {
            println!("  - {}", ts);
        }
        if summary.anomalies_flagged > summary.flagged.len() {
            println!("  ... and {} more", summary.anomalies_flagged - summary.flagged.len());
        }
    }

    for warning in &summary.warnings {
        println!("{} {}", "!".yellow(), warning.yellow());
    }
}

fn handle_init_command(force: bool) -> anyhow::Result<()> {
    let config_dir = PathBuf::from("config");
    let target = config_dir.join("default.toml");
    if target.exists() && !force {
        println!(
            "{} {} already exists. Use --force to overwrite.",
            "✗".red(),
            target.display()
        );
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    let config_str = toml::to_string_pretty(&generate_default_config())?;
    std::fs::write(&target, config_str)?;

    println!("{} Default configuration written to {}", "✓".green(), target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn overrides_take_precedence() {
        let cli = Cli::try_parse_from([
            "anomaly-replay",
            "run",
            "--root",
            "/data/nab",
            "--series",
            "realTweets/Twitter_volume_AAPL.csv",
            "--batch-size",
            "10",
            "--delay-ms",
            "0",
            "--threshold",
            "-0.05",
            "--no-ground-truth",
            "--json",
        ])
        .unwrap();

        let Commands::Run { overrides, json } = cli.command else {
            panic!("expected run command");
        };
        assert!(json);

        let mut settings = Settings::default();
        overrides.apply(&mut settings);
        assert_eq!(settings.stream.batch_size, 10);
        assert_eq!(settings.stream.delay_ms, 0);
        assert_eq!(settings.detector.threshold, Some(-0.05));
        assert!(!settings.display.show_ground_truth);
        assert_eq!(
            settings.series_path(),
            PathBuf::from("/data/nab/data/realTweets/Twitter_volume_AAPL.csv")
        );
        assert_eq!(settings.detector.warmup, 500);
    }

    #[test]
    fn out_of_range_override_is_rejected() {
        let mut settings = Settings::default();
        ReplayOverrides {
            batch_size: Some(51),
            ..Default::default()
        }
        .apply(&mut settings);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn override_corrects_out_of_range_file_value() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[stream]\nbatch_size = 100").unwrap();
        let path = file.path().to_path_buf();

        let fixed = ReplayOverrides {
            batch_size: Some(10),
            ..Default::default()
        };
        let settings = load_settings(Some(&path), &fixed).unwrap();
        assert_eq!(settings.stream.batch_size, 10);

        assert!(load_settings(Some(&path), &ReplayOverrides::default()).is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["anomaly-replay", "init", "--force", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }
}
