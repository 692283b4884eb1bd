/*
* Replay Configuration
* --------------------
*
* Every knob a replay session reads at start-up lives here. Nothing in this
* file changes once a session begins.
*
* Configuration Hierarchy (from lowest to highest priority):
* -----------------------------------------------------
* 1. Hardcoded defaults (the values below, also emitted by `init`)
* 2. default.toml + local.toml under $CONFIG_PATH (both optional), or the
*    single file handed over with --config
* 3. Environment variables: REPLAY_<SECTION>__<KEY>, e.g.
*    REPLAY_STREAM__DELAY_MS=0
* 4. Command-line overrides, applied by the CLI after loading
*
* Sections:
* --------
* source   - where the corpus lives (root/data/<series>, root/labels/...)
* detector - isolation forest hyperparameters and the warm-up size
* stream   - replay pacing
* display  - ground-truth overlay and table depth
* logging  - level and optional log file (dashboard mode logs to a file)
*
* Ranges enforced by `validate`:
* -----------------------------
* warmup 50..=5000, contamination 0.001..=0.1, batch_size 1..=50,
* delay_ms 0..=500
*/

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::SettingsError;

pub const WARMUP_RANGE: (usize, usize) = (50, 5000);
pub const CONTAMINATION_RANGE: (f64, f64) = (0.001, 0.1);
pub const BATCH_SIZE_RANGE: (usize, usize) = (1, 50);
pub const DELAY_MS_RANGE: (u64, u64) = (0, 500);

pub const LABELS_RELATIVE_PATH: &str = "labels/combined_windows.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub stream: StreamSettings,
    pub display: DisplaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Corpus checkout holding `data/` and `labels/`.
    pub root: PathBuf,
    /// Series identifier, relative to `root/data`. Also the label-store key.
    pub series: String,
    /// Replaces `root/labels/combined_windows.json` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub warmup: usize,
    pub contamination: f64,
    pub trees: usize,
    pub max_samples: usize,
    pub seed: u64,
    /// Flags score >= threshold instead of the contamination boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    pub batch_size: usize,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub show_ground_truth: bool,
    pub recent_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        generate_default_config()
    }
}

impl Settings {
    /// Loads defaults, `$CONFIG_PATH/{default,local}.toml` and `REPLAY_*` variables.
    pub fn new() -> Result<Self, SettingsError> {
        let settings = Self::load_unchecked()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Same layering as [`Settings::new`], but with one explicit, required file.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let settings = Self::from_file_unchecked(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Layered load without range checks. Callers that apply further
    /// overrides validate once they are done.
    pub fn load_unchecked() -> Result<Self, SettingsError> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());

        info!("Loading configuration from path: {}", config_path);

        let config = Self::defaults()?
            .add_source(File::with_name(&format!("{}/default", config_path)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_path)).required(false))
            .add_source(Self::environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn from_file_unchecked(path: &Path) -> Result<Self, SettingsError> {
        info!("Loading configuration from file: {}", path.display());

        let config = Self::defaults()?
            .add_source(File::from(path))
            .add_source(Self::environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, SettingsError> {
        let d = generate_default_config();
        let builder = Config::builder()
            .set_default("source.root", d.source.root.to_string_lossy().to_string())?
            .set_default("source.series", d.source.series)?
            .set_default("detector.warmup", d.detector.warmup as i64)?
            .set_default("detector.contamination", d.detector.contamination)?
            .set_default("detector.trees", d.detector.trees as i64)?
            .set_default("detector.max_samples", d.detector.max_samples as i64)?
            .set_default("detector.seed", d.detector.seed as i64)?
            .set_default("stream.batch_size", d.stream.batch_size as i64)?
            .set_default("stream.delay_ms", d.stream.delay_ms as i64)?
            .set_default("display.show_ground_truth", d.display.show_ground_truth)?
            .set_default("display.recent_rows", d.display.recent_rows as i64)?
            .set_default("logging.level", d.logging.level)?;
        Ok(builder)
    }

    fn environment() -> Environment {
        Environment::with_prefix("REPLAY")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        check_range(
            "detector.warmup",
            self.detector.warmup as f64,
            WARMUP_RANGE.0 as f64,
            WARMUP_RANGE.1 as f64,
        )?;
        check_range(
            "detector.contamination",
            self.detector.contamination,
            CONTAMINATION_RANGE.0,
            CONTAMINATION_RANGE.1,
        )?;
        check_range(
            "stream.batch_size",
            self.stream.batch_size as f64,
            BATCH_SIZE_RANGE.0 as f64,
            BATCH_SIZE_RANGE.1 as f64,
        )?;
        check_range(
            "stream.delay_ms",
            self.stream.delay_ms as f64,
            DELAY_MS_RANGE.0 as f64,
            DELAY_MS_RANGE.1 as f64,
        )?;
        check_range("detector.trees", self.detector.trees as f64, 1.0, 10_000.0)?;
        check_range(
            "detector.max_samples",
            self.detector.max_samples as f64,
            2.0,
            1_000_000.0,
        )?;
        Ok(())
    }

    pub fn series_path(&self) -> PathBuf {
        self.source.root.join("data").join(&self.source.series)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.source
            .labels
            .clone()
            .unwrap_or_else(|| self.source.root.join(LABELS_RELATIVE_PATH))
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), SettingsError> {
    if value.is_nan() || value < min || value > max {
        return Err(SettingsError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

pub fn generate_default_config() -> Settings {
    Settings {
        source: SourceSettings {
            root: PathBuf::from("../NAB"),
            series: "realKnownCause/machine_temperature_system_failure.csv".to_string(),
            labels: None,
        },
        detector: DetectorSettings {
            warmup: 500,
            contamination: 0.01,
            trees: 200,
            max_samples: 256,
            seed: 42,
            threshold: None,
        },
        stream: StreamSettings {
            batch_size: 5,
            delay_ms: 20,
        },
        display: DisplaySettings {
            show_ground_truth: true,
            recent_rows: 50,
        },
        logging: LoggingSettings {
            level: "info".to_string(),
            file: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.series_path(),
            PathBuf::from("../NAB/data/realKnownCause/machine_temperature_system_failure.csv")
        );
        assert_eq!(
            settings.labels_path(),
            PathBuf::from("../NAB/labels/combined_windows.json")
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut settings = Settings::default();
        settings.stream.batch_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::OutOfRange { field: "stream.batch_size", .. })
        ));

        let mut settings = Settings::default();
        settings.detector.contamination = 0.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.stream.delay_ms = 501;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.detector.warmup = 49;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[stream]\nbatch_size = 12\ndelay_ms = 0").unwrap();
        writeln!(file, "[source]\nroot = \"/srv/nab\"").unwrap();
        writeln!(file, "series = \"artificialWithAnomaly/a.csv\"").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.stream.batch_size, 12);
        assert_eq!(settings.stream.delay_ms, 0);
        assert_eq!(settings.detector.warmup, 500);
        assert_eq!(
            settings.series_path(),
            PathBuf::from("/srv/nab/data/artificialWithAnomaly/a.csv")
        );
    }

    #[test]
    fn unchecked_load_defers_range_checks() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[stream]\nbatch_size = 100").unwrap();

        assert!(Settings::from_file(file.path()).is_err());
        let settings = Settings::from_file_unchecked(file.path()).unwrap();
        assert_eq!(settings.stream.batch_size, 100);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn default_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&generate_default_config()).unwrap();
        assert!(rendered.contains("[detector]"));
        assert!(rendered.contains("contamination = 0.01"));
    }
}
