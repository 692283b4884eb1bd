use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Series Error: {0}")]
    Load(#[from] LoadError),

    #[error("Label Error: {0}")]
    Label(#[from] LabelError),

    #[error("Detector Error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Configuration Error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid session transition: cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: String,
    },
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("CSV not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Expected at least two columns, found {found}")]
    MissingColumns { found: usize },

    #[error("Line {line}: unparseable timestamp '{raw}'")]
    BadTimestamp { line: u64, raw: String },

    #[error("Line {line}: unparseable value '{raw}'")]
    BadValue { line: u64, raw: String },

    #[error("Series is empty")]
    Empty,
}

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Label file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read label file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed label file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Window for '{series}' has unparseable timestamp '{raw}'")]
    BadTimestamp { series: String, raw: String },

    #[error("Window for '{series}' ends before it starts: {start} > {end}")]
    InvertedWindow {
        series: String,
        start: String,
        end: String,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum DetectorError {
    #[error("Contamination must lie in (0, 1), got {0}")]
    InvalidContamination(f64),

    #[error("Cannot fit on an empty sample")]
    EmptySample,

    #[error("Input contains a non-finite value at position {0}")]
    NonFinite(usize),

    #[error("Detector has not been fitted")]
    NotFitted,

    #[error("Detector is already fitted")]
    AlreadyFitted,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
}

// Error context for tracking where a failure surfaced
#[derive(Debug)]
pub struct ErrorContext {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_location: &'static str,
    pub operation: String,
}

pub type ReplayResult<T> = Result<T, ReplayError>;

/// Logs a failed operation with its context, then hands the error back untouched.
#[macro_export]
macro_rules! with_context {
    ($result:expr, $operation:expr) => {
        $result.map_err(|e| {
            let context = $crate::errors::ErrorContext {
                timestamp: chrono::Utc::now(),
                source_location: std::file!(),
                operation: $operation.to_string(),
            };
            tracing::error!(
                error = %e,
                context = ?context,
                "Operation failed"
            );
            e
        })
    };
}
