//! Timestamped value series loaded from CSV.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::LoadError;

const TIMESTAMP_COLUMN: &str = "timestamp";
const VALUE_COLUMN: &str = "value";

// Lowest column index other than `taken`.
fn first_free(taken: usize) -> usize {
    if taken == 0 {
        1
    } else {
        0
    }
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Parses the timestamp spellings found in series and label files.
///
/// Offsets (RFC 3339) are normalised to UTC; bare dates map to midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Ordered, duplicate-free (timestamp, value) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    timestamps: Vec<NaiveDateTime>,
    values: Vec<f64>,
}

impl Series {
    /// Builds a series from unordered pairs: stable sort, first occurrence of a timestamp wins.
    pub fn from_points(points: impl IntoIterator<Item = (NaiveDateTime, f64)>) -> Self {
        let mut points: Vec<(NaiveDateTime, f64)> = points.into_iter().collect();
        points.sort_by_key(|(ts, _)| *ts);
        points.dedup_by_key(|(ts, _)| *ts);

        let (timestamps, values) = points.into_iter().unzip();
        Self { timestamps, values }
    }

    /// Reads `path`, taking the `timestamp`/`value` columns or else the first two.
    pub fn load_csv(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(LoadError::MissingColumns {
                found: headers.len(),
            });
        }
        let named = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (ts_idx, val_idx) = match (named(TIMESTAMP_COLUMN), named(VALUE_COLUMN)) {
            (Some(ts), Some(val)) => (ts, val),
            (Some(ts), None) => (ts, first_free(ts)),
            (None, Some(val)) => (first_free(val), val),
            (None, None) => (0, 1),
        };
        debug!(ts_idx, val_idx, "Resolved series columns");

        let mut points = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            let raw_ts = record.get(ts_idx).unwrap_or_default();
            let ts = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
                line,
                raw: raw_ts.to_string(),
            })?;

            let raw_val = record.get(val_idx).unwrap_or_default();
            let value = raw_val
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| LoadError::BadValue {
                    line,
                    raw: raw_val.to_string(),
                })?;

            points.push((ts, value));
        }

        if points.is_empty() {
            return Err(LoadError::Empty);
        }

        let rows = points.len();
        let series = Self::from_points(points);
        info!(
            path = %path.display(),
            rows,
            kept = series.len(),
            "Loaded series"
        );
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps_in(&self, range: Range<usize>) -> &[NaiveDateTime] {
        &self.timestamps[range]
    }

    pub fn values_in(&self, range: Range<usize>) -> &[f64] {
        &self.values[range]
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }
}
