//! Ground-truth anomaly windows keyed by series identifier.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use super::series::{parse_timestamp, Series};
use crate::errors::LabelError;

/// Closed interval: both `start` and `end` belong to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl AnomalyWindow {
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Raw `combined_windows.json`: identifier -> list of [start, end] strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct LabelStore {
    windows: HashMap<String, Vec<[String; 2]>>,
}

impl LabelStore {
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        if !path.exists() {
            return Err(LabelError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store: LabelStore = serde_json::from_reader(BufReader::new(file))?;
        info!(path = %path.display(), series = store.len(), "Loaded label store");
        Ok(store)
    }

    pub fn from_json(raw: &str) -> Result<Self, LabelError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, series: &str) -> bool {
        self.raw_windows(series).is_some()
    }

    /// Parsed windows for `series`; empty when the identifier is unknown.
    pub fn windows_for(&self, series: &str) -> Result<Vec<AnomalyWindow>, LabelError> {
        let Some(raw) = self.raw_windows(series) else {
            debug!(series, "No windows recorded for series");
            return Ok(Vec::new());
        };

        raw.iter()
            .map(|[start, end]| {
                let parse = |s: &String| {
                    parse_timestamp(s).ok_or_else(|| LabelError::BadTimestamp {
                        series: series.to_string(),
                        raw: s.clone(),
                    })
                };
                let window = AnomalyWindow {
                    start: parse(start)?,
                    end: parse(end)?,
                };
                if window.start > window.end {
                    return Err(LabelError::InvertedWindow {
                        series: series.to_string(),
                        start: start.clone(),
                        end: end.clone(),
                    });
                }
                Ok(window)
            })
            .collect()
    }

    fn raw_windows(&self, series: &str) -> Option<&Vec<[String; 2]>> {
        if let Some(raw) = self.windows.get(series) {
            return Some(raw);
        }
        let normalized = normalize_identifier(series);
        self.windows
            .iter()
            .find(|(key, _)| normalize_identifier(key) == normalized)
            .map(|(_, raw)| raw)
    }
}

fn normalize_identifier(id: &str) -> String {
    let id = id.replace('\\', "/");
    id.trim_start_matches("./").to_string()
}

/// One flag per series point: true iff the timestamp lies inside any window.
pub fn ground_truth_mask(series: &Series, windows: &[AnomalyWindow]) -> Vec<bool> {
    series
        .timestamps()
        .iter()
        .map(|&ts| windows.iter().any(|w| w.contains(ts)))
        .collect()
}
