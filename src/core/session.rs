//! Replay session: LOADING -> WARMUP_FIT -> STREAMING -> DONE, or ERROR.
//!
//! The session is the only owner of the detector and the prediction log.
//! Front-ends pull batches from it, hand them back through [`ReplaySession::ingest`]
//! and read [`Snapshot`]s for display.

use chrono::NaiveDateTime;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::data::{ground_truth_mask, AnomalyWindow, LabelStore, Series};
use crate::errors::{LabelError, LoadError, ReplayError, ReplayResult};
use crate::monitoring::{
    ConfusionMatrix, DetectionMetrics, IsolationForest, IsolationForestConfig, OutlierDetector,
};
use crate::stream::{self, Batch, BatchStreamer};
use crate::with_context;

const SUMMARY_FLAGGED_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    WarmupFit,
    Streaming,
    Done,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Loading => write!(f, "loading"),
            Phase::WarmupFit => write!(f, "warm-up fit"),
            Phase::Streaming => write!(f, "streaming"),
            Phase::Done => write!(f, "done"),
            Phase::Error => write!(f, "error"),
        }
    }
}

/// Ground-truth flags aligned to the series.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    pub windows: Vec<AnomalyWindow>,
    pub mask: Vec<bool>,
    /// False when the overlay is off or no windows could be read for this series.
    pub available: bool,
}

impl GroundTruth {
    pub fn unavailable(len: usize) -> Self {
        Self {
            windows: Vec::new(),
            mask: vec![false; len],
            available: false,
        }
    }

    pub fn at(&self, index: usize) -> Option<bool> {
        self.available
            .then(|| self.mask.get(index).copied().unwrap_or(false))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub score: f64,
    pub predicted: bool,
    pub actual: Option<bool>,
}

/// Append-only record of everything scored so far.
#[derive(Debug, Clone, Default)]
pub struct PredictionLog {
    points: Vec<ScoredPoint>,
    anomalies: usize,
    confusion: ConfusionMatrix,
}

impl PredictionLog {
    pub fn record(&mut self, point: ScoredPoint) {
        if point.predicted {
            self.anomalies += 1;
        }
        if let Some(actual) = point.actual {
            self.confusion.record(point.predicted, actual);
        }
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ScoredPoint] {
        &self.points
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies
    }

    pub fn flagged(&self) -> impl Iterator<Item = &ScoredPoint> {
        self.points.iter().filter(|p| p.predicted)
    }

    pub fn confusion(&self) -> ConfusionMatrix {
        self.confusion
    }
}

/// One row of the recent-points table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentRow {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    /// None for warm-up rows, which are never scored.
    pub score: Option<f64>,
    pub predicted: bool,
    pub actual: Option<bool>,
}

/// Display aggregates after the latest batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub points_streamed: usize,
    pub anomalies_flagged: usize,
    pub series_length: usize,
    pub warmup: usize,
    pub metrics: Option<DetectionMetrics>,
    pub recent: Vec<RecentRow>,
}

impl Snapshot {
    pub fn progress(&self) -> f64 {
        if self.series_length == 0 {
            0.0
        } else {
            self.points_streamed as f64 / self.series_length as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub session_id: Uuid,
    pub series: String,
    pub phase: Phase,
    pub series_length: usize,
    pub warmup: usize,
    pub points_streamed: usize,
    pub anomalies_flagged: usize,
    pub flagged: Vec<NaiveDateTime>,
    pub ground_truth_available: bool,
    pub metrics: Option<DetectionMetrics>,
    pub confusion: Option<ConfusionMatrix>,
    pub warnings: Vec<String>,
}

pub struct ReplaySession {
    id: Uuid,
    settings: Settings,
    phase: Phase,
    series: Arc<Series>,
    ground_truth: GroundTruth,
    detector: IsolationForest,
    warmup: usize,
    log: PredictionLog,
    warnings: Vec<String>,
    failure: Option<String>,
}

impl ReplaySession {
    pub fn new(settings: Settings) -> ReplayResult<Self> {
        settings.validate()?;
        let detector = IsolationForest::new(IsolationForestConfig {
            trees: settings.detector.trees,
            max_samples: settings.detector.max_samples,
            contamination: settings.detector.contamination,
            seed: settings.detector.seed,
        })?;

        let id = Uuid::new_v4();
        info!(session = %id, series = %settings.source.series, "Replay session created");

        Ok(Self {
            id,
            settings,
            phase: Phase::Loading,
            series: Arc::new(Series::from_points(Vec::new())),
            ground_truth: GroundTruth::default(),
            detector,
            warmup: 0,
            log: PredictionLog::default(),
            warnings: Vec::new(),
            failure: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn ground_truth(&self) -> &GroundTruth {
        &self.ground_truth
    }

    pub fn log(&self) -> &PredictionLog {
        &self.log
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Message of the error that ended the session, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Warm-up prefix plus every point scored so far.
    pub fn points_streamed(&self) -> usize {
        self.warmup + self.log.len()
    }

    fn expect_phase(&self, expected: Phase, operation: &'static str) -> ReplayResult<()> {
        if self.phase != expected {
            return Err(ReplayError::InvalidPhase {
                operation,
                phase: self.phase.to_string(),
            });
        }
        Ok(())
    }

    fn fail(&mut self, error: ReplayError) -> ReplayError {
        self.phase = Phase::Error;
        self.failure = Some(error.to_string());
        error
    }

    fn warn(&mut self, message: String) {
        warn!(session = %self.id, "{}", message);
        self.warnings.push(message);
    }

    /// LOADING: read the series (fatal on failure) and, optionally, ground truth.
    pub fn load(&mut self) -> ReplayResult<()> {
        self.expect_phase(Phase::Loading, "load")?;

        let series_path = self.settings.series_path();
        let series = match with_context!(Series::load_csv(&series_path), "load series") {
            Ok(series) => series,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.ground_truth = if self.settings.display.show_ground_truth {
            self.load_ground_truth(&series)
        } else {
            GroundTruth::unavailable(series.len())
        };
        self.series = Arc::new(series);
        self.phase = Phase::WarmupFit;
        Ok(())
    }

    fn load_ground_truth(&mut self, series: &Series) -> GroundTruth {
        let labels_path = self.settings.labels_path();
        let id = self.settings.source.series.clone();

        let windows = LabelStore::load(&labels_path).and_then(|store| {
            if store.contains(&id) {
                store.windows_for(&id).map(Some)
            } else {
                Ok(None)
            }
        });

        match windows {
            Ok(Some(windows)) => {
                let mask = ground_truth_mask(series, &windows);
                info!(
                    windows = windows.len(),
                    labelled = mask.iter().filter(|&&m| m).count(),
                    "Ground truth ready"
                );
                GroundTruth {
                    windows,
                    mask,
                    available: true,
                }
            }
            Ok(None) => {
                self.warn(format!(
                    "No label windows recorded for '{}'; ground truth unavailable",
                    id
                ));
                GroundTruth::unavailable(series.len())
            }
            Err(e @ LabelError::NotFound { .. }) => {
                self.warn(format!("{}; ground truth unavailable", e));
                GroundTruth::unavailable(series.len())
            }
            Err(e) => {
                self.warn(format!("Could not read labels: {}; ground truth unavailable", e));
                GroundTruth::unavailable(series.len())
            }
        }
    }

    /// WARMUP_FIT: clamp the warm-up to the series and fit the detector once.
    pub fn fit_warmup(&mut self) -> ReplayResult<usize> {
        self.expect_phase(Phase::WarmupFit, "fit the warm-up")?;

        let len = self.series.len();
        if len == 0 {
            return Err(self.fail(LoadError::Empty.into()));
        }
        let requested = self.settings.detector.warmup;
        let warmup = if requested >= len {
            let clamped = (len / 5).max(1);
            self.warn(format!(
                "Warm-up of {} points exceeds series length {}; using {}",
                requested, len, clamped
            ));
            clamped
        } else {
            requested
        };

        let sample = self.series.values_in(0..warmup).to_vec();
        if let Err(e) = with_context!(self.detector.fit(&sample), "fit warm-up") {
            return Err(self.fail(e.into()));
        }

        self.warmup = warmup;
        self.phase = Phase::Streaming;
        info!(session = %self.id, warmup, remaining = len - warmup, "Streaming started");
        Ok(warmup)
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.settings.stream.delay_ms)
    }

    /// Blocking batches over everything after the warm-up prefix.
    pub fn batches(&self) -> ReplayResult<BatchStreamer> {
        self.expect_phase(Phase::Streaming, "stream")?;
        Ok(BatchStreamer::new(
            Arc::clone(&self.series),
            self.warmup..self.series.len(),
            self.settings.stream.batch_size,
            self.delay(),
        ))
    }

    /// Same batches as [`ReplaySession::batches`], paced on the tokio timer.
    pub fn paced_batches(&self) -> ReplayResult<impl Stream<Item = Batch>> {
        self.expect_phase(Phase::Streaming, "stream")?;
        Ok(stream::paced_batches(
            Arc::clone(&self.series),
            self.warmup..self.series.len(),
            self.settings.stream.batch_size,
            self.delay(),
        ))
    }

    /// STREAMING: score one batch and fold it into the log. Returns the points flagged.
    pub fn ingest(&mut self, batch: &Batch) -> ReplayResult<usize> {
        self.expect_phase(Phase::Streaming, "ingest")?;

        let threshold = self.settings.detector.threshold;
        let (scores, labels) = self.detector.score_and_label(&batch.values, threshold)?;

        let mut flagged = 0;
        for (i, ((&timestamp, &value), (score, predicted))) in batch
            .timestamps
            .iter()
            .zip(&batch.values)
            .zip(scores.into_iter().zip(labels))
            .enumerate()
        {
            let index = batch.offset + i;
            if predicted {
                flagged += 1;
                debug!(index, %timestamp, value, score, "Point flagged");
            }
            self.log.record(ScoredPoint {
                index,
                timestamp,
                value,
                score,
                predicted,
                actual: self.ground_truth.at(index),
            });
        }
        Ok(flagged)
    }

    /// STREAMING -> DONE.
    pub fn finish(&mut self) -> ReplayResult<()> {
        self.expect_phase(Phase::Streaming, "finish")?;
        self.phase = Phase::Done;
        info!(
            session = %self.id,
            scored = self.log.len(),
            anomalies = self.log.anomaly_count(),
            "Replay complete"
        );
        Ok(())
    }

    /// Drives whatever phases remain to DONE with the paced stream.
    pub async fn replay(&mut self) -> ReplayResult<()> {
        if self.phase == Phase::Loading {
            self.load()?;
        }
        if self.phase == Phase::WarmupFit {
            self.fit_warmup()?;
        }
        let mut batches = Box::pin(self.paced_batches()?);
        while let Some(batch) = batches.next().await {
            self.ingest(&batch)?;
        }
        self.finish()
    }

    pub fn metrics(&self) -> Option<DetectionMetrics> {
        self.ground_truth
            .available
            .then(|| self.log.confusion().metrics())
    }

    pub fn snapshot(&self) -> Snapshot {
        let shown = self.points_streamed().min(self.series.len());
        let depth = self.settings.display.recent_rows;
        let start = shown.saturating_sub(depth);

        let recent = (start..shown)
            .map(|index| {
                let scored = index
                    .checked_sub(self.warmup)
                    .and_then(|i| self.log.points().get(i));
                RecentRow {
                    index,
                    timestamp: self.series.timestamps()[index],
                    value: self.series.values()[index],
                    score: scored.map(|p| p.score),
                    predicted: scored.map(|p| p.predicted).unwrap_or(false),
                    actual: self.ground_truth.at(index),
                }
            })
            .collect();

        Snapshot {
            phase: self.phase,
            points_streamed: shown,
            anomalies_flagged: self.log.anomaly_count(),
            series_length: self.series.len(),
            warmup: self.warmup,
            metrics: self.metrics(),
            recent,
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            session_id: self.id,
            series: self.settings.source.series.clone(),
            phase: self.phase,
            series_length: self.series.len(),
            warmup: self.warmup,
            points_streamed: self.points_streamed().min(self.series.len()),
            anomalies_flagged: self.log.anomaly_count(),
            flagged: self
                .log
                .flagged()
                .take(SUMMARY_FLAGGED_LIMIT)
                .map(|p| p.timestamp)
                .collect(),
            ground_truth_available: self.ground_truth.available,
            metrics: self.metrics(),
            confusion: self
                .ground_truth
                .available
                .then(|| self.log.confusion()),
            warnings: self.warnings.clone(),
        }
    }
}
