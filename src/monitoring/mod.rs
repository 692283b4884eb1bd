pub mod anomaly_detection;
pub mod metrics;

pub use anomaly_detection::{IsolationForest, IsolationForestConfig, OutlierDetector};
pub use metrics::{ConfusionMatrix, DetectionMetrics};
