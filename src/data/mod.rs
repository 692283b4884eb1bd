pub mod labels;
pub mod series;

pub use labels::{ground_truth_mask, AnomalyWindow, LabelStore};
pub use series::{parse_timestamp, Series};
