pub mod session;

pub use session::{
    GroundTruth, Phase, PredictionLog, RecentRow, ReplaySession, ScoredPoint, Snapshot, Summary,
};
