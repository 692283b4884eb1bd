/*
* Isolation forest over 1-D samples.
*
* Each tree is grown on a random sub-sample of the warm-up data by picking a
* split uniformly between the node's min and max until the node is a single
* value or the height limit is reached. Anomalies are isolated in fewer splits,
* so a short average path means a high score:
*
*     s(x) = 2 ^ (-E[h(x)] / c(psi))
*
* c(n) is the expected path length of an unsuccessful BST search over n items
* and corrects leaves that still hold several samples.
*
* Nodes remember the range of the samples that reached them. A query outside
* that range is isolated right there, which lets a forest fitted on constant
* data still separate any other value.
*
* The intrinsic boundary is the (1 - contamination) quantile of the training
* scores: score(x) = s(x) - boundary, positive means anomalous.
*/

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::errors::DetectorError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Fit once on presumed-normal data, then query.
pub trait OutlierDetector {
    fn fit(&mut self, sample: &[f64]) -> Result<(), DetectorError>;

    /// Higher means more anomalous. Does not mutate the model.
    fn score(&self, values: &[f64]) -> Result<Vec<f64>, DetectorError>;

    /// Binary flags. `None` uses the intrinsic boundary (score > 0);
    /// `Some(t)` flags score >= t.
    fn label(&self, values: &[f64], threshold: Option<f64>) -> Result<Vec<bool>, DetectorError> {
        self.score_and_label(values, threshold).map(|(_, labels)| labels)
    }

    /// Scores and flags in one pass, using the same rule as [`OutlierDetector::label`].
    fn score_and_label(
        &self,
        values: &[f64],
        threshold: Option<f64>,
    ) -> Result<(Vec<f64>, Vec<bool>), DetectorError> {
        let scores = self.score(values)?;
        let labels = scores
            .iter()
            .map(|&s| match threshold {
                None => s > 0.0,
                Some(t) => s >= t,
            })
            .collect();
        Ok((scores, labels))
    }

    fn is_fitted(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct IsolationForestConfig {
    pub trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            trees: 200,
            max_samples: 256,
            contamination: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
        min: f64,
        max: f64,
    },
    Split {
        threshold: f64,
        min: f64,
        max: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(sample: &[f64], height_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: grow_node(sample, 0, height_limit, rng),
        }
    }

    fn path_length(&self, x: f64) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                Node::Leaf { size, min, max } => {
                    if x < *min || x > *max {
                        return depth as f64 + 1.0;
                    }
                    return depth as f64 + average_path_length(*size);
                }
                Node::Split {
                    threshold,
                    min,
                    max,
                    left,
                    right,
                } => {
                    if x < *min || x > *max {
                        return depth as f64 + 1.0;
                    }
                    node = if x <= *threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

fn grow_node(sample: &[f64], depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
    let (min, max) = sample
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if depth >= height_limit || sample.len() <= 1 || min >= max {
        return Node::Leaf {
            size: sample.len(),
            min,
            max,
        };
    }

    // [min, max) keeps both sides non-empty with `<=` routing
    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<f64>, Vec<f64>) = sample.iter().partition(|&&v| v <= threshold);

    Node::Split {
        threshold,
        min,
        max,
        left: Box::new(grow_node(&left, depth + 1, height_limit, rng)),
        right: Box::new(grow_node(&right, depth + 1, height_limit, rng)),
    }
}

/// c(n): average path length of an unsuccessful search in a BST of n nodes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
struct FittedForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    boundary: f64,
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    fitted: Option<FittedForest>,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig) -> Result<Self, DetectorError> {
        if !(config.contamination > 0.0 && config.contamination < 1.0) {
            return Err(DetectorError::InvalidContamination(config.contamination));
        }
        Ok(Self {
            config,
            fitted: None,
        })
    }

    pub fn config(&self) -> &IsolationForestConfig {
        &self.config
    }

    /// Raw-score cutoff derived from contamination, once fitted.
    pub fn boundary(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.boundary)
    }

    fn raw_scores(forest: &FittedForest, values: &[f64]) -> Vec<f64> {
        let norm = average_path_length(forest.sample_size).max(1.0);
        values
            .iter()
            .map(|&x| {
                let mean_path = forest.trees.iter().map(|t| t.path_length(x)).sum::<f64>()
                    / forest.trees.len() as f64;
                2f64.powf(-mean_path / norm)
            })
            .collect()
    }
}

impl OutlierDetector for IsolationForest {
    fn fit(&mut self, sample: &[f64]) -> Result<(), DetectorError> {
        if self.fitted.is_some() {
            return Err(DetectorError::AlreadyFitted);
        }
        if sample.is_empty() {
            return Err(DetectorError::EmptySample);
        }
        check_finite(sample)?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let sample_size = self.config.max_samples.min(sample.len()).max(1);
        let height_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees: Vec<IsolationTree> = (0..self.config.trees.max(1))
            .map(|_| {
                let sub: Vec<f64> = index::sample(&mut rng, sample.len(), sample_size)
                    .into_iter()
                    .map(|i| sample[i])
                    .collect();
                IsolationTree::grow(&sub, height_limit, &mut rng)
            })
            .collect();

        let mut forest = FittedForest {
            trees,
            sample_size,
            boundary: 0.0,
        };
        let mut training = Self::raw_scores(&forest, sample);
        training.sort_by(f64::total_cmp);
        forest.boundary = quantile_sorted(&training, 1.0 - self.config.contamination);

        info!(
            trees = forest.trees.len(),
            sample_size,
            height_limit,
            boundary = forest.boundary,
            "Isolation forest fitted"
        );
        self.fitted = Some(forest);
        Ok(())
    }

    fn score(&self, values: &[f64]) -> Result<Vec<f64>, DetectorError> {
        let forest = self.fitted.as_ref().ok_or(DetectorError::NotFitted)?;
        check_finite(values)?;
        let scores: Vec<f64> = Self::raw_scores(forest, values)
            .into_iter()
            .map(|s| s - forest.boundary)
            .collect();
        debug!(points = scores.len(), "Scored values");
        Ok(scores)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

fn check_finite(values: &[f64]) -> Result<(), DetectorError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(DetectorError::NonFinite(i)),
        None => Ok(()),
    }
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let a = sorted[lo];
            let b = sorted[hi];
            a + (b - a) * (pos - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest(contamination: f64) -> IsolationForest {
        IsolationForest::new(IsolationForestConfig {
            contamination,
            ..Default::default()
        })
        .unwrap()
    }

    /// Deterministic bell-shaped sample centred on 10.0, spread over [8.5, 11.5].
    fn bell(n: usize) -> Vec<f64> {
        let frac = |x: f64| x - x.floor();
        (0..n)
            .map(|i| {
                let i = i as f64;
                10.0 + frac(i * 0.618_033_988_7) + frac(i * 0.414_213_562_4)
                    + frac(i * 0.732_050_807_6)
                    - 1.5
            })
            .collect()
    }

    #[test]
    fn average_path_length_matches_known_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.2448).abs() < 1e-3, "c(256) = {c256}");
    }

    #[test]
    fn quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&v, 0.0), 1.0);
        assert_eq!(quantile_sorted(&v, 1.0), 5.0);
        assert_eq!(quantile_sorted(&v, 0.5), 3.0);
        assert!((quantile_sorted(&v, 0.9) - 4.6).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_configuration_and_usage() {
        assert_eq!(
            IsolationForest::new(IsolationForestConfig {
                contamination: 0.0,
                ..Default::default()
            })
            .unwrap_err(),
            DetectorError::InvalidContamination(0.0)
        );

        let mut model = forest(0.01);
        assert_eq!(model.score(&[1.0]).unwrap_err(), DetectorError::NotFitted);
        assert_eq!(model.fit(&[]).unwrap_err(), DetectorError::EmptySample);
        assert_eq!(
            model.fit(&[1.0, f64::NAN]).unwrap_err(),
            DetectorError::NonFinite(1)
        );
        model.fit(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(model.fit(&[1.0]).unwrap_err(), DetectorError::AlreadyFitted);
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let train = bell(400);
        let query = [9.0, 10.0, 10.5, 42.0, -3.0];

        let mut a = forest(0.01);
        a.fit(&train).unwrap();
        let mut b = forest(0.01);
        b.fit(&train).unwrap();

        assert_eq!(a.score(&query).unwrap(), b.score(&query).unwrap());
        assert_eq!(a.score(&query).unwrap(), a.score(&query).unwrap());
    }

    #[test]
    fn far_outliers_score_higher_than_inliers() {
        let mut model = forest(0.01);
        model.fit(&bell(500)).unwrap();

        let scores = model.score(&[10.0, 1000.0, -500.0]).unwrap();
        assert!(scores[1] > scores[0]);
        assert!(scores[2] > scores[0]);

        let labels = model.label(&[10.0, 1000.0, -500.0], None).unwrap();
        assert_eq!(labels, vec![false, true, true]);
    }

    #[test]
    fn constant_training_data_still_isolates_other_values() {
        let mut model = forest(0.01);
        model.fit(&vec![10.0; 500]).unwrap();

        let labels = model.label(&[10.0, 10.0, 1000.0, 9.99], None).unwrap();
        assert_eq!(labels, vec![false, false, true, true]);
    }

    #[test]
    fn contamination_sets_training_flag_rate() {
        let train = bell(1000);
        let mut model = forest(0.05);
        model.fit(&train).unwrap();

        let flagged = model.label(&train, None).unwrap().iter().filter(|&&f| f).count();
        assert!(flagged <= 60, "flagged {flagged} of 1000");
    }

    #[test]
    fn explicit_threshold_uses_score() {
        let mut model = forest(0.01);
        model.fit(&bell(300)).unwrap();
        let scores = model.score(&[10.0, 500.0]).unwrap();

        let labels = model.label(&[10.0, 500.0], Some(scores[1])).unwrap();
        assert_eq!(labels, vec![false, true]);
        let everything = model.label(&[10.0, 500.0], Some(f64::NEG_INFINITY)).unwrap();
        assert_eq!(everything, vec![true, true]);
    }
}
