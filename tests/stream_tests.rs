use anomaly_replay::data::Series;
use anomaly_replay::monitoring::{IsolationForest, IsolationForestConfig, OutlierDetector};
use anomaly_replay::stream::{paced_batches, Batch, BatchStreamer};
use chrono::{Duration as ChronoDuration, NaiveDate};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn ramp(n: usize) -> Arc<Series> {
    let base = NaiveDate::from_ymd_opt(2014, 2, 14)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap();
    Arc::new(Series::from_points(
        (0..n).map(|i| (base + ChronoDuration::minutes(5 * i as i64), (i % 17) as f64)),
    ))
}

#[tokio::test]
async fn paced_stream_matches_blocking_streamer() {
    let series = ramp(103);

    let paced: Vec<Batch> = paced_batches(series.clone(), 20..103, 8, Duration::from_millis(1))
        .collect()
        .await;
    let blocking: Vec<Batch> =
        BatchStreamer::new(series.clone(), 20..103, 8, Duration::ZERO).collect();

    assert_eq!(paced.len(), 11);
    assert_eq!(paced, blocking);

    let values: Vec<f64> = paced.iter().flat_map(|b| b.values.clone()).collect();
    assert_eq!(values, series.values_in(20..103));
    assert_eq!(paced.last().map(|b| b.len()), Some(3));
}

#[tokio::test]
async fn concurrent_replays_do_not_interfere() {
    let series = ramp(64);
    let handles: Vec<_> = (1..=4usize)
        .map(|b| {
            let series = series.clone();
            tokio::spawn(async move {
                paced_batches(series, 0..64, b, Duration::ZERO)
                    .map(|batch| batch.len())
                    .collect::<Vec<_>>()
                    .await
            })
        })
        .collect();

    for (b, sizes) in (1..=4usize).zip(futures::future::join_all(handles).await) {
        let sizes = sizes.unwrap();
        assert_eq!(sizes.len(), 64usize.div_ceil(b));
        assert_eq!(sizes.iter().sum::<usize>(), 64);
    }
}

#[test]
fn same_seed_gives_same_scores() {
    let series = ramp(600);
    let (train, query) = series.values().split_at(400);

    let fit = |seed| {
        let mut forest = IsolationForest::new(IsolationForestConfig {
            seed,
            ..Default::default()
        })
        .unwrap();
        forest.fit(train).unwrap();
        forest
    };

    let a = fit(42).score(query).unwrap();
    let b = fit(42).score(query).unwrap();
    assert_eq!(a, b);
    assert_eq!(fit(42).boundary(), fit(42).boundary());

    let outlier = fit(42).score(&[16.0, 500.0]).unwrap();
    assert!(outlier[1] > outlier[0]);
}
