use anomaly_replay::config::Settings;
use anomaly_replay::core::{Phase, ReplaySession};
use anomaly_replay::errors::{LoadError, ReplayError};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SERIES: &str = "realKnownCause/spike.csv";

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 12, 31)
        .unwrap()
        .and_hms_opt(23, 0, 0)
        .unwrap()
}

// Lays out <root>/data/<SERIES> one point per minute, plus an optional label file.
fn corpus(values: &[f64], labels: Option<&str>) -> anyhow::Result<TempDir> {
    let root = tempfile::tempdir()?;
    let csv_path = root.path().join("data").join(SERIES);
    fs::create_dir_all(csv_path.parent().unwrap())?;

    let mut body = String::from("timestamp,value\n");
    for (i, v) in values.iter().enumerate() {
        let ts = start() + Duration::minutes(i as i64);
        body.push_str(&format!("{},{}\n", ts.format("%Y-%m-%d %H:%M:%S"), v));
    }
    fs::write(&csv_path, body)?;

    if let Some(labels) = labels {
        let labels_dir = root.path().join("labels");
        fs::create_dir_all(&labels_dir)?;
        fs::write(labels_dir.join("combined_windows.json"), labels)?;
    }
    Ok(root)
}

fn settings_for(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.source.root = root.to_path_buf();
    settings.source.series = SERIES.to_string();
    settings.detector.warmup = 500;
    settings.detector.contamination = 0.01;
    settings.stream.delay_ms = 0;
    settings
}

fn spike_values() -> Vec<f64> {
    let mut values = vec![10.0; 1000];
    values[750] = 1000.0;
    values
}

#[tokio::test]
async fn spike_after_flat_warmup_is_flagged() -> anyhow::Result<()> {
    let root = corpus(&spike_values(), Some("{}"))?;
    let mut session = ReplaySession::new(settings_for(root.path()))?;

    session.replay().await?;

    assert_eq!(session.phase(), Phase::Done);
    assert_eq!(session.warmup(), 500);
    assert_eq!(session.log().len(), 500);
    assert_eq!(session.points_streamed(), 1000);

    let flagged: Vec<usize> = session.log().flagged().map(|p| p.index).collect();
    assert!(flagged.contains(&750), "flagged: {:?}", flagged);
    assert!(flagged.len() <= 5, "flagged: {:?}", flagged);

    let summary = session.summary();
    assert_eq!(summary.flagged[0], start() + Duration::minutes(750));
    Ok(())
}

#[tokio::test]
async fn label_windows_include_both_endpoints() -> anyhow::Result<()> {
    // minutes 60..=62 fall inside; 59 and 63 sit outside the window
    let labels = format!(
        r#"{{"{}": [["2020-01-01T00:00:00", "2020-01-01T00:02:00"]]}}"#,
        SERIES
    );
    let mut values = vec![1.0; 120];
    values[61] = 80.0;
    let root = corpus(&values, Some(&labels))?;

    let mut settings = settings_for(root.path());
    settings.detector.warmup = 50;
    let mut session = ReplaySession::new(settings)?;
    session.replay().await?;

    let truth = session.ground_truth();
    assert!(truth.available);
    let labelled: Vec<usize> = (0..truth.mask.len()).filter(|&i| truth.mask[i]).collect();
    assert_eq!(labelled, vec![60, 61, 62]);
    assert!(session.warnings().is_empty());

    let metrics = session.metrics().expect("metrics with ground truth");
    assert!(metrics.recall > 0.0);
    assert!((0.0..=1.0).contains(&metrics.precision));
    Ok(())
}

#[test]
fn window_edges_to_the_second() -> anyhow::Result<()> {
    use anomaly_replay::data::{ground_truth_mask, LabelStore, Series};

    let store = LabelStore::from_json(
        r#"{"a.csv": [["2020-01-01 00:00:00", "2020-01-01 00:02:00"]]}"#,
    )?;
    let windows = store.windows_for("a.csv")?;
    let base = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let series = Series::from_points(vec![
        (base - Duration::seconds(1), 1.0),
        (base, 1.0),
        (base + Duration::minutes(1), 1.0),
        (base + Duration::minutes(2), 1.0),
        (base + Duration::minutes(2) + Duration::seconds(1), 1.0),
    ]);

    assert_eq!(
        ground_truth_mask(&series, &windows),
        vec![false, true, true, true, false]
    );
    Ok(())
}

#[tokio::test]
async fn missing_series_ends_in_error_phase() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let mut session = ReplaySession::new(settings_for(root.path()))?;

    let outcome = session.replay().await;

    assert!(matches!(
        outcome,
        Err(ReplayError::Load(LoadError::NotFound { .. }))
    ));
    assert_eq!(session.phase(), Phase::Error);
    assert!(session.failure().unwrap_or_default().contains("CSV not found"));
    assert!(session.log().is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_labels_only_warn() -> anyhow::Result<()> {
    let root = corpus(&spike_values(), None)?;
    let mut session = ReplaySession::new(settings_for(root.path()))?;

    session.replay().await?;

    assert_eq!(session.phase(), Phase::Done);
    assert!(!session.ground_truth().available);
    assert!(session.metrics().is_none());
    assert_eq!(session.warnings().len(), 1);
    assert!(session.warnings()[0].contains("ground truth unavailable"));

    let summary = serde_json::to_value(session.summary())?;
    assert_eq!(summary["phase"], "done");
    assert_eq!(summary["ground_truth_available"], false);
    assert!(summary["metrics"].is_null());
    Ok(())
}

#[tokio::test]
async fn unlisted_series_has_no_ground_truth() -> anyhow::Result<()> {
    let root = corpus(
        &spike_values(),
        Some(r#"{"realKnownCause/other.csv": [["2020-01-01 00:00:00", "2020-01-01 01:00:00"]]}"#),
    )?;
    let mut session = ReplaySession::new(settings_for(root.path()))?;

    session.replay().await?;

    assert!(!session.ground_truth().available);
    assert!(session.snapshot().recent.iter().all(|r| r.actual.is_none()));
    assert!(session.warnings()[0].contains("No label windows"));
    Ok(())
}

#[tokio::test]
async fn overlay_off_skips_label_file() -> anyhow::Result<()> {
    let root = corpus(&spike_values(), Some("not json"))?;
    let mut settings = settings_for(root.path());
    settings.display.show_ground_truth = false;
    let mut session = ReplaySession::new(settings)?;

    session.replay().await?;

    assert!(session.warnings().is_empty());
    assert!(session.metrics().is_none());
    Ok(())
}

#[tokio::test]
async fn short_series_clamps_warmup() -> anyhow::Result<()> {
    let root = corpus(&vec![3.0; 200], Some("{}"))?;
    let mut session = ReplaySession::new(settings_for(root.path()))?;

    session.replay().await?;

    assert_eq!(session.warmup(), 40);
    assert_eq!(session.log().len(), 160);
    assert!(session
        .warnings()
        .iter()
        .any(|w| w.contains("exceeds series length")));
    Ok(())
}
