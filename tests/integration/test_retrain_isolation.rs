use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;

use devsim_monitor::{MonitorConfig, MonitorError, MonitorEvent, MonitorService, PredictorError, SourceKind};

use crate::mocks::{RecordingNotifier, ScriptedPredictor, ScriptedSource, SnapshotGenerator};
use crate::utils::{collect_events, scenario_config};
use crate::DEFAULT_TEST_TIMEOUT;

fn predictive_config(interval_ms: u64) -> MonitorConfig {
    let mut config = scenario_config(interval_ms, &[("cpu", 80.0), ("memory", 80.0)], 1);
    config.prediction.enabled = true;
    config
}

fn steady_source(cpu: f64, count: usize) -> Arc<ScriptedSource> {
    let snapshots = SnapshotGenerator::new(1_000).ramp(cpu, 0.0, count);
    Arc::new(ScriptedSource::from_snapshots(snapshots))
}

/// A failed retrain leaves the active model in place and forecasting keeps working
#[tokio::test]
async fn test_failed_retrain_keeps_model() -> Result<()> {
    crate::init_test_environment();

    let predictor = ScriptedPredictor::new(50.0, 90.0).failing_retrain();
    let service = MonitorService::new(
        predictive_config(1_000),
        steady_source(30.0, 4),
        Arc::new(RecordingNotifier::new()),
        Some(Arc::new(predictor.clone())),
    )?;
    let mut events = service.subscribe();

    assert!(service.check_once().await?.forecast.is_some());

    let result = service.retrain_now().await;
    assert!(matches!(
        result,
        Err(MonitorError::Predictor(PredictorError::RetrainFailed { .. }))
    ));
    assert_eq!(service.model_version(), Some(1));
    assert_eq!(predictor.retrain_attempts(), 1);

    let failed = collect_events(&mut events, 1, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, MonitorEvent::RetrainFailed { .. })
    })
    .await?;
    assert_eq!(failed.len(), 1);

    let report = service.check_once().await?;
    let forecast = report.forecast.expect("previous model should still forecast");
    assert_eq!(forecast.predicted_cpu_percent, 50.0);

    let summary = service.metrics_summary();
    assert_eq!(summary.model_version, 1);
    assert_eq!(summary.forecast_failures, 0);
    Ok(())
}

#[tokio::test]
async fn test_successful_retrain_swaps_model() -> Result<()> {
    crate::init_test_environment();

    let service = MonitorService::new(
        predictive_config(1_000),
        steady_source(30.0, 4),
        Arc::new(RecordingNotifier::new()),
        Some(Arc::new(ScriptedPredictor::new(50.0, 90.0))),
    )?;

    service.check_once().await?;
    assert_eq!(service.retrain_now().await?, 2);
    assert_eq!(service.retrain_now().await?, 3);
    assert_eq!(service.model_version(), Some(3));
    assert_eq!(service.metrics_summary().model_version, 3);
    Ok(())
}

#[tokio::test]
async fn test_retrain_timeout_keeps_model() -> Result<()> {
    crate::init_test_environment();

    let mut config = predictive_config(1_000);
    config.prediction.retrain_timeout_ms = 30;

    let service = MonitorService::new(
        config,
        steady_source(30.0, 4),
        Arc::new(RecordingNotifier::new()),
        Some(Arc::new(
            ScriptedPredictor::new(50.0, 90.0).with_retrain_delay(Duration::from_millis(500)),
        )),
    )?;

    let result = service.retrain_now().await;
    assert!(matches!(
        result,
        Err(MonitorError::Predictor(PredictorError::Timeout { .. }))
    ));
    assert_eq!(service.model_version(), Some(1));
    Ok(())
}

/// Sampling keeps its schedule while a retrain is in flight
#[tokio::test]
async fn test_slow_retrain_does_not_block_sampling() -> Result<()> {
    crate::init_test_environment();

    let mut config = predictive_config(10);
    config.prediction.retrain_interval_ms = 20;

    let predictor = ScriptedPredictor::new(50.0, 90.0).with_retrain_delay(Duration::from_millis(300));
    let service = MonitorService::new(
        config,
        steady_source(30.0, 1),
        Arc::new(RecordingNotifier::new()),
        Some(Arc::new(predictor.clone())),
    )?;

    service.start().await?;

    // The first retrain starts at 20ms and holds for 300ms
    sleep(Duration::from_millis(200)).await;
    let ticks_during_retrain = service.status().await.stats.total_ticks;
    assert_eq!(predictor.retrain_attempts(), 1);
    assert_eq!(service.model_version(), Some(1));

    service.stop().await?;

    assert!(
        ticks_during_retrain >= 8,
        "sampling stalled during retrain: {} ticks",
        ticks_during_retrain
    );

    // stop waited for the in-flight retrain, which then swapped
    assert_eq!(service.model_version(), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_forecast_failure_falls_back_to_observed() -> Result<()> {
    crate::init_test_environment();

    let service = MonitorService::new(
        predictive_config(1_000),
        steady_source(95.0, 1),
        Arc::new(RecordingNotifier::new()),
        Some(Arc::new(ScriptedPredictor::new(99.0, 90.0).failing_forecast())),
    )?;
    let mut events = service.subscribe();

    let report = service.check_once().await?;
    assert!(report.forecast.is_none());
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].source, SourceKind::Observed);

    let unavailable = collect_events(&mut events, 1, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, MonitorEvent::ForecastUnavailable { .. })
    })
    .await?;
    assert_eq!(unavailable.len(), 1);

    let state = service.status().await;
    assert_eq!(state.stats.forecast_failures, 1);
    assert_eq!(service.metrics_summary().forecast_failures, 1);
    Ok(())
}

#[tokio::test]
async fn test_slow_forecast_times_out_to_observed() -> Result<()> {
    crate::init_test_environment();

    let mut config = predictive_config(1_000);
    config.prediction.forecast_timeout_ms = 30;

    let service = MonitorService::new(
        config,
        steady_source(95.0, 1),
        Arc::new(RecordingNotifier::new()),
        Some(Arc::new(
            ScriptedPredictor::new(99.0, 90.0).with_forecast_delay(Duration::from_millis(500)),
        )),
    )?;
    let mut events = service.subscribe();

    let started = tokio::time::Instant::now();
    let report = service.check_once().await?;
    assert!(started.elapsed() < Duration::from_millis(400));

    assert!(report.forecast.is_none());
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].source, SourceKind::Observed);

    let unavailable = collect_events(&mut events, 1, DEFAULT_TEST_TIMEOUT, |e| {
        matches!(e, MonitorEvent::ForecastUnavailable { .. })
    })
    .await?;
    match &unavailable[0] {
        MonitorEvent::ForecastUnavailable { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(service.status().await.stats.forecast_failures, 1);
    assert_eq!(service.metrics_summary().forecast_failures, 1);
    Ok(())
}
