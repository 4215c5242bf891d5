use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Duration as ChronoDuration;

use devsim_monitor::{HealthStatus, Metric, MonitorService, Severity, SourceKind};

use crate::mocks::{RecordingNotifier, ScriptedPredictor, ScriptedSource, SnapshotGenerator};
use crate::utils::{alert_kinds, scenario_config};

/// interval 1000, threshold {cpu: 80}, hysteresis 2:
/// cpu 85 raises, cpu 50 is quiet, cpu 50 clears
#[tokio::test]
async fn test_hysteresis_scenario() -> Result<()> {
    crate::init_test_environment();

    let snapshots = SnapshotGenerator::new(1_000).cpu_series(&[85.0, 50.0, 50.0]);
    let notifier = RecordingNotifier::new();
    let service = MonitorService::new(
        scenario_config(1_000, &[("cpu", 80.0)], 2),
        Arc::new(ScriptedSource::from_snapshots(snapshots)),
        Arc::new(notifier.clone()),
        None,
    )?;

    let first = service.check_once().await?;
    assert_eq!(alert_kinds(&first.events), vec![("raised", Metric::Cpu)]);

    let second = service.check_once().await?;
    assert!(second.events.is_empty());
    assert_eq!(service.current_alert_states().await.len(), 1);

    let third = service.check_once().await?;
    assert_eq!(alert_kinds(&third.events), vec![("cleared", Metric::Cpu)]);
    assert!(service.current_alert_states().await.is_empty());

    assert_eq!(
        notifier.kinds(),
        vec![("raised", Metric::Cpu), ("cleared", Metric::Cpu)]
    );
    Ok(())
}

/// Warning, Warning, Critical yields Raised, nothing, Escalated
#[tokio::test]
async fn test_escalation_sequence() -> Result<()> {
    crate::init_test_environment();

    let snapshots = SnapshotGenerator::new(1_000).cpu_series(&[85.0, 86.0, 99.0, 85.0]);
    let service = MonitorService::new(
        scenario_config(1_000, &[("cpu", 80.0)], 1),
        Arc::new(ScriptedSource::from_snapshots(snapshots)),
        Arc::new(RecordingNotifier::new()),
        None,
    )?;

    let kinds: Vec<_> = {
        let mut kinds = Vec::new();
        for _ in 0..3 {
            kinds.push(alert_kinds(&service.check_once().await?.events));
        }
        kinds
    };
    assert_eq!(kinds[0], vec![("raised", Metric::Cpu)]);
    assert!(kinds[1].is_empty());
    assert_eq!(kinds[2], vec![("escalated", Metric::Cpu)]);

    // Falling back to warning is not an event; the alert stays critical
    let fourth = service.check_once().await?;
    assert!(fourth.events.is_empty());
    let states = service.current_alert_states().await;
    assert_eq!(states[0].last_severity, Severity::Critical);
    assert_eq!(service.health().await, HealthStatus::Critical);
    Ok(())
}

#[tokio::test]
async fn test_event_order_across_metrics() -> Result<()> {
    crate::init_test_environment();

    let hot = SnapshotGenerator::new(1_000).with_baseline(85.0, 85.0);
    let cool = SnapshotGenerator::new(1_000).with_baseline(40.0, 40.0);
    let snapshots = vec![hot.at(0, 99.0), cool.at(1, 20.0)];

    let service = MonitorService::new(
        scenario_config(1_000, &[("cpu", 80.0), ("memory", 80.0), ("disk", 80.0)], 1),
        Arc::new(ScriptedSource::from_snapshots(snapshots)),
        Arc::new(RecordingNotifier::new()),
        None,
    )?;

    // Critical first, then warnings by metric name
    let raised = service.check_once().await?;
    assert_eq!(
        alert_kinds(&raised.events),
        vec![
            ("raised", Metric::Cpu),
            ("raised", Metric::Disk),
            ("raised", Metric::Memory),
        ]
    );

    let states = service.current_alert_states().await;
    let metrics: Vec<_> = states.iter().map(|s| s.metric).collect();
    assert_eq!(metrics, vec![Metric::Cpu, Metric::Disk, Metric::Memory]);

    let cleared = service.check_once().await?;
    assert_eq!(
        alert_kinds(&cleared.events),
        vec![
            ("cleared", Metric::Cpu),
            ("cleared", Metric::Disk),
            ("cleared", Metric::Memory),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_flapping_within_hysteresis_raises_once() -> Result<()> {
    crate::init_test_environment();

    let snapshots = SnapshotGenerator::new(1_000).cpu_series(&[85.0, 50.0, 50.0, 85.0, 50.0, 50.0, 50.0]);
    let notifier = RecordingNotifier::new();
    let service = MonitorService::new(
        scenario_config(1_000, &[("cpu", 80.0)], 3),
        Arc::new(ScriptedSource::from_snapshots(snapshots)),
        Arc::new(notifier.clone()),
        None,
    )?;

    for _ in 0..7 {
        service.check_once().await?;
    }

    assert_eq!(
        notifier.kinds(),
        vec![("raised", Metric::Cpu), ("cleared", Metric::Cpu)]
    );
    Ok(())
}

#[tokio::test]
async fn test_low_confidence_prediction_is_info() -> Result<()> {
    crate::init_test_environment();

    let mut config = scenario_config(1_000, &[("cpu", 80.0)], 1);
    config.prediction.enabled = true;
    config.prediction.min_confidence = 50.0;

    let service = MonitorService::new(
        config,
        Arc::new(ScriptedSource::from_snapshots(
            SnapshotGenerator::new(1_000).cpu_series(&[40.0]),
        )),
        Arc::new(RecordingNotifier::new()),
        Some(Arc::new(ScriptedPredictor::new(95.0, 20.0))),
    )?;

    let report = service.check_once().await?;
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].source, SourceKind::Predicted);
    assert_eq!(report.findings[0].severity, Severity::Info);
    assert_eq!(report.findings[0].observed_value, 95.0);

    assert_eq!(service.health().await, HealthStatus::Degraded);
    Ok(())
}

#[tokio::test]
async fn test_suppress_until_follows_last_event() -> Result<()> {
    crate::init_test_environment();

    let generator = SnapshotGenerator::new(1_000);
    let mut config = scenario_config(1_000, &[("cpu", 80.0)], 1);
    config.alerting.suppression_window_secs = 120;

    let service = MonitorService::new(
        config,
        Arc::new(ScriptedSource::from_snapshots(generator.cpu_series(&[85.0, 85.0, 99.0]))),
        Arc::new(RecordingNotifier::new()),
        None,
    )?;

    service.check_once().await?;
    service.check_once().await?;
    let state = service.current_alert_states().await.remove(0);
    assert_eq!(state.active_since, generator.at(0, 0.0).timestamp);
    assert_eq!(state.suppress_until, state.active_since + ChronoDuration::seconds(120));

    // Escalation re-arms the window from the escalation instant
    service.check_once().await?;
    let state = service.current_alert_states().await.remove(0);
    assert_eq!(state.suppress_until, generator.at(2, 0.0).timestamp + ChronoDuration::seconds(120));
    assert_eq!(state.active_since, generator.at(0, 0.0).timestamp);
    Ok(())
}

#[tokio::test]
async fn test_alternating_within_hysteresis_keeps_one_alert() -> Result<()> {
    crate::init_test_environment();

    let snapshots = SnapshotGenerator::new(1_000).square_wave(50.0, 85.0, 1, 10);
    let notifier = RecordingNotifier::new();
    let service = MonitorService::new(
        scenario_config(1_000, &[("cpu", 80.0)], 2),
        Arc::new(ScriptedSource::from_snapshots(snapshots)),
        Arc::new(notifier.clone()),
        None,
    )?;

    for _ in 0..10 {
        service.check_once().await?;
    }

    assert_eq!(notifier.kinds(), vec![("raised", Metric::Cpu)]);
    assert_eq!(service.current_alert_states().await.len(), 1);
    Ok(())
}

/// A notifier slower than its timeout does not hold up the tick
#[tokio::test]
async fn test_slow_notifier_times_out() -> Result<()> {
    crate::init_test_environment();

    let mut config = scenario_config(1_000, &[("cpu", 80.0)], 1);
    config.alerting.notify_timeout_ms = 30;

    let notifier = RecordingNotifier::new().with_delay(Duration::from_millis(500));
    let service = MonitorService::new(
        config,
        Arc::new(ScriptedSource::from_snapshots(
            SnapshotGenerator::new(1_000).cpu_series(&[95.0]),
        )),
        Arc::new(notifier.clone()),
        None,
    )?;

    let started = tokio::time::Instant::now();
    let report = service.check_once().await?;
    assert!(started.elapsed() < Duration::from_millis(400));

    assert_eq!(alert_kinds(&report.events), vec![("raised", Metric::Cpu)]);
    assert!(notifier.events().is_empty());
    assert_eq!(service.current_alert_states().await.len(), 1);
    assert!(service.metrics()?.contains("devsim_monitor_notify_failures_total 1"));
    Ok(())
}

#[tokio::test]
async fn test_failing_notifier_keeps_alert_state() -> Result<()> {
    crate::init_test_environment();

    let notifier = RecordingNotifier::new().failing();
    let service = MonitorService::new(
        scenario_config(1_000, &[("cpu", 80.0)], 1),
        Arc::new(ScriptedSource::from_snapshots(
            SnapshotGenerator::new(1_000).cpu_series(&[95.0, 20.0]),
        )),
        Arc::new(notifier.clone()),
        None,
    )?;

    service.check_once().await?;
    assert_eq!(service.current_alert_states().await.len(), 1);

    service.check_once().await?;
    assert!(service.current_alert_states().await.is_empty());

    assert_eq!(
        notifier.kinds(),
        vec![("raised", Metric::Cpu), ("cleared", Metric::Cpu)]
    );
    assert!(service.metrics()?.contains("devsim_monitor_notify_failures_total 2"));
    Ok(())
}
