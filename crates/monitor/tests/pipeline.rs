//! Whole-pipeline scenarios against the reference network

use monitor::{Monitor, MonitorSettings};
use response::{ResponseDispatcher, ScriptedChannel, SimulatedValveController};
use std::sync::Arc;
use std::time::Duration;
use storage::{CaseStore, MemoryStore};
use telemetry::{simulate_leak_scenario, ScriptedSource};
use tokio::sync::watch;
use water_model::network::reference_network;
use water_model::{Authority, ChannelKind, Reading, SensorKind, Severity, TeamRegistry};

struct Harness {
    monitor: Arc<Monitor>,
    source: Arc<ScriptedSource>,
    store: Arc<MemoryStore>,
    chat: Arc<ScriptedChannel>,
}

fn harness_with(settings: MonitorSettings, teams: Option<TeamRegistry>) -> Harness {
    let (sensors, reference_teams, valves) = reference_network().unwrap();
    let teams = teams.unwrap_or(reference_teams);
    let source = Arc::new(ScriptedSource::new());
    let store = Arc::new(MemoryStore::new());
    let chat = Arc::new(ScriptedChannel::succeeding(ChannelKind::Chat));

    let dispatcher = ResponseDispatcher::new(
        settings.response.clone(),
        Arc::new(teams),
        Arc::new(valves),
        Arc::new(SimulatedValveController::new()),
        store.clone(),
    )
    .with_channel(chat.clone())
    .with_channel(Arc::new(ScriptedChannel::succeeding(ChannelKind::Email)))
    .with_channel(Arc::new(ScriptedChannel::failing(ChannelKind::Sms, "gateway down")));

    let monitor = Monitor::new(
        &settings,
        sensors,
        source.clone(),
        Arc::new(dispatcher),
        store.clone(),
    );
    Harness {
        monitor: Arc::new(monitor),
        source,
        store,
        chat,
    }
}

fn harness() -> Harness {
    harness_with(MonitorSettings::default(), None)
}

#[tokio::test]
async fn test_critical_pressure_drop_creates_alert_and_dispatches() {
    let h = harness();
    h.source.push_value("san_jose_centro", 1.0);

    let report = h.monitor.poll_cycle().await;
    assert_eq!(report.sensors_polled, 13);
    assert_eq!(report.readings_analyzed, 13);
    assert_eq!(report.alerts_created, 1);
    assert_eq!(report.cases_dispatched, 1);

    let alert = h.monitor.active_alert_for("san_jose_centro").unwrap();
    assert_eq!(alert.severity, Severity::Critical);
    assert!(alert.confidence >= 0.9);
    assert!(alert.id.starts_with("LEAK_san_jose_centro_"));

    let case = h.monitor.dispatcher().case(&alert.id).unwrap();
    assert_eq!(case.assigned_team_id, "san_jose");
    assert!(case.distance_km < 0.01);
    assert!(case.isolation_attempted);
    assert_eq!(case.isolated_valve_ids.len(), 3);
    assert!(!case.all_channels_failed);
    assert_eq!(case.notifications_delivered(), 2);

    let (_, message) = &h.chat.sent()[0];
    assert!(message.contains("9.933300, -84.083300"));

    assert!(h.store.load_alert(&alert.id).await.unwrap().is_some());
    assert_eq!(h.store.case_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_small_flow_increase_creates_no_alert() {
    let h = harness();
    // Reading carries its own 50 L/s baseline
    let reading = Reading::new("heredia_universidad", SensorKind::Flow, 52.0, Some(50.0));
    h.source.push_reading(reading);

    let report = h.monitor.poll_cycle().await;
    assert_eq!(report.alerts_created, 0);
    assert!(h.monitor.active_alerts().is_empty());
    assert_eq!(h.monitor.status().active_alerts, 0);
}

#[tokio::test]
async fn test_repeated_reading_keeps_single_alert_and_case() {
    let h = harness();
    h.source.push_values("san_jose_centro", [1.0, 1.0]);

    h.monitor.poll_cycle().await;
    let second = h.monitor.poll_cycle().await;

    assert_eq!(second.alerts_created, 0);
    assert_eq!(second.alerts_updated, 0);
    assert_eq!(second.cases_dispatched, 0);
    assert_eq!(h.monitor.active_alerts().len(), 1);
    assert_eq!(h.monitor.dispatcher().open_cases().len(), 1);
    assert_eq!(h.chat.sent().len(), 1);
}

#[tokio::test]
async fn test_leak_scenarios_follow_severity_tiers() {
    let h = harness();
    let sensors = h.monitor.sensors();
    let pressure = sensors.get("alajuela_centro").unwrap();
    let flow = sensors.get("puente_mulas").unwrap();
    h.source
        .push_reading(simulate_leak_scenario(pressure, Severity::Moderate).unwrap());
    h.source
        .push_reading(simulate_leak_scenario(flow, Severity::Major).unwrap());

    let report = h.monitor.poll_cycle().await;
    assert_eq!(report.alerts_created, 2);

    let moderate = h.monitor.active_alert_for("alajuela_centro").unwrap();
    assert_eq!(moderate.severity, Severity::Moderate);
    let case = h.monitor.dispatcher().case(&moderate.id).unwrap();
    assert_eq!(case.assigned_team_id, "alajuela");
    assert!(!case.isolation_attempted);

    let major = h.monitor.active_alert_for("puente_mulas").unwrap();
    assert_eq!(major.severity, Severity::Major);
}

#[tokio::test(start_paused = true)]
async fn test_failing_and_slow_sensors_do_not_stop_the_cycle() {
    let h = harness();
    h.source.push_error("orosi_intake", "radio link down");
    h.source
        .push_delayed("cartago_tank", Duration::from_secs(60), 18.0);
    h.source.push_value("san_jose_centro", 1.0);

    let report = h.monitor.poll_cycle().await;
    assert_eq!(report.failed_sensors, vec!["orosi_intake", "cartago_tank"]);
    assert_eq!(report.readings_analyzed, 11);
    assert_eq!(report.alerts_created, 1);
    assert_eq!(report.cases_dispatched, 1);
}

#[tokio::test]
async fn test_missing_response_team_marks_alert_undispatched() {
    let empty = TeamRegistry::new(vec![]).unwrap();
    let h = harness_with(MonitorSettings::default(), Some(empty));
    h.source.push_value("san_jose_centro", 1.0);

    let report = h.monitor.poll_cycle().await;
    assert_eq!(report.alerts_created, 1);
    assert_eq!(report.cases_dispatched, 0);
    assert_eq!(report.undispatched, 1);

    let alert = h.monitor.active_alert_for("san_jose_centro").unwrap();
    assert!(alert.undispatched);
    let stored = h.store.load_alert(&alert.id).await.unwrap().unwrap();
    assert!(stored.undispatched);
}

#[tokio::test]
async fn test_no_dispatch_after_shutdown_signal() {
    let h = harness();
    h.source.push_value("san_jose_centro", 1.0);
    let (_tx, rx) = watch::channel(true);

    let report = h.monitor.poll_cycle_until(&rx).await;
    assert_eq!(report.readings_analyzed, 13);
    assert_eq!(report.alerts_created, 1);
    assert_eq!(report.cases_dispatched, 0);
    assert_eq!(report.dispatches_skipped, 1);
    assert!(h.monitor.dispatcher().open_cases().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_stops_on_shutdown() {
    let h = harness();
    let (tx, rx) = watch::channel(false);
    let monitor = Arc::clone(&h.monitor);
    let handle =
        tokio::spawn(async move { monitor.run(Duration::from_secs(60), rx).await });

    tokio::time::sleep(Duration::from_secs(150)).await;
    assert!(h.monitor.status().monitoring);
    tx.send(true).unwrap();

    let cycles = handle.await.unwrap();
    assert_eq!(cycles, 3);
    let status = h.monitor.status();
    assert!(!status.monitoring);
    assert_eq!(status.cycles_completed, 3);
}

#[tokio::test]
async fn test_status_snapshot() {
    let h = harness();
    h.source.push_value("san_jose_centro", 1.0);
    h.monitor.poll_cycle().await;

    let status = h.monitor.get_system_status();
    assert_eq!(status.total_sensors, 13);
    assert_eq!(status.sensor_breakdown[&SensorKind::Pressure], 8);
    assert_eq!(status.sensor_breakdown[&SensorKind::Flow], 5);
    assert_eq!(status.coverage_by_authority[&Authority::Aya], 7);
    assert_eq!(status.coverage_by_authority[&Authority::Asada], 3);
    assert_eq!(status.active_alerts, 1);
    assert_eq!(status.severity_breakdown[&Severity::Critical], 1);
    assert_eq!(status.severity_breakdown[&Severity::Minor], 0);
    assert!(status.total_estimated_loss_lpm > 0.0);
    assert!(
        (status.estimated_daily_loss_liters - status.total_estimated_loss_lpm * 1440.0).abs()
            < 1e-6
    );
    assert_eq!(status.cycles_completed, 1);
    assert_eq!(status.open_cases, 1);
    assert!(status.last_update.is_some());
    assert!(!status.monitoring);
}

#[tokio::test]
async fn test_resolved_alert_frees_sensor_for_new_alert() {
    let h = harness();
    h.source.push_value("san_jose_centro", 1.0);
    h.monitor.poll_cycle().await;
    let first = h.monitor.active_alert_for("san_jose_centro").unwrap();

    h.monitor.resolve_alert(&first.id).await.unwrap();
    assert!(h.monitor.active_alert_for("san_jose_centro").is_none());
    assert!(h.monitor.dispatcher().open_cases().is_empty());

    h.source.push_value("san_jose_centro", 1.0);
    let report = h.monitor.poll_cycle().await;
    assert_eq!(report.alerts_created, 1);
    let second = h.monitor.active_alert_for("san_jose_centro").unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_resolving_alert_stops_escalation() {
    let h = harness();
    h.source.push_value("san_jose_centro", 1.0);
    h.monitor.poll_cycle().await;
    let alert = h.monitor.active_alert_for("san_jose_centro").unwrap();
    let dispatched_at = h
        .monitor
        .dispatcher()
        .case(&alert.id)
        .and_then(|case| case.dispatched_at)
        .unwrap();
    let chat_sends = h.chat.sent().len();

    h.monitor.resolve_alert(&alert.id).await.unwrap();
    assert_eq!(h.monitor.status().open_cases, 0);
    let stored = h.store.load_case(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.status, water_model::CaseStatus::Resolved);

    let overdue = dispatched_at + chrono::Duration::minutes(16);
    assert!(h.monitor.dispatcher().escalate_overdue(overdue).await.is_empty());
    assert_eq!(h.chat.sent().len(), chat_sends);
}
