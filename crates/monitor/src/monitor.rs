//! Monitoring Orchestrator
//!
//! One cycle polls every registered sensor concurrently (bounded by a
//! semaphore, each fetch with its own timeout), then processes the
//! readings in registration order: analysis, alerting and dispatch.
//! A failing sensor never stops the cycle.

use crate::settings::MonitorSettings;
use crate::status::{CycleReport, SystemStatus, MINUTES_PER_DAY};
use alerting::{AlertError, AlertManager};
use chrono::{DateTime, Utc};
use leak_detector::LeakDetector;
use response::{DispatchError, ResponseDispatcher};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use storage::CaseStore;
use telemetry::TelemetrySource;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use water_model::{Alert, Reading, SensorRegistry, Severity, WaterSensor};

/// Why a sensor produced no reading this cycle
enum FetchFailure {
    Telemetry(String),
    Timeout,
}

/// Leak monitoring service
pub struct Monitor {
    sensors: Arc<SensorRegistry>,
    source: Arc<dyn TelemetrySource>,
    detector: LeakDetector,
    alerts: Mutex<AlertManager>,
    dispatcher: Arc<ResponseDispatcher>,
    store: Arc<dyn CaseStore>,
    history: Mutex<HashMap<String, VecDeque<f64>>>,
    sensor_timeout: Duration,
    max_concurrent_polls: usize,
    trend_samples: usize,
    monitoring: AtomicBool,
    cycles: AtomicU64,
    last_update: Mutex<Option<DateTime<Utc>>>,
}

impl Monitor {
    pub fn new(
        settings: &MonitorSettings,
        sensors: SensorRegistry,
        source: Arc<dyn TelemetrySource>,
        dispatcher: Arc<ResponseDispatcher>,
        store: Arc<dyn CaseStore>,
    ) -> Self {
        info!("Creating monitor for {} sensors", sensors.len());
        Self {
            sensors: Arc::new(sensors),
            source,
            detector: LeakDetector::new(settings.detector.clone()),
            alerts: Mutex::new(AlertManager::new(settings.alerting.clone())),
            dispatcher,
            store,
            history: Mutex::new(HashMap::new()),
            sensor_timeout: settings.sensor_timeout(),
            max_concurrent_polls: settings.max_concurrent_polls.max(1),
            trend_samples: settings.trend_samples,
            monitoring: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            last_update: Mutex::new(None),
        }
    }

    fn alerts(&self) -> MutexGuard<'_, AlertManager> {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sensors(&self) -> &SensorRegistry {
        &self.sensors
    }

    pub fn dispatcher(&self) -> &Arc<ResponseDispatcher> {
        &self.dispatcher
    }

    /// Run cycles every `poll_interval` until `shutdown` turns true or its
    /// sender is dropped. Returns the number of cycles run.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            "Monitoring {} sensors every {:?}",
            self.sensors.len(),
            poll_interval
        );
        self.monitoring.store(true, Ordering::SeqCst);
        let mut cycles = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle(Some(&shutdown)).await;
            cycles += 1;
            debug!("Cycle {} finished: {:?}", report.cycle, report);

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed, stopping monitor");
                        break;
                    }
                }
            }
        }

        self.monitoring.store(false, Ordering::SeqCst);
        info!("Monitoring stopped after {} cycles", cycles);
        cycles
    }

    /// Run one full cycle
    pub async fn poll_cycle(&self) -> CycleReport {
        self.run_cycle(None).await
    }

    /// Run one cycle; once `shutdown` is true, analysis completes but no
    /// new dispatch or escalation starts
    pub async fn poll_cycle_until(&self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        self.run_cycle(Some(shutdown)).await
    }

    async fn run_cycle(&self, shutdown: Option<&watch::Receiver<bool>>) -> CycleReport {
        let stopping = || shutdown.map(|rx| *rx.borrow()).unwrap_or(false);
        let cycle = self.cycles.load(Ordering::SeqCst) + 1;
        let mut report = CycleReport {
            cycle,
            sensors_polled: self.sensors.len(),
            ..CycleReport::default()
        };

        let readings = self.fetch_all().await;

        let mut to_dispatch: Vec<Alert> = Vec::new();
        let mut queued: HashSet<String> = HashSet::new();
        let mut to_save: Vec<Alert> = Vec::new();

        for (sensor, fetched) in self.sensors.iter().zip(readings) {
            let reading = match fetched {
                Ok(reading) => reading,
                Err(failure) => {
                    match failure {
                        FetchFailure::Telemetry(e) => {
                            warn!("Sensor {} failed to report: {}", sensor.id, e)
                        }
                        FetchFailure::Timeout => warn!(
                            "Sensor {} timed out after {:?}",
                            sensor.id, self.sensor_timeout
                        ),
                    }
                    metrics::counter!("leak_sensor_failures_total").increment(1);
                    report.failed_sensors.push(sensor.id.clone());
                    continue;
                }
            };
            metrics::counter!("leak_readings_total").increment(1);

            let history = self.history_for(&sensor.id);
            let result = self.detector.analyze(&reading, sensor, &history);
            self.remember(&sensor.id, reading.current_value);
            report.readings_analyzed += 1;
            if result.is_error() {
                report.analysis_errors += 1;
                continue;
            }

            let (alert, created) = {
                let mut alerts = self.alerts();
                let had_active = alerts.active_for_sensor(&sensor.id).is_some();
                match alerts.on_analysis(sensor, &result) {
                    Some(alert) => (alert, !had_active),
                    None => continue,
                }
            };

            if created {
                report.alerts_created += 1;
                metrics::counter!("leak_alerts_created_total").increment(1);
            } else {
                report.alerts_updated += 1;
            }

            if alert.severity >= Severity::Moderate
                && !self.dispatcher.has_case(&alert.id)
                && queued.insert(alert.id.clone())
            {
                to_dispatch.push(alert.clone());
            }
            to_save.push(alert);
        }

        for alert in &to_save {
            self.save_alert(alert).await;
        }

        if stopping() {
            if !to_dispatch.is_empty() {
                info!(
                    "Shutdown requested, {} dispatches not started",
                    to_dispatch.len()
                );
            }
            report.dispatches_skipped = to_dispatch.len();
        } else {
            self.dispatch_all(to_dispatch, &mut report).await;
            report.escalations = self.dispatcher.escalate_overdue(Utc::now()).await.len();
        }

        self.cycles.store(cycle, Ordering::SeqCst);
        if let Ok(mut last) = self.last_update.lock() {
            *last = Some(Utc::now());
        }

        info!(
            "Cycle {}: {}/{} sensors analyzed, {} alerts created, {} cases dispatched",
            cycle,
            report.readings_analyzed,
            report.sensors_polled,
            report.alerts_created,
            report.cases_dispatched
        );
        report
    }

    /// Fetch a reading for every sensor; results in registration order
    async fn fetch_all(&self) -> Vec<Result<Reading, FetchFailure>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_polls));
        let mut tasks = JoinSet::new();

        for (index, sensor) in self.sensors.iter().enumerate() {
            let sensor: WaterSensor = sensor.clone();
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.sensor_timeout;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (index, Err(FetchFailure::Telemetry(e.to_string()))),
                };
                let outcome = match tokio::time::timeout(timeout, source.get_reading(&sensor)).await
                {
                    Ok(Ok(reading)) => Ok(reading),
                    Ok(Err(e)) => Err(FetchFailure::Telemetry(e.to_string())),
                    Err(_) => Err(FetchFailure::Timeout),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<Reading, FetchFailure>>> =
            (0..self.sensors.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("Sensor poll task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(FetchFailure::Telemetry("poll task aborted".to_string())))
            })
            .collect()
    }

    async fn dispatch_all(&self, alerts: Vec<Alert>, report: &mut CycleReport) {
        let mut tasks = JoinSet::new();
        for alert in alerts {
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move { dispatcher.handle(&alert).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(case)) => {
                    debug!("Case {} ready ({})", case.alert_id, case.status.as_str());
                    report.cases_dispatched += 1;
                }
                Ok(Err(DispatchError::NoResponseTeam(alert_id))) => {
                    error!("Alert {} left undispatched: no response team", alert_id);
                    report.undispatched += 1;
                    self.flag_undispatched(&alert_id).await;
                }
                Ok(Err(e)) => debug!("Dispatch skipped: {}", e),
                Err(e) => error!("Dispatch task failed: {}", e),
            }
        }
    }

    async fn flag_undispatched(&self, alert_id: &str) {
        let flagged = {
            let mut alerts = self.alerts();
            match alerts.mark_undispatched(alert_id) {
                Ok(()) => alerts.get(alert_id).cloned(),
                Err(AlertError::NotFound(_)) | Err(AlertError::AlreadyResolved(_)) => None,
            }
        };
        if let Some(alert) = flagged {
            self.save_alert(&alert).await;
        }
    }

    async fn save_alert(&self, alert: &Alert) {
        if let Err(e) = self.store.save_alert(alert).await {
            error!("Failed to persist alert {}: {}", alert.id, e);
        }
    }

    fn history_for(&self, sensor_id: &str) -> Vec<f64> {
        self.history
            .lock()
            .map(|history| {
                history
                    .get(sensor_id)
                    .map(|window| window.iter().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn remember(&self, sensor_id: &str, value: f64) {
        if !value.is_finite() || self.trend_samples == 0 {
            return;
        }
        if let Ok(mut history) = self.history.lock() {
            let window = history.entry(sensor_id.to_string()).or_default();
            window.push_back(value);
            while window.len() > self.trend_samples {
                window.pop_front();
            }
        }
    }

    /// Active alerts, oldest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts().active_alerts().into_iter().cloned().collect()
    }

    /// Active alert for a sensor, if any
    pub fn active_alert_for(&self, sensor_id: &str) -> Option<Alert> {
        self.alerts().active_for_sensor(sensor_id).cloned()
    }

    /// Resolve an alert after field repair, freeing its sensor and closing
    /// its emergency case
    pub async fn resolve_alert(&self, alert_id: &str) -> Result<Alert, AlertError> {
        let alert = self.alerts().resolve(alert_id)?;
        self.save_alert(&alert).await;

        match self.dispatcher.resolve_case(alert_id).await {
            Ok(case) => debug!("Case {} closed", case.alert_id),
            Err(DispatchError::InProgress(_)) => {
                info!("Case for alert {} closes when its dispatch completes", alert_id)
            }
            Err(e) => debug!("No case to close: {}", e),
        }
        Ok(alert)
    }

    /// Current network snapshot
    pub fn status(&self) -> SystemStatus {
        let (active_alerts, severity_breakdown, total_loss) = {
            let alerts = self.alerts();
            (
                alerts.active_count(),
                alerts.active_by_severity(),
                alerts.total_active_loss_lpm(),
            )
        };

        SystemStatus {
            monitoring: self.monitoring.load(Ordering::SeqCst),
            total_sensors: self.sensors.len(),
            sensor_breakdown: self.sensors.count_by_kind(),
            active_alerts,
            severity_breakdown,
            total_estimated_loss_lpm: total_loss,
            estimated_daily_loss_liters: total_loss * MINUTES_PER_DAY,
            coverage_by_authority: self.sensors.coverage_by_authority(),
            open_cases: self.dispatcher.open_cases().len(),
            cycles_completed: self.cycles.load(Ordering::SeqCst),
            last_update: self.last_update.lock().ok().and_then(|last| *last),
        }
    }

    /// Same snapshot as [`Monitor::status`]
    pub fn get_system_status(&self) -> SystemStatus {
        self.status()
    }
}
