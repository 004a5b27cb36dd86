//! Response Dispatcher
//!
//! Turns an alert into an [`EmergencyCase`]: assigns the nearest crew,
//! isolates the pipe section for major and critical leaks, and notifies
//! the crew on every configured channel. Isolation and notification run
//! concurrently; neither can fail the dispatch.

use crate::channel::NotificationChannel;
use crate::config::ResponseConfig;
use crate::error::DispatchError;
use crate::message::{emergency_message, escalation_message, truncate_sms, Assignment};
use crate::valve::ValveController;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use storage::CaseStore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use water_model::{
    Alert, CaseStatus, ChannelKind, EmergencyCase, NotificationResult, ResponseTeam,
    TeamRegistry, ValveCloseResult, ValveRegistry,
};

/// Outcome of the isolation step
#[derive(Debug, Default)]
struct Isolation {
    attempted: bool,
    closed: Vec<String>,
    results: Vec<ValveCloseResult>,
    manual_action_required: bool,
    note: Option<String>,
}

/// Open cases only; resolved cases leave the ledger and live on in the store
#[derive(Debug, Default)]
struct Ledger {
    cases: HashMap<String, EmergencyCase>,
    /// Original message per alert, reused for escalations
    messages: HashMap<String, String>,
    in_flight: HashSet<String>,
    /// Alerts resolved while their dispatch was still running
    resolved_in_flight: HashSet<String>,
}

/// Dispatches field crews, valve isolation and notifications for alerts
pub struct ResponseDispatcher {
    config: ResponseConfig,
    teams: Arc<TeamRegistry>,
    valves: Arc<ValveRegistry>,
    controller: Arc<dyn ValveController>,
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    store: Arc<dyn CaseStore>,
    ledger: Mutex<Ledger>,
}

impl ResponseDispatcher {
    pub fn new(
        config: ResponseConfig,
        teams: Arc<TeamRegistry>,
        valves: Arc<ValveRegistry>,
        controller: Arc<dyn ValveController>,
        store: Arc<dyn CaseStore>,
    ) -> Self {
        Self {
            config,
            teams,
            valves,
            controller,
            channels: HashMap::new(),
            store,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Register a channel; replaces any channel of the same kind
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // A panic while holding the ledger leaves plain data; keep serving it
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Dispatch a response for `alert`.
    ///
    /// Returns the existing case if the alert was already dispatched. The
    /// only failure is an empty team registry; isolation and notification
    /// problems are recorded on the case.
    pub async fn handle(&self, alert: &Alert) -> Result<EmergencyCase, DispatchError> {
        let Some((team, distance_km)) = self.teams.nearest(&alert.location) else {
            error!("No response team available for alert {}", alert.id);
            metrics::counter!("leak_dispatch_failures_total").increment(1);
            return Err(DispatchError::NoResponseTeam(alert.id.clone()));
        };

        {
            let mut ledger = self.ledger();
            if let Some(existing) = ledger.cases.get(&alert.id) {
                debug!("Alert {} already has a case, skipping dispatch", alert.id);
                return Ok(existing.clone());
            }
            if !ledger.in_flight.insert(alert.id.clone()) {
                return Err(DispatchError::InProgress(alert.id.clone()));
            }
        }

        let eta_minutes = team.response_time_target_minutes + 2.0 * distance_km;
        info!(
            "Dispatching {} to alert {} ({:.2} km, ETA {:.0} min)",
            team.name, alert.id, distance_km, eta_minutes
        );

        let mut case = EmergencyCase {
            alert_id: alert.id.clone(),
            sensor_id: alert.sensor_id.clone(),
            severity: alert.severity,
            assigned_team_id: team.id.clone(),
            assigned_team_name: team.name.clone(),
            distance_km,
            estimated_eta_minutes: eta_minutes,
            isolation_attempted: false,
            isolated_valve_ids: Vec::new(),
            valve_results: Vec::new(),
            manual_action_required: false,
            isolation_note: None,
            notification_results: Vec::new(),
            all_channels_failed: false,
            status: CaseStatus::Created,
            created_at: Utc::now(),
            dispatched_at: None,
            acknowledged_at: None,
            escalation_count: 0,
            last_escalated_at: None,
        };
        self.persist(&case).await;

        let message = emergency_message(
            alert,
            &Assignment {
                team,
                distance_km,
                eta_minutes,
            },
        );

        let (isolation, notifications) =
            tokio::join!(self.isolate(alert), self.notify(team, &message));

        case.isolation_attempted = isolation.attempted;
        case.isolated_valve_ids = isolation.closed;
        case.valve_results = isolation.results;
        case.manual_action_required = isolation.manual_action_required;
        case.isolation_note = isolation.note;
        case.all_channels_failed = notifications.iter().all(|n| !n.success);
        case.notification_results = notifications;
        case.status = CaseStatus::Dispatched;
        case.dispatched_at = Some(Utc::now());

        if case.all_channels_failed {
            error!(
                "ALL NOTIFICATION CHANNELS FAILED for alert {}: manual escalation required",
                alert.id
            );
        }
        if case.manual_action_required {
            warn!(
                "Alert {} requires manual isolation: {}",
                alert.id,
                case.isolation_note.as_deref().unwrap_or("valve failure")
            );
        }

        {
            let mut ledger = self.ledger();
            ledger.in_flight.remove(&alert.id);
            if ledger.resolved_in_flight.remove(&alert.id) {
                info!("Alert {} was resolved during dispatch, closing case", alert.id);
                case.status = CaseStatus::Resolved;
            } else {
                ledger.messages.insert(alert.id.clone(), message);
                ledger.cases.insert(alert.id.clone(), case.clone());
            }
        }
        self.persist(&case).await;

        metrics::counter!("leak_cases_dispatched_total").increment(1);
        info!(
            "Case {} dispatched: {} notified on {}/{} channels, {} valves closed",
            case.alert_id,
            case.assigned_team_name,
            case.notifications_delivered(),
            case.notification_results.len(),
            case.isolated_valve_ids.len()
        );
        Ok(case)
    }

    async fn persist(&self, case: &EmergencyCase) {
        if let Err(e) = self.store.save_case(case).await {
            error!("Failed to persist case {}: {}", case.alert_id, e);
        }
    }

    async fn isolate(&self, alert: &Alert) -> Isolation {
        if !alert.severity.warrants_isolation() {
            return Isolation::default();
        }

        let radius = self.config.isolation_radius_km;
        let candidates: Vec<(String, f64)> = self
            .valves
            .within_radius(&alert.location, radius)
            .into_iter()
            .map(|(valve, distance)| (valve.id.clone(), distance))
            .collect();

        if candidates.is_empty() {
            warn!(
                "No controllable valves within {} km of alert {}",
                radius, alert.id
            );
            return Isolation {
                manual_action_required: true,
                note: Some("no controllable valves, manual action required".to_string()),
                ..Isolation::default()
            };
        }

        let mut tasks = JoinSet::new();
        for (index, (valve_id, distance)) in candidates.iter().cloned().enumerate() {
            let controller = Arc::clone(&self.controller);
            let config = self.config.clone();
            tasks.spawn(async move {
                let result = close_with_retry(controller, &config, valve_id, distance).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<ValveCloseResult>> = vec![None; candidates.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Valve task for alert {} aborted: {}", alert.id, e),
            }
        }

        let results: Vec<ValveCloseResult> = slots
            .into_iter()
            .zip(candidates)
            .map(|(slot, (valve_id, distance_km))| {
                slot.unwrap_or_else(|| ValveCloseResult {
                    valve_id,
                    distance_km,
                    success: false,
                    attempts: 0,
                    timestamp: Utc::now(),
                    error: Some("valve task aborted".to_string()),
                })
            })
            .collect();

        let closed: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.valve_id.clone())
            .collect();
        metrics::counter!("leak_valves_closed_total").increment(closed.len() as u64);

        let failed = results.len() - closed.len();
        let note = if failed == 0 {
            format!("isolated {} valves", closed.len())
        } else {
            format!(
                "{} of {} valves failed to close, manual isolation required",
                failed,
                results.len()
            )
        };

        Isolation {
            attempted: true,
            closed,
            results,
            manual_action_required: failed > 0,
            note: Some(note),
        }
    }

    /// Attempt every configured channel in priority order
    async fn notify(&self, team: &ResponseTeam, message: &str) -> Vec<NotificationResult> {
        let mut results = Vec::with_capacity(self.config.channel_priority.len());
        for &kind in &self.config.channel_priority {
            let result = self.send_one(team, kind, message).await;
            if !result.success {
                metrics::counter!("leak_notifications_failed_total", "channel" => kind.as_str())
                    .increment(1);
            }
            results.push(result);
        }
        results
    }

    async fn send_one(
        &self,
        team: &ResponseTeam,
        kind: ChannelKind,
        message: &str,
    ) -> NotificationResult {
        let recipient = team.contacts.recipient(kind).map(str::to_string);
        let failed = |error: String, elapsed_ms: u64| NotificationResult {
            channel: kind,
            recipient: recipient.clone(),
            success: false,
            timestamp: Utc::now(),
            elapsed_ms,
            error: Some(error),
        };

        let Some(to) = recipient.as_deref() else {
            warn!("Team {} has no {} contact", team.id, kind);
            return failed(format!("no {} contact for team {}", kind, team.id), 0);
        };
        let Some(channel) = self.channels.get(&kind) else {
            warn!("No {} channel configured", kind);
            return failed(format!("channel {} is not configured", kind), 0);
        };

        let body = match kind {
            ChannelKind::Sms => truncate_sms(message),
            _ => message.to_string(),
        };

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.config.channel_timeout(), channel.send(to, &body)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(())) => {
                info!("{} notification sent to {} in {}ms", kind, to, elapsed_ms);
                NotificationResult {
                    channel: kind,
                    recipient: recipient.clone(),
                    success: true,
                    timestamp: Utc::now(),
                    elapsed_ms,
                    error: None,
                }
            }
            Ok(Err(e)) => {
                warn!("{} notification to {} failed: {}", kind, to, e);
                failed(e.to_string(), elapsed_ms)
            }
            Err(_) => {
                warn!(
                    "{} notification to {} timed out after {}ms",
                    kind, to, self.config.channel_timeout_ms
                );
                failed(
                    format!("timed out after {}ms", self.config.channel_timeout_ms),
                    elapsed_ms,
                )
            }
        }
    }

    /// Record that the crew confirmed receipt
    pub async fn acknowledge(&self, alert_id: &str) -> Result<EmergencyCase, DispatchError> {
        let case = {
            let mut ledger = self.ledger();
            let case = ledger
                .cases
                .get_mut(alert_id)
                .ok_or_else(|| DispatchError::UnknownCase(alert_id.to_string()))?;
            if case.acknowledged_at.is_none() {
                case.acknowledged_at = Some(Utc::now());
                info!("Case {} acknowledged by {}", alert_id, case.assigned_team_name);
            }
            case.clone()
        };
        self.persist(&case).await;
        Ok(case)
    }

    /// Close the case of a repaired leak.
    ///
    /// The case is persisted as resolved and dropped from the ledger, so it
    /// is never escalated again. A dispatch still in progress is closed as
    /// soon as it completes and `InProgress` is returned.
    pub async fn resolve_case(&self, alert_id: &str) -> Result<EmergencyCase, DispatchError> {
        let mut case = {
            let mut ledger = self.ledger();
            ledger.messages.remove(alert_id);
            match ledger.cases.remove(alert_id) {
                Some(case) => case,
                None if ledger.in_flight.contains(alert_id) => {
                    ledger.resolved_in_flight.insert(alert_id.to_string());
                    return Err(DispatchError::InProgress(alert_id.to_string()));
                }
                None => return Err(DispatchError::UnknownCase(alert_id.to_string())),
            }
        };
        case.status = CaseStatus::Resolved;
        self.persist(&case).await;

        metrics::counter!("leak_cases_resolved_total").increment(1);
        info!(
            "Case {} resolved after {} escalations",
            alert_id, case.escalation_count
        );
        Ok(case)
    }

    /// Re-notify every overdue, unacknowledged case; returns the escalated alert ids
    pub async fn escalate_overdue(&self, now: DateTime<Utc>) -> Vec<String> {
        let timeout = self.config.escalation_timeout();
        let due: Vec<(EmergencyCase, String)> = {
            let ledger = self.ledger();
            ledger
                .cases
                .values()
                .filter(|case| {
                    case.status == CaseStatus::Dispatched
                        && !case.is_acknowledged()
                        && self.config.escalate_severities.contains(&case.severity)
                })
                .filter(|case| {
                    case.last_escalated_at
                        .or(case.dispatched_at)
                        .map(|since| now - since >= timeout)
                        .unwrap_or(false)
                })
                .map(|case| {
                    let original = ledger
                        .messages
                        .get(&case.alert_id)
                        .cloned()
                        .unwrap_or_default();
                    (case.clone(), original)
                })
                .collect()
        };

        let mut escalated = Vec::with_capacity(due.len());
        for (case, original) in due {
            let Some(team) = self.teams.get(&case.assigned_team_id) else {
                error!(
                    "Cannot escalate alert {}: team {} not in registry",
                    case.alert_id, case.assigned_team_id
                );
                continue;
            };

            let message = escalation_message(&case, &original, now);
            warn!(
                "ESCALATION #{} for alert {}: no acknowledgement from {}",
                case.escalation_count + 1,
                case.alert_id,
                team.name
            );
            let results = self.notify(team, &message).await;

            let updated = {
                let mut ledger = self.ledger();
                let Some(stored) = ledger.cases.get_mut(&case.alert_id) else {
                    continue;
                };
                // Acknowledged while the escalation was in flight
                if stored.is_acknowledged() {
                    continue;
                }
                stored.escalation_count += 1;
                stored.last_escalated_at = Some(now);
                stored.notification_results.extend(results);
                stored.clone()
            };
            self.persist(&updated).await;
            metrics::counter!("leak_escalations_total").increment(1);
            escalated.push(updated.alert_id);
        }
        escalated
    }

    /// Open case for an alert, if dispatched and not yet resolved
    pub fn case(&self, alert_id: &str) -> Option<EmergencyCase> {
        self.ledger().cases.get(alert_id).cloned()
    }

    /// Whether an open case exists or is being dispatched for the alert
    pub fn has_case(&self, alert_id: &str) -> bool {
        let ledger = self.ledger();
        ledger.cases.contains_key(alert_id) || ledger.in_flight.contains(alert_id)
    }

    /// Cases not yet resolved, oldest first
    pub fn open_cases(&self) -> Vec<EmergencyCase> {
        let mut cases: Vec<EmergencyCase> = self.ledger().cases.values().cloned().collect();
        cases.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        cases
    }
}

async fn close_with_retry(
    controller: Arc<dyn ValveController>,
    config: &ResponseConfig,
    valve_id: String,
    distance_km: f64,
) -> ValveCloseResult {
    let max_attempts = config.valve_max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match tokio::time::timeout(config.valve_timeout(), controller.close_valve(&valve_id)).await
        {
            Ok(Ok(ack)) => {
                return ValveCloseResult {
                    valve_id,
                    distance_km,
                    success: true,
                    attempts: attempt,
                    timestamp: ack.closed_at,
                    error: None,
                };
            }
            Ok(Err(e)) => {
                warn!("Valve {} close attempt {} failed: {}", valve_id, attempt, e);
                last_error = Some(e.to_string());
            }
            Err(_) => {
                warn!(
                    "Valve {} close attempt {} timed out after {}ms",
                    valve_id, attempt, config.valve_timeout_ms
                );
                last_error = Some(format!(
                    "no acknowledgement within {}ms",
                    config.valve_timeout_ms
                ));
            }
        }

        if attempt < max_attempts {
            let backoff = config.valve_retry_backoff_ms.saturating_mul(u64::from(attempt));
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }

    error!("Valve {} failed after {} attempts", valve_id, max_attempts);
    ValveCloseResult {
        valve_id,
        distance_km,
        success: false,
        attempts: max_attempts,
        timestamp: Utc::now(),
        error: last_error,
    }
}
