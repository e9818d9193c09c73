//! Alert lifecycle handler: the decision core of the alert-management
//! service.
//!
//! Raw observations and internal timer ticks drive each alert's lifecycle
//! status. New observations run through the transform pipeline and the
//! suppression engine before being persisted; every transition is broadcast
//! as an [`AlertEvent`] to the per-alert-name listener queues and to the
//! notification engine's event sink. The expiry and escalation sweeps run on
//! their own interval timers and isolate per-alert failures.

pub mod error;
pub mod stats;
pub mod suppress;


use crate::error::{HandlerError, Result};
use crate::stats::HandlerStats;
use crate::suppress::Suppressor;
use alertmgr_common::types::{Alert, AlertEvent, EventType, MatchCondition, Severity};
use alertmgr_config::{ConfigHandler, EscalationPolicy};
use alertmgr_storage::{with_tx, AlertQuery, Dbase, StorageError, Txn};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

/// A pluggable enrichment step applied to a newly observed alert before
/// suppression evaluation.
///
/// Transforms registered for the same alert name run in ascending priority
/// order. A failing transform aborts the rest of that alert's pipeline; the
/// alert is still persisted as it stands.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Ordering among transforms registered for the same alert name; lower
    /// runs first.
    fn priority(&self) -> i32;

    /// The alert names this transform applies to.
    fn applies_to(&self) -> &[String];

    fn apply(&self, alert: &mut Alert) -> anyhow::Result<()>;
}

/// Receives observations and timer ticks, owns the transform and listener
/// registries, and emits an [`AlertEvent`] per lifecycle transition.
///
/// Each public operation runs inside the caller-supplied transaction; the
/// caller commits only if the operation returns `Ok`. Event queues are only
/// ever sent to after every lock has been released.
pub struct AlertHandler {
    db: Arc<dyn Dbase>,
    config: Arc<ConfigHandler>,
    suppressor: Arc<Suppressor>,
    transforms: Mutex<Vec<Arc<dyn Transform>>>,
    listeners: Mutex<HashMap<String, Vec<mpsc::Sender<AlertEvent>>>>,
    event_tx: mpsc::Sender<AlertEvent>,
    pub stats: HandlerStats,
}

impl AlertHandler {
    /// `event_tx` is the downstream event sink, consumed by the notification
    /// engine.
    pub fn new(
        db: Arc<dyn Dbase>,
        config: Arc<ConfigHandler>,
        suppressor: Arc<Suppressor>,
        event_tx: mpsc::Sender<AlertEvent>,
    ) -> Self {
        Self {
            db,
            config,
            suppressor,
            transforms: Mutex::new(Vec::new()),
            listeners: Mutex::new(HashMap::new()),
            event_tx,
            stats: HandlerStats::default(),
        }
    }

    pub fn suppressor(&self) -> &Arc<Suppressor> {
        &self.suppressor
    }

    /// Registers a transform. Expected at startup; takes effect for all
    /// later observations.
    pub async fn add_transform(&self, transform: Arc<dyn Transform>) {
        self.transforms.lock().await.push(transform);
    }

    /// Subscribes `queue` to every event for alerts with the given name.
    pub async fn register_listener(&self, alert_name: &str, queue: mpsc::Sender<AlertEvent>) {
        self.listeners
            .lock()
            .await
            .entry(alert_name.to_string())
            .or_default()
            .push(queue);
    }

    /// Processes a new or repeated "still firing" observation.
    ///
    /// A first observation runs transforms and suppression evaluation, is
    /// inserted (assigning `alert.id`), and emits one `active` or
    /// `suppressed` event. A re-observation only touches the persisted row's
    /// `last_active`; no event is re-emitted and the caller's in-memory
    /// alert keeps `id = 0`.
    pub async fn handle_active(&self, tx: &mut dyn Txn, alert: &mut Alert) -> Result<()> {
        let existing = self.track_db(tx.get_alert(&AlertQuery::ByName(alert.name.clone())))?;
        if let Some(mut existing) = existing {
            existing.last_active = Utc::now();
            self.track_db(tx.update_alert(&existing))?;
            tracing::debug!(alert = %existing.name, id = existing.id, "re-observed active alert");
            return Ok(());
        }

        self.apply_transforms(alert).await;

        let matched = self
            .suppressor
            .match_rule(&alert.labels, MatchCondition::Alert)
            .await;
        if let Some(rule) = &matched {
            tracing::info!(
                alert = %alert.name,
                rule_id = rule.id,
                reason = %rule.reason,
                "new alert matches suppression rule"
            );
            alert.suppress(rule.duration_secs);
        }

        let id = self.track_db(tx.insert_alert(alert))?;
        alert.id = id;
        tracing::info!(alert = %alert.name, id, status = %alert.status, "new alert persisted");

        let event_type = if matched.is_some() {
            EventType::Suppressed
        } else {
            EventType::Active
        };
        self.emit(AlertEvent {
            event_type,
            alert: alert.clone(),
        })
        .await;
        Ok(())
    }

    /// Processes a "no longer firing" observation. A no-op when no matching
    /// alert exists or when the alert requires manual clearing.
    pub async fn handle_clear(&self, tx: &mut dyn Txn, alert: &Alert) -> Result<()> {
        let existing = self.track_db(tx.get_alert(&AlertQuery::ByName(alert.name.clone())))?;
        let Some(mut existing) = existing else {
            tracing::debug!(alert = %alert.name, "clear for unknown alert, ignoring");
            return Ok(());
        };
        if !existing.auto_clear {
            tracing::debug!(
                alert = %existing.name,
                id = existing.id,
                "auto-clear disabled, leaving status unchanged"
            );
            return Ok(());
        }
        existing.clear();
        self.track_db(tx.update_alert(&existing))?;
        tracing::info!(alert = %existing.name, id = existing.id, "alert cleared");
        self.emit(AlertEvent {
            event_type: EventType::Cleared,
            alert: existing,
        })
        .await;
        Ok(())
    }

    /// Periodic sweep: transitions every alert past the configured age to
    /// `expired`. Each alert is updated in its own transaction and its event
    /// emitted before the next alert is considered, so cancellation never
    /// leaves a half-updated alert and one failure never blocks the rest.
    pub async fn handle_expiry(&self, token: &CancellationToken) {
        let age = self.config.snapshot().expiry_age_secs;
        let expired: Vec<Alert> = match with_tx(self.db.as_ref(), |tx| {
            tx.select_alerts(&AlertQuery::Expired {
                older_than_secs: age,
            })
        }) {
            Ok(alerts) => alerts,
            Err(e) => {
                self.stats.incr_db_errors();
                tracing::error!(error = %e, "expiry sweep: select failed");
                return;
            }
        };

        for mut alert in expired {
            if token.is_cancelled() {
                tracing::info!("expiry sweep cancelled");
                return;
            }
            alert.expire();
            let updated: std::result::Result<(), StorageError> =
                with_tx(self.db.as_ref(), |tx| tx.update_alert(&alert));
            if let Err(e) = updated {
                self.stats.incr_db_errors();
                tracing::error!(
                    alert = %alert.name,
                    id = alert.id,
                    error = %e,
                    "expiry sweep: update failed, skipping alert"
                );
                continue;
            }
            tracing::info!(alert = %alert.name, id = alert.id, "alert expired");
            self.emit(AlertEvent {
                event_type: EventType::Expired,
                alert,
            })
            .await;
        }
    }

    /// Periodic sweep: raises the severity of unowned alerts whose elapsed
    /// active time has crossed the next configured deadline. One level per
    /// sweep, capped at critical; thresholds are re-evaluated independently
    /// on every sweep, so a long-unowned alert walks info → warn → critical
    /// across repeated calls.
    pub async fn handle_escalation(&self, token: &CancellationToken) {
        let policy = self.config.snapshot().escalation;
        let unowned: Vec<Alert> = match with_tx(self.db.as_ref(), |tx| {
            tx.select_alerts(&AlertQuery::Unowned)
        }) {
            Ok(alerts) => alerts,
            Err(e) => {
                self.stats.incr_db_errors();
                tracing::error!(error = %e, "escalation sweep: select failed");
                return;
            }
        };

        let now = Utc::now();
        for mut alert in unowned {
            if token.is_cancelled() {
                tracing::info!("escalation sweep cancelled");
                return;
            }
            let elapsed_secs = (now - alert.start_time).num_seconds().max(0) as u64;
            let Some(target) = escalation_target(alert.severity, elapsed_secs, &policy) else {
                continue;
            };
            alert.escalate(target);
            let updated: std::result::Result<(), StorageError> =
                with_tx(self.db.as_ref(), |tx| tx.update_alert(&alert));
            if let Err(e) = updated {
                self.stats.incr_db_errors();
                tracing::error!(
                    alert = %alert.name,
                    id = alert.id,
                    error = %e,
                    "escalation sweep: update failed, skipping alert"
                );
                continue;
            }
            tracing::info!(
                alert = %alert.name,
                id = alert.id,
                severity = %alert.severity,
                "alert escalated"
            );
            self.emit(AlertEvent {
                event_type: EventType::Escalated,
                alert,
            })
            .await;
        }
    }

    /// Runs the expiry and escalation sweeps on their configured intervals
    /// until the token is cancelled.
    pub fn start(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let handler = Arc::clone(self);
        tokio::spawn(async move {
            let cfg = handler.config.snapshot();
            let mut expiry = interval(Duration::from_secs(cfg.expiry_check_interval_secs));
            let mut escalation = interval(Duration::from_secs(cfg.escalation_check_interval_secs));
            // the first tick of an interval fires immediately
            expiry.tick().await;
            escalation.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = expiry.tick() => handler.handle_expiry(&token).await,
                    _ = escalation.tick() => handler.handle_escalation(&token).await,
                }
            }
        })
    }

    async fn apply_transforms(&self, alert: &mut Alert) {
        let mut applicable: Vec<Arc<dyn Transform>> = {
            let transforms = self.transforms.lock().await;
            transforms
                .iter()
                .filter(|t| t.applies_to().iter().any(|n| n == &alert.name))
                .cloned()
                .collect()
        };
        applicable.sort_by_key(|t| t.priority());
        for transform in applicable {
            if let Err(e) = transform.apply(alert) {
                self.stats.incr_transform_errors();
                tracing::warn!(
                    alert = %alert.name,
                    transform = transform.name(),
                    error = %e,
                    "transform failed, aborting pipeline for this alert"
                );
                break;
            }
        }
    }

    /// Fans an event out to the registered per-name listeners and the
    /// downstream sink. Senders are snapshotted under the registry lock;
    /// the sends themselves happen after it is released, so a slow consumer
    /// only exerts backpressure on delivery, never on the critical section.
    async fn emit(&self, event: AlertEvent) {
        let targets: Vec<mpsc::Sender<AlertEvent>> = {
            let listeners = self.listeners.lock().await;
            listeners
                .get(&event.alert.name)
                .cloned()
                .unwrap_or_default()
        };
        for queue in targets {
            if queue.send(event.clone()).await.is_err() {
                tracing::warn!(
                    alert = %event.alert.name,
                    "listener queue closed, dropping event"
                );
            }
        }
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!("event sink closed, dropping event");
        }
    }

    fn track_db<T>(&self, result: alertmgr_storage::Result<T>) -> Result<T> {
        result.map_err(|e| {
            self.stats.incr_db_errors();
            HandlerError::from(e)
        })
    }
}

/// The next severity for an unowned alert, or `None` when no deadline has
/// been crossed. Deadlines are cumulative from the alert's start time.
fn escalation_target(
    current: Severity,
    elapsed_secs: u64,
    policy: &EscalationPolicy,
) -> Option<Severity> {
    let next = current.next()?;
    let deadline = match next {
        Severity::Warn => policy.warn_after_secs,
        Severity::Critical => policy.critical_after_secs,
        Severity::Info => return None,
    };
    (elapsed_secs >= deadline).then_some(next)
}
