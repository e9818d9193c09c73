//! Notification engine: decides, per configured policy, which lifecycle
//! events become notifications and routes them to named output queues.
//!
//! The engine consumes the lifecycle handler's event stream. Each alert that
//! has been notified gets a tracking record keyed by its storage identity;
//! the reminder loop walks those records on a fixed interval and re-sends
//! outstanding alerts whose policy asks for reminders. The record map is
//! guarded by one exclusive lock shared between [`Notifier::notify`] and the
//! reminder loop; queue sends always happen after the lock is released.

#[cfg(test)]
mod tests;

use alertmgr_common::types::{AlertEvent, EventType, Status};
use alertmgr_config::{AlertPolicy, ConfigHandler};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

/// Fixed check interval for the reminder loop. Per-alert reminder cadence
/// comes from the policy's `notify_remind_secs`.
const REMIND_CHECK_INTERVAL_SECS: u64 = 120;

/// Per-alert tracking record: the last event sent (or absorbed) and when a
/// notification last went out.
struct Notification {
    event: AlertEvent,
    last_notified: DateTime<Utc>,
}

/// Routes lifecycle events to named output queues and re-notifies
/// outstanding alerts.
pub struct Notifier {
    config: Arc<ConfigHandler>,
    outputs: Mutex<HashMap<String, mpsc::Sender<AlertEvent>>>,
    tracked: Mutex<HashMap<i64, Notification>>,
}

impl Notifier {
    pub fn new(config: Arc<ConfigHandler>) -> Self {
        Self {
            config,
            outputs: Mutex::new(HashMap::new()),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a delivery queue under `name`. Policies route by these
    /// names; a name nothing is registered under is skipped at send time.
    pub async fn register_output(&self, name: &str, queue: mpsc::Sender<AlertEvent>) {
        self.outputs.lock().await.insert(name.to_string(), queue);
    }

    /// The central decision function, applied to every lifecycle event.
    ///
    /// `active` notifies once per alert, after the policy's notify-delay has
    /// been satisfied. `cleared` and `expired` drop the tracking record;
    /// `cleared` only notifies when the policy opts in. `suppressed` and
    /// `escalated` update a tracked alert's record in place for the reminder
    /// loop to pick up, and only notify immediately when the alert was never
    /// tracked.
    pub async fn notify(&self, event: AlertEvent) {
        let policy = self
            .config
            .get_alert_config(&event.alert.name)
            .unwrap_or_default();
        if policy.disable_notify {
            tracing::debug!(alert = %event.alert.name, "notifications disabled by policy");
            return;
        }

        match event.event_type {
            EventType::Active => {
                let mut tracked = self.tracked.lock().await;
                if tracked.contains_key(&event.alert.id) {
                    tracing::debug!(
                        alert = %event.alert.name,
                        id = event.alert.id,
                        "already notified, skipping"
                    );
                    return;
                }
                if policy.notify_delay_secs > 0 {
                    let active_secs =
                        (event.alert.last_active - event.alert.start_time).num_seconds();
                    if active_secs < policy.notify_delay_secs as i64 {
                        tracing::debug!(
                            alert = %event.alert.name,
                            id = event.alert.id,
                            active_secs,
                            "notify delay not yet satisfied"
                        );
                        return;
                    }
                }
                tracked.insert(
                    event.alert.id,
                    Notification {
                        event: event.clone(),
                        last_notified: Utc::now(),
                    },
                );
                drop(tracked);
                self.send(&event, &policy).await;
            }
            EventType::Cleared | EventType::Expired => {
                self.tracked.lock().await.remove(&event.alert.id);
                if event.event_type == EventType::Cleared && !policy.notify_on_clear {
                    tracing::debug!(
                        alert = %event.alert.name,
                        id = event.alert.id,
                        "notify on clear disabled by policy"
                    );
                    return;
                }
                self.send(&event, &policy).await;
            }
            EventType::Suppressed | EventType::Escalated => {
                {
                    let mut tracked = self.tracked.lock().await;
                    if let Some(record) = tracked.get_mut(&event.alert.id) {
                        // the reminder loop sends the latest event next cycle
                        record.event = event;
                        return;
                    }
                }
                self.send(&event, &policy).await;
            }
        }
    }

    /// One pass of the reminder loop: re-sends every tracked alert whose
    /// policy has a nonzero reminder interval that has elapsed since the last
    /// notification. Suppressed alerts are skipped without being untracked.
    pub async fn remind(&self) {
        let now = Utc::now();
        let due: Vec<AlertEvent> = {
            let mut tracked = self.tracked.lock().await;
            let mut due = Vec::new();
            for record in tracked.values_mut() {
                if record.event.alert.status == Status::Suppressed {
                    continue;
                }
                let policy = self
                    .config
                    .get_alert_config(&record.event.alert.name)
                    .unwrap_or_default();
                if policy.disable_notify || policy.notify_remind_secs == 0 {
                    continue;
                }
                if (now - record.last_notified).num_seconds()
                    >= policy.notify_remind_secs as i64
                {
                    record.last_notified = now;
                    due.push(record.event.clone());
                }
            }
            due
        };

        for event in due {
            tracing::info!(alert = %event.alert.name, id = event.alert.id, "sending reminder");
            let policy = self
                .config
                .get_alert_config(&event.alert.name)
                .unwrap_or_default();
            self.send(&event, &policy).await;
        }
    }

    /// Delivers `event` to the policy's outputs, or to the default output
    /// when the policy configures none. Senders are snapshotted under the
    /// registry lock and the sends happen after it is released.
    async fn send(&self, event: &AlertEvent, policy: &AlertPolicy) {
        let names: Vec<String> = if policy.outputs.is_empty() {
            vec![self.config.default_output()]
        } else {
            policy.outputs.clone()
        };
        let targets: Vec<(String, mpsc::Sender<AlertEvent>)> = {
            let outputs = self.outputs.lock().await;
            names
                .iter()
                .filter_map(|name| outputs.get(name).map(|q| (name.clone(), q.clone())))
                .collect()
        };
        for (name, queue) in targets {
            if queue.send(event.clone()).await.is_err() {
                tracing::warn!(
                    output = %name,
                    alert = %event.alert.name,
                    "output queue closed, dropping notification"
                );
            } else {
                tracing::debug!(
                    output = %name,
                    alert = %event.alert.name,
                    event = %event.event_type,
                    "notification sent"
                );
            }
        }
    }

    /// Consumes the lifecycle event stream and multiplexes the reminder
    /// ticker until the token is cancelled or the stream closes.
    pub fn run(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<AlertEvent>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(REMIND_CHECK_INTERVAL_SECS));
            tick.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => notifier.remind().await,
                    received = events.recv() => match received {
                        Some(event) => notifier.notify(event).await,
                        None => break,
                    },
                }
            }
        })
    }
}
