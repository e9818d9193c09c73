use crate::Notifier;
use alertmgr_common::types::{Alert, AlertEvent, EventType, Severity};
use alertmgr_config::{AlertManagerConfig, AlertPolicy, ConfigHandler};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn config_with(alerts: &[(&str, AlertPolicy)]) -> Arc<ConfigHandler> {
    let mut config = AlertManagerConfig::default();
    for (name, policy) in alerts {
        config.alerts.insert(name.to_string(), policy.clone());
    }
    Arc::new(ConfigHandler::new(config))
}

async fn notifier_with_default_output(
    alerts: &[(&str, AlertPolicy)],
) -> (Arc<Notifier>, mpsc::Receiver<AlertEvent>) {
    let notifier = Arc::new(Notifier::new(config_with(alerts)));
    let (tx, rx) = mpsc::channel(16);
    notifier.register_output("default", tx).await;
    (notifier, rx)
}

fn make_event(event_type: EventType, name: &str, id: i64) -> AlertEvent {
    let mut alert = Alert::new(name, "d1", "e1", "src1", "scope1", Severity::Warn);
    alert.id = id;
    match event_type {
        EventType::Suppressed => alert.suppress(600),
        EventType::Cleared => alert.clear(),
        EventType::Expired => alert.expire(),
        EventType::Active | EventType::Escalated => {}
    }
    AlertEvent { event_type, alert }
}

async fn tracked_count(notifier: &Notifier) -> usize {
    notifier.tracked.lock().await.len()
}

#[tokio::test]
async fn active_event_notifies_once() {
    let (notifier, mut rx) = notifier_with_default_output(&[]).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    let out = rx.recv().await.unwrap();
    assert_eq!(out.event_type, EventType::Active);
    assert_eq!(tracked_count(&notifier).await, 1);

    // repeated active for a tracked alert never re-notifies
    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn disabled_policy_suppresses_everything() {
    let policy = AlertPolicy {
        disable_notify: true,
        ..AlertPolicy::default()
    };
    let (notifier, mut rx) = notifier_with_default_output(&[("net down", policy)]).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    notifier.notify(make_event(EventType::Expired, "net down", 1)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(tracked_count(&notifier).await, 0);
}

#[tokio::test]
async fn notify_delay_defers_until_alert_has_been_active_long_enough() {
    let policy = AlertPolicy {
        notify_delay_secs: 300,
        ..AlertPolicy::default()
    };
    let (notifier, mut rx) = notifier_with_default_output(&[("net down", policy)]).await;

    // freshly started: last_active == start_time
    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(tracked_count(&notifier).await, 0);

    // re-observed past the delay
    let mut event = make_event(EventType::Active, "net down", 1);
    event.alert.last_active = event.alert.start_time + Duration::seconds(600);
    notifier.notify(event).await;
    assert_eq!(rx.recv().await.unwrap().event_type, EventType::Active);
    assert_eq!(tracked_count(&notifier).await, 1);
}

#[tokio::test]
async fn cleared_drops_record_and_only_notifies_when_opted_in() {
    let (notifier, mut rx) = notifier_with_default_output(&[]).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    rx.recv().await.unwrap();

    // notify_on_clear defaults off: record gone, nothing sent
    notifier.notify(make_event(EventType::Cleared, "net down", 1)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(tracked_count(&notifier).await, 0);

    let policy = AlertPolicy {
        notify_on_clear: true,
        ..AlertPolicy::default()
    };
    let (notifier, mut rx) = notifier_with_default_output(&[("net down", policy)]).await;
    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    rx.recv().await.unwrap();
    notifier.notify(make_event(EventType::Cleared, "net down", 1)).await;
    assert_eq!(rx.recv().await.unwrap().event_type, EventType::Cleared);
}

#[tokio::test]
async fn expired_always_notifies_and_drops_record() {
    let (notifier, mut rx) = notifier_with_default_output(&[]).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    rx.recv().await.unwrap();

    notifier.notify(make_event(EventType::Expired, "net down", 1)).await;
    assert_eq!(rx.recv().await.unwrap().event_type, EventType::Expired);
    assert_eq!(tracked_count(&notifier).await, 0);
}

#[tokio::test]
async fn suppressed_updates_tracked_record_without_sending() {
    let (notifier, mut rx) = notifier_with_default_output(&[]).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    rx.recv().await.unwrap();

    notifier.notify(make_event(EventType::Suppressed, "net down", 1)).await;
    assert!(rx.try_recv().is_err());

    let tracked = notifier.tracked.lock().await;
    assert_eq!(tracked[&1].event.event_type, EventType::Suppressed);
}

#[tokio::test]
async fn suppressed_for_untracked_alert_notifies_immediately() {
    let (notifier, mut rx) = notifier_with_default_output(&[]).await;

    notifier.notify(make_event(EventType::Suppressed, "net down", 7)).await;
    assert_eq!(rx.recv().await.unwrap().event_type, EventType::Suppressed);
    assert_eq!(tracked_count(&notifier).await, 0);
}

#[tokio::test]
async fn reminder_resends_after_interval_and_updates_last_notified() {
    let policy = AlertPolicy {
        notify_remind_secs: 300,
        ..AlertPolicy::default()
    };
    let (notifier, mut rx) = notifier_with_default_output(&[("net down", policy)]).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    rx.recv().await.unwrap();

    // nothing due yet
    notifier.remind().await;
    assert!(rx.try_recv().is_err());

    // age the record past the reminder interval
    {
        let mut tracked = notifier.tracked.lock().await;
        tracked.get_mut(&1).unwrap().last_notified = Utc::now() - Duration::seconds(600);
    }
    notifier.remind().await;
    assert_eq!(rx.recv().await.unwrap().event_type, EventType::Active);

    // last_notified was refreshed, so the next pass is quiet again
    notifier.remind().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn reminder_resends_the_latest_tracked_event() {
    let policy = AlertPolicy {
        notify_remind_secs: 300,
        ..AlertPolicy::default()
    };
    let (notifier, mut rx) = notifier_with_default_output(&[("net down", policy)]).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;
    rx.recv().await.unwrap();

    let mut escalated = make_event(EventType::Escalated, "net down", 1);
    escalated.alert.severity = Severity::Critical;
    notifier.notify(escalated).await;
    assert!(rx.try_recv().is_err());

    {
        let mut tracked = notifier.tracked.lock().await;
        tracked.get_mut(&1).unwrap().last_notified = Utc::now() - Duration::seconds(600);
    }
    notifier.remind().await;
    let out = rx.recv().await.unwrap();
    assert_eq!(out.event_type, EventType::Escalated);
    assert_eq!(out.alert.severity, Severity::Critical);
}

#[tokio::test]
async fn reminder_skips_suppressed_and_unconfigured_alerts() {
    let remind = AlertPolicy {
        notify_remind_secs: 300,
        ..AlertPolicy::default()
    };
    let (notifier, mut rx) =
        notifier_with_default_output(&[("reminds", remind)]).await;

    // "silent" has no reminder interval configured
    notifier.notify(make_event(EventType::Active, "silent", 1)).await;
    notifier.notify(make_event(EventType::Active, "reminds", 2)).await;
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();
    notifier.notify(make_event(EventType::Suppressed, "reminds", 2)).await;

    {
        let mut tracked = notifier.tracked.lock().await;
        for record in tracked.values_mut() {
            record.last_notified = Utc::now() - Duration::seconds(600);
        }
    }
    notifier.remind().await;
    assert!(rx.try_recv().is_err());
    // both stay tracked for future cycles
    assert_eq!(tracked_count(&notifier).await, 2);
}

#[tokio::test]
async fn routes_to_policy_outputs_and_skips_unknown_names() {
    let policy = AlertPolicy {
        outputs: vec!["pager".to_string(), "nowhere".to_string()],
        ..AlertPolicy::default()
    };
    let notifier = Arc::new(Notifier::new(config_with(&[("net down", policy)])));
    let (pager_tx, mut pager_rx) = mpsc::channel(16);
    let (default_tx, mut default_rx) = mpsc::channel(16);
    notifier.register_output("pager", pager_tx).await;
    notifier.register_output("default", default_tx).await;

    notifier.notify(make_event(EventType::Active, "net down", 1)).await;

    // "pager" receives, "nowhere" is skipped, the default is not consulted
    assert_eq!(pager_rx.recv().await.unwrap().event_type, EventType::Active);
    assert!(default_rx.try_recv().is_err());
}

#[tokio::test]
async fn run_consumes_events_until_cancelled() {
    let (notifier, mut rx) = notifier_with_default_output(&[]).await;
    let (event_tx, event_rx) = mpsc::channel(16);
    let token = CancellationToken::new();
    let handle = notifier.run(event_rx, token.clone());

    event_tx
        .send(make_event(EventType::Active, "net down", 1))
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap().event_type, EventType::Active);

    token.cancel();
    handle.await.unwrap();
}
