use crate::types::{Alert, Labels, MatchCondition, Severity, Status, SuppressionRule};
use chrono::{Duration, Utc};

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn severity_is_ordered_and_capped() {
    assert!(Severity::Info < Severity::Warn);
    assert!(Severity::Warn < Severity::Critical);
    assert_eq!(Severity::Info.next(), Some(Severity::Warn));
    assert_eq!(Severity::Critical.next(), None);
}

#[test]
fn status_round_trips_through_strings() {
    for status in [
        Status::Active,
        Status::Suppressed,
        Status::Cleared,
        Status::Expired,
    ] {
        let parsed: Status = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
    assert!("bogus".parse::<Status>().is_err());
}

#[test]
fn alert_key_combines_identity_fields() {
    let alert = Alert::new("bgp down", "edge-01", "peer-7", "bgpmon", "global", Severity::Warn);
    assert_eq!(alert.alert_key, "bgp down:edge-01:peer-7:bgpmon:global");
    assert_eq!(alert.id, 0);
    assert_eq!(alert.status, Status::Active);
}

#[test]
fn alert_suppress_and_unsuppress() {
    let mut alert = Alert::new("a", "d", "e", "s", "sc", Severity::Info);
    alert.suppress(600);
    assert_eq!(alert.status, Status::Suppressed);
    let until = alert.suppressed_until.unwrap();
    assert!(until > Utc::now() + Duration::seconds(590));

    alert.unsuppress();
    assert_eq!(alert.status, Status::Active);
    assert!(alert.suppressed_until.is_none());
}

#[test]
fn alert_escalation_never_regresses() {
    let mut alert = Alert::new("a", "d", "e", "s", "sc", Severity::Warn);
    alert.escalate(Severity::Info);
    assert_eq!(alert.severity, Severity::Warn);
    alert.escalate(Severity::Critical);
    assert_eq!(alert.severity, Severity::Critical);
}

#[test]
fn rule_matches_on_label_subset() {
    let rule = SuppressionRule::new(
        labels(&[("env", "prod"), ("site", "lax")]),
        MatchCondition::Alert,
        "maintenance",
        "planned work",
        "ops",
        3600,
    );

    let full = labels(&[("env", "prod"), ("site", "lax"), ("team", "net")]);
    assert!(rule.is_match(&full, MatchCondition::Alert));

    let missing = labels(&[("env", "prod")]);
    assert!(!rule.is_match(&missing, MatchCondition::Alert));

    let wrong_value = labels(&[("env", "prod"), ("site", "sfo")]);
    assert!(!rule.is_match(&wrong_value, MatchCondition::Alert));
}

#[test]
fn rule_time_left_and_expiry() {
    let mut rule = SuppressionRule::new(
        labels(&[("env", "prod")]),
        MatchCondition::Alert,
        "maintenance",
        "",
        "ops",
        60,
    );
    let now = Utc::now();
    assert!(rule.time_left(now) > Duration::zero());
    assert!(!rule.is_expired(now));

    rule.created_at = now - Duration::seconds(120);
    assert!(rule.time_left(now) < Duration::zero());
    assert!(rule.is_expired(now));

    rule.dont_expire = true;
    assert!(!rule.is_expired(now));
}
