use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// String key/value labels attached to an alert, mutable by transforms and
/// matched by suppression rules.
pub type Labels = HashMap<String, String>;

/// Alert lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Suppressed,
    Cleared,
    Expired,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Active => write!(f, "active"),
            Status::Suppressed => write!(f, "suppressed"),
            Status::Cleared => write!(f, "cleared"),
            Status::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "suppressed" => Ok(Status::Suppressed),
            "cleared" => Ok(Status::Cleared),
            "expired" => Ok(Status::Expired),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use alertmgr_common::types::Severity;
///
/// let sev: Severity = "warn".parse().unwrap();
/// assert_eq!(sev, Severity::Warn);
/// assert!(Severity::Critical > Severity::Info);
/// assert_eq!(Severity::Warn.next(), Some(Severity::Critical));
/// assert_eq!(Severity::Critical.next(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl Severity {
    /// The next level up, or `None` when already at the cap.
    pub fn next(self) -> Option<Severity> {
        match self {
            Severity::Info => Some(Severity::Warn),
            Severity::Warn => Some(Severity::Critical),
            Severity::Critical => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// A unit of monitored condition with a lifecycle status and severity.
///
/// An alert is uniquely identified in storage by its `alert_key`; a repeated
/// observation with the same key updates the existing row rather than
/// creating a new one. `id` is 0 until the row is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub name: String,
    pub device: String,
    pub entity: String,
    pub source: String,
    pub scope: String,
    /// Dedup key combining name, device, entity, source, and scope.
    pub alert_key: String,
    pub status: Status,
    pub severity: Severity,
    pub start_time: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub auto_clear: bool,
    pub owner: Option<String>,
    pub labels: Labels,
    /// When status is `Suppressed`, the time the suppression lapses.
    pub suppressed_until: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        name: &str,
        device: &str,
        entity: &str,
        source: &str,
        scope: &str,
        severity: Severity,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.to_string(),
            device: device.to_string(),
            entity: entity.to_string(),
            source: source.to_string(),
            scope: scope.to_string(),
            alert_key: format!("{name}:{device}:{entity}:{source}:{scope}"),
            status: Status::Active,
            severity,
            start_time: now,
            last_active: now,
            auto_clear: false,
            owner: None,
            labels: Labels::new(),
            suppressed_until: None,
        }
    }

    pub fn suppress(&mut self, duration_secs: u64) {
        self.status = Status::Suppressed;
        self.suppressed_until = Some(Utc::now() + Duration::seconds(duration_secs as i64));
    }

    pub fn unsuppress(&mut self) {
        self.status = Status::Active;
        self.suppressed_until = None;
    }

    pub fn clear(&mut self) {
        self.status = Status::Cleared;
    }

    pub fn expire(&mut self) {
        self.status = Status::Expired;
    }

    /// Raises severity to `to`. Severity never regresses.
    pub fn escalate(&mut self, to: Severity) {
        if to > self.severity {
            self.severity = to;
        }
    }
}

/// The entity type a suppression rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchCondition {
    Alert,
    Device,
}

/// A label-equality predicate plus duration that, when matched, forces an
/// alert into `Suppressed` status instead of `Active`.
///
/// # Examples
///
/// ```
/// use alertmgr_common::types::{Labels, MatchCondition, SuppressionRule};
///
/// let mut matches = Labels::new();
/// matches.insert("env".to_string(), "prod".to_string());
/// let rule = SuppressionRule::new(matches, MatchCondition::Alert, "maintenance", "", "ops", 3600);
///
/// let mut labels = Labels::new();
/// labels.insert("env".to_string(), "prod".to_string());
/// labels.insert("region".to_string(), "us-east".to_string());
/// assert!(rule.is_match(&labels, MatchCondition::Alert));
/// assert!(!rule.is_match(&labels, MatchCondition::Device));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionRule {
    pub id: i64,
    pub match_condition: MatchCondition,
    /// Label pairs that must all be present on the target for a match.
    pub matches: Labels,
    pub rule_type: String,
    pub reason: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub duration_secs: u64,
    /// Rules sourced from static configuration never time-expire.
    pub dont_expire: bool,
}

impl SuppressionRule {
    pub fn new(
        matches: Labels,
        match_condition: MatchCondition,
        rule_type: &str,
        reason: &str,
        created_by: &str,
        duration_secs: u64,
    ) -> Self {
        Self {
            id: 0,
            match_condition,
            matches,
            rule_type: rule_type.to_string(),
            reason: reason.to_string(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            duration_secs,
            dont_expire: false,
        }
    }

    /// True when every configured label pair is present in `labels` and the
    /// rule targets the given entity type.
    pub fn is_match(&self, labels: &Labels, cond: MatchCondition) -> bool {
        self.match_condition == cond
            && self.matches.iter().all(|(k, v)| labels.get(k) == Some(v))
    }

    /// Remaining validity: `created_at + duration - now`.
    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        self.created_at + Duration::seconds(self.duration_secs as i64) - now
    }

    /// An expired rule must be evicted from the working set on the next
    /// match attempt. `dont_expire` rules never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.dont_expire && self.time_left(now) <= Duration::zero()
    }
}

/// Lifecycle transition kind carried by an [`AlertEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Active,
    Suppressed,
    Cleared,
    Expired,
    Escalated,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Active => write!(f, "active"),
            EventType::Suppressed => write!(f, "suppressed"),
            EventType::Cleared => write!(f, "cleared"),
            EventType::Expired => write!(f, "expired"),
            EventType::Escalated => write!(f, "escalated"),
        }
    }
}

/// An immutable notification of a lifecycle transition: the transition kind
/// plus a snapshot of the alert at the moment it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event_type: EventType,
    pub alert: Alert,
}
