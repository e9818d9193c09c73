//! Static configuration for the alert-management core.
//!
//! Configuration is a TOML document declaring per-alert notification
//! policies, escalation thresholds, persistent suppression rules, and the
//! sweep intervals for the background loops. [`ConfigHandler`] wraps the
//! parsed document and supports reloading in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Per-alert-name notification policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertPolicy {
    /// Disables all notifications for this alert name.
    #[serde(default)]
    pub disable_notify: bool,
    /// Minimum time an alert must have been active before the first
    /// notification fires. 0 means notify immediately.
    #[serde(default)]
    pub notify_delay_secs: u64,
    /// Re-notification interval for outstanding alerts. 0 disables reminders.
    #[serde(default)]
    pub notify_remind_secs: u64,
    /// Whether a `cleared` transition produces a notification.
    #[serde(default)]
    pub notify_on_clear: bool,
    /// Named outputs to route to. Empty means the default output.
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Per-severity escalation deadlines, measured from the alert's start time.
///
/// Deadlines are cumulative: an unowned alert escalates to `warn` once it has
/// been active for `warn_after_secs`, and on a later sweep to `critical` once
/// it has been active for `critical_after_secs`. `critical_after_secs` is
/// expected to be larger than `warn_after_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default = "default_warn_after_secs")]
    pub warn_after_secs: u64,
    #[serde(default = "default_critical_after_secs")]
    pub critical_after_secs: u64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            warn_after_secs: default_warn_after_secs(),
            critical_after_secs: default_critical_after_secs(),
        }
    }
}

/// A persistent suppression rule declared in configuration. The suppression
/// engine synthesizes one non-expiring rule per label-match entry on every
/// reload cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionRuleConfig {
    pub matches: HashMap<String, String>,
    #[serde(default = "default_rule_type")]
    pub rule_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_rule_duration_secs")]
    pub duration_secs: u64,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertManagerConfig {
    /// Output to route to when a policy configures none.
    #[serde(default = "default_output_name")]
    pub default_output: String,
    /// Age past which an active or suppressed alert is swept to `expired`.
    #[serde(default = "default_expiry_age_secs")]
    pub expiry_age_secs: u64,
    #[serde(default = "default_expiry_check_interval_secs")]
    pub expiry_check_interval_secs: u64,
    #[serde(default = "default_escalation_check_interval_secs")]
    pub escalation_check_interval_secs: u64,
    #[serde(default = "default_rule_reload_interval_secs")]
    pub rule_reload_interval_secs: u64,
    #[serde(default)]
    pub escalation: EscalationPolicy,
    /// Policies keyed by alert name.
    #[serde(default)]
    pub alerts: HashMap<String, AlertPolicy>,
    #[serde(default)]
    pub suppression_rules: Vec<SuppressionRuleConfig>,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_name(),
            expiry_age_secs: default_expiry_age_secs(),
            expiry_check_interval_secs: default_expiry_check_interval_secs(),
            escalation_check_interval_secs: default_escalation_check_interval_secs(),
            rule_reload_interval_secs: default_rule_reload_interval_secs(),
            escalation: EscalationPolicy::default(),
            alerts: HashMap::new(),
            suppression_rules: Vec::new(),
        }
    }
}

fn default_output_name() -> String {
    "default".to_string()
}

fn default_expiry_age_secs() -> u64 {
    86400
}

fn default_expiry_check_interval_secs() -> u64 {
    300
}

fn default_escalation_check_interval_secs() -> u64 {
    300
}

fn default_rule_reload_interval_secs() -> u64 {
    600
}

fn default_warn_after_secs() -> u64 {
    1800
}

fn default_critical_after_secs() -> u64 {
    7200
}

fn default_rule_type() -> String {
    "alert".to_string()
}

fn default_rule_duration_secs() -> u64 {
    3600
}

/// Shared, reloadable configuration handle passed to all components.
pub struct ConfigHandler {
    inner: RwLock<AlertManagerConfig>,
}

impl ConfigHandler {
    pub fn new(config: AlertManagerConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    /// Parses the TOML document at `path`.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AlertManagerConfig = toml::from_str(&content)?;
        Ok(Self::new(config))
    }

    /// Re-parses `path` and swaps the document in place. On parse failure
    /// the previous configuration stays active.
    pub fn reload(&self, path: &str) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(path)?;
        let config: AlertManagerConfig = toml::from_str(&content)?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AlertManagerConfig> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_alert_config(&self, alert_name: &str) -> Option<AlertPolicy> {
        self.read().alerts.get(alert_name).cloned()
    }

    pub fn get_suppression_rules(&self) -> Vec<SuppressionRuleConfig> {
        self.read().suppression_rules.clone()
    }

    pub fn default_output(&self) -> String {
        self.read().default_output.clone()
    }

    /// A point-in-time copy of the whole document, for sweep loops that read
    /// several fields together.
    pub fn snapshot(&self) -> AlertManagerConfig {
        self.read().clone()
    }
}
