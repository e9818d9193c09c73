//! Suppression engine: the in-memory working set of suppression rules.
//!
//! Rules come from two sources on every reload cycle: non-expired rules in
//! storage (bounded page) and rules synthesized from static configuration,
//! which never time-expire. Reload is a full replace, not a merge. Expired
//! rules are never swept proactively; they are discovered and evicted on the
//! next match attempt that visits them.

use crate::error::{HandlerError, Result};
use alertmgr_common::types::{Alert, Labels, MatchCondition, Status, SuppressionRule};
use alertmgr_config::ConfigHandler;
use alertmgr_storage::{with_tx, AlertQuery, Dbase, RuleQuery, StorageError, Txn};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

/// Page size for the periodic rule fetch from storage.
const RULE_FETCH_LIMIT: usize = 50;

/// Manages suppression rules and alert suppression state.
///
/// The rule cache is guarded by a single exclusive lock; matching and
/// reloading are never concurrent with each other. The lock is never held
/// across a storage round trip on behalf of other components.
pub struct Suppressor {
    db: Arc<dyn Dbase>,
    config: Arc<ConfigHandler>,
    rules: Mutex<Vec<SuppressionRule>>,
}

impl Suppressor {
    pub fn new(db: Arc<dyn Dbase>, config: Arc<ConfigHandler>) -> Self {
        Self {
            db,
            config,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the working set with the current storage page plus rules
    /// synthesized from configuration (one per label-match entry, never
    /// expiring). Rules absent from the latest load disappear from the cache.
    pub async fn load_rules(&self) {
        tracing::debug!("reloading suppression rules");
        let fetched: std::result::Result<Vec<SuppressionRule>, StorageError> =
            with_tx(self.db.as_ref(), |tx| {
                tx.select_rules(&RuleQuery::Active {
                    limit: RULE_FETCH_LIMIT,
                })
            });
        let stored = fetched.unwrap_or_else(|e| {
            tracing::error!(error = %e, "unable to select suppression rules from storage");
            Vec::new()
        });

        let mut rules = stored;
        for rc in self.config.get_suppression_rules() {
            for (key, value) in &rc.matches {
                let mut matches = Labels::new();
                matches.insert(key.clone(), value.clone());
                let mut rule = SuppressionRule::new(
                    matches,
                    MatchCondition::Alert,
                    &rc.rule_type,
                    &rc.reason,
                    "alert manager",
                    rc.duration_secs,
                );
                rule.dont_expire = true;
                rules.push(rule);
            }
        }

        let count = rules.len();
        *self.rules.lock().await = rules;
        tracing::debug!(count, "suppression rules loaded");
    }

    /// Returns the best rule matching `labels` for the given entity type, or
    /// `None`. Ties between several matching rules go to the most recently
    /// created one. Every expired rule visited during the pass is evicted
    /// from the cache (collect-then-retain, so iteration stays safe).
    pub async fn match_rule(&self, labels: &Labels, cond: MatchCondition) -> Option<SuppressionRule> {
        let now = Utc::now();
        let mut rules = self.rules.lock().await;

        let best = rules
            .iter()
            .filter(|r| !r.is_expired(now) && r.is_match(labels, cond))
            .max_by_key(|r| r.created_at)
            .cloned();

        let before = rules.len();
        rules.retain(|r| !r.is_expired(now));
        let evicted = before - rules.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted expired suppression rules");
        }

        best
    }

    /// Persists a new rule, assigns its identity, and adds it to the cache.
    pub async fn save_rule(
        &self,
        tx: &mut dyn Txn,
        mut rule: SuppressionRule,
    ) -> Result<SuppressionRule> {
        let id = tx.insert_rule(&rule)?;
        rule.id = id;
        self.rules.lock().await.push(rule.clone());
        Ok(rule)
    }

    /// Suppresses `alert` for the rule's duration, persists it, then persists
    /// and caches the rule. The rule save is only attempted once the alert
    /// update has succeeded.
    pub async fn suppress_alert(
        &self,
        tx: &mut dyn Txn,
        alert: &mut Alert,
        rule: SuppressionRule,
    ) -> Result<()> {
        alert.suppress(rule.duration_secs);
        tx.update_alert(alert)?;
        let saved = self.save_rule(tx, rule).await?;
        tracing::info!(
            alert = %alert.name,
            id = alert.id,
            rule_id = saved.id,
            reason = %saved.reason,
            "alert suppressed"
        );
        Ok(())
    }

    /// Reverts a suppressed alert to active. Rejects the operation when the
    /// persisted status is no longer `suppressed` (the caller's state is
    /// stale: the alert has meanwhile cleared or expired).
    pub async fn unsuppress_alert(&self, tx: &mut dyn Txn, alert: &mut Alert) -> Result<()> {
        let existing = tx
            .get_alert(&AlertQuery::ById(alert.id))?
            .ok_or_else(|| HandlerError::Precondition(format!("alert {} not found", alert.id)))?;
        if existing.status != Status::Suppressed {
            return Err(HandlerError::Precondition(format!(
                "alert {} has cleared or expired, not unsuppressing",
                existing.id
            )));
        }
        alert.unsuppress();
        tx.update_alert(alert)?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn rule_count(&self) -> usize {
        self.rules.lock().await.len()
    }

    /// Loads rules immediately, then reloads on the configured interval
    /// until the token is cancelled.
    pub fn start(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let suppressor = Arc::clone(self);
        tokio::spawn(async move {
            suppressor.load_rules().await;
            let reload_secs = suppressor.config.snapshot().rule_reload_interval_secs;
            let mut tick = interval(Duration::from_secs(reload_secs));
            tick.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => suppressor.load_rules().await,
                }
            }
        })
    }
}
