//! In-memory [`Dbase`] implementation with snapshot transactions.
//!
//! A transaction clones the committed state; reads and writes go against the
//! clone and `commit` swaps it back wholesale. That gives real
//! read-your-writes and rollback semantics without a database, which is all
//! the decision core's contract requires.

use crate::{AlertQuery, Dbase, Result, RuleQuery, StorageError, Txn};
use alertmgr_common::types::{Alert, Status, SuppressionRule};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Default)]
struct MemState {
    alerts: BTreeMap<i64, Alert>,
    rules: BTreeMap<i64, SuppressionRule>,
    next_alert_id: i64,
    next_rule_id: i64,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemDb {
    state: Arc<Mutex<MemState>>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dbase for MemDb {
    fn new_tx(&self) -> Box<dyn Txn> {
        let snapshot = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Box::new(MemTxn {
            state: Arc::clone(&self.state),
            snapshot,
        })
    }
}

struct MemTxn {
    state: Arc<Mutex<MemState>>,
    snapshot: MemState,
}

impl Txn for MemTxn {
    fn insert_alert(&mut self, alert: &Alert) -> Result<i64> {
        if self
            .snapshot
            .alerts
            .values()
            .any(|a| a.alert_key == alert.alert_key)
        {
            return Err(StorageError::Duplicate {
                entity: "alert",
                key: alert.alert_key.clone(),
            });
        }
        self.snapshot.next_alert_id += 1;
        let id = self.snapshot.next_alert_id;
        let mut row = alert.clone();
        row.id = id;
        self.snapshot.alerts.insert(id, row);
        Ok(id)
    }

    fn update_alert(&mut self, alert: &Alert) -> Result<()> {
        if !self.snapshot.alerts.contains_key(&alert.id) {
            return Err(StorageError::NotFound {
                entity: "alert",
                id: alert.id,
            });
        }
        self.snapshot.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    fn get_alert(&mut self, query: &AlertQuery) -> Result<Option<Alert>> {
        Ok(self.select_alerts(query)?.into_iter().next())
    }

    fn select_alerts(&mut self, query: &AlertQuery) -> Result<Vec<Alert>> {
        let now = Utc::now();
        let rows = self
            .snapshot
            .alerts
            .values()
            .filter(|a| match query {
                AlertQuery::ByName(name) => &a.name == name,
                AlertQuery::ById(id) => a.id == *id,
                AlertQuery::Expired { older_than_secs } => {
                    matches!(a.status, Status::Active | Status::Suppressed)
                        && now - a.last_active >= Duration::seconds(*older_than_secs as i64)
                }
                AlertQuery::Unowned => a.status == Status::Active && a.owner.is_none(),
            })
            .cloned()
            .collect();
        Ok(rows)
    }

    fn select_rules(&mut self, query: &RuleQuery) -> Result<Vec<SuppressionRule>> {
        let now = Utc::now();
        match query {
            RuleQuery::Active { limit } => {
                let mut rules: Vec<SuppressionRule> = self
                    .snapshot
                    .rules
                    .values()
                    .filter(|r| !r.is_expired(now))
                    .cloned()
                    .collect();
                rules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                rules.truncate(*limit);
                Ok(rules)
            }
        }
    }

    fn insert_rule(&mut self, rule: &SuppressionRule) -> Result<i64> {
        self.snapshot.next_rule_id += 1;
        let id = self.snapshot.next_rule_id;
        let mut row = rule.clone();
        row.id = id;
        self.snapshot.rules.insert(id, row);
        Ok(id)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = self.snapshot;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
