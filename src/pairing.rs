use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{SourceType, Transaction};
use crate::sign_policy::DEFAULT_MATCH_WINDOW_DAYS;
use crate::store::TransactionStore;

/// Namespace for deterministic pair ids.
const PAIR_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_6467_6572_6c65_6e73_7061_6972_0001);

#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Paired {
        pair_id: String,
        leader: String,
        shadow: String,
    },
    AlreadyPaired {
        pair_id: String,
    },
    NoMatch,
}

impl PairOutcome {
    pub fn pair_id(&self) -> Option<&str> {
        match self {
            Self::Paired { pair_id, .. } | Self::AlreadyPaired { pair_id } => Some(pair_id),
            Self::NoMatch => None,
        }
    }
}

/// Same id for the same two transactions regardless of argument order.
pub fn pair_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let id = Uuid::new_v5(&PAIR_NAMESPACE, format!("{lo}|{hi}").as_bytes());
    format!("pair-{}", id.simple())
}

fn compatible_types(a: SourceType, b: SourceType) -> bool {
    a == SourceType::Bank || b == SourceType::Bank
}

/// The transfer predicate, symmetric in `a` and `b`.
pub fn is_transfer_pair(a: &Transaction, b: &Transaction, window_days: i64, tolerance: Decimal) -> bool {
    a.id != b.id
        && a.tenant == b.tenant
        && a.source != b.source
        && compatible_types(a.source_type, b.source_type)
        && !a.amount.is_zero()
        && !b.amount.is_zero()
        && a.amount.is_sign_negative() != b.amount.is_sign_negative()
        && (a.amount.abs() - b.amount.abs()).abs() <= tolerance
        && (a.date - b.date).num_days().abs() <= window_days
}

/// Earlier leg leads; on the same day the outflow (positive) leg leads.
fn leader_first<'a>(a: &'a Transaction, b: &'a Transaction) -> (&'a Transaction, &'a Transaction) {
    match a.date.cmp(&b.date) {
        std::cmp::Ordering::Less => (a, b),
        std::cmp::Ordering::Greater => (b, a),
        std::cmp::Ordering::Equal if a.amount > Decimal::ZERO => (a, b),
        std::cmp::Ordering::Equal => (b, a),
    }
}

pub struct TransferPairing {
    store: Arc<dyn TransactionStore>,
    window_days: i64,
    tolerance: Decimal,
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TransferPairing {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            window_days: DEFAULT_MATCH_WINDOW_DAYS,
            tolerance: Decimal::new(1, 2),
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days;
        self
    }

    fn tenant_lock(&self, tenant: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .tenant_locks
            .lock()
            .map_err(|_| LedgerError::Other("pairing lock poisoned".to_string()))?;
        Ok(locks.entry(tenant.to_string()).or_default().clone())
    }

    /// Find and link the counterpart of `txn_id`. Idempotent: an already
    /// paired record reports its existing pair id.
    pub fn pair(&self, tenant: &str, txn_id: &str) -> Result<PairOutcome> {
        let lock = self.tenant_lock(tenant)?;
        let _guard = lock
            .lock()
            .map_err(|_| LedgerError::Other("pairing lock poisoned".to_string()))?;

        let Some(txn) = self.store.get_transaction(txn_id)? else {
            return Err(LedgerError::Other(format!("No transaction with ID {txn_id}")));
        };
        if txn.tenant != tenant {
            return Ok(PairOutcome::NoMatch);
        }
        if let Some(pair_id) = txn.pair_id {
            return Ok(PairOutcome::AlreadyPaired { pair_id });
        }

        let window = Duration::days(self.window_days);
        let candidates = self.store.range(tenant, txn.date - window, txn.date + window, None)?;
        let Some(other) = candidates
            .iter()
            .find(|c| c.pair_id.is_none() && is_transfer_pair(&txn, c, self.window_days, self.tolerance))
        else {
            return Ok(PairOutcome::NoMatch);
        };

        let (leader, shadow) = leader_first(&txn, other);
        let id = pair_id(&leader.id, &shadow.id);
        if self.store.link_pair(&leader.id, &shadow.id, &id)? {
            debug!(pair_id = %id, leader = %leader.id, shadow = %shadow.id, "linked transfer");
            return Ok(PairOutcome::Paired {
                pair_id: id,
                leader: leader.id.clone(),
                shadow: shadow.id.clone(),
            });
        }
        // another writer linked one side first
        match self.store.get_transaction(txn_id)?.and_then(|t| t.pair_id) {
            Some(pair_id) => Ok(PairOutcome::AlreadyPaired { pair_id }),
            None => Ok(PairOutcome::NoMatch),
        }
    }

    /// Pair every unpaired record in the range, in natural order. Store
    /// failures on one record leave it unpaired and the sweep continues.
    pub fn pair_range(&self, tenant: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<PairOutcome>> {
        let mut outcomes = Vec::new();
        for txn in self.store.range(tenant, from, to, None)? {
            if txn.pair_id.is_some() {
                continue;
            }
            // the counterpart of an earlier pair reports AlreadyPaired and is skipped
            match self.pair(tenant, &txn.id) {
                Ok(outcome @ PairOutcome::Paired { .. }) => outcomes.push(outcome),
                Ok(_) => {}
                Err(e) => warn!(id = %txn.id, error = %e, "pairing failed"),
            }
        }
        Ok(outcomes)
    }
}
