use std::sync::Arc;

use chrono::Duration;
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{InflowKind, SourceType, Transaction};
use crate::store::{source_type_at, SqliteStore, TransactionStore};

pub const DEFAULT_SAMPLE_SIZE: usize = 150;
pub const DEFAULT_MATCH_WINDOW_DAYS: i64 = 5;

/// Learned convention for one source: the raw sign its outflows (bank) or
/// charges (card, loan) are printed with.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePolicy {
    pub source: String,
    pub source_type: SourceType,
    pub sign: i8,
    pub sample_size: usize,
    pub learned_at: Option<String>,
}

impl SourcePolicy {
    /// Raw amount in display convention: outflows and charges positive.
    pub fn display_amount(&self, raw: Decimal) -> Decimal {
        if self.sign < 0 {
            -raw
        } else {
            raw
        }
    }
}

pub trait PolicyStore: Send + Sync {
    fn get_policy(&self, tenant: &str, source: &str) -> Result<Option<SourcePolicy>>;
    /// Insert if absent. Returns whichever policy is stored afterwards, so
    /// concurrent learners agree on the first writer's result.
    fn claim_policy(&self, tenant: &str, policy: &SourcePolicy) -> Result<SourcePolicy>;
    fn reset_policy(&self, tenant: &str, source: &str) -> Result<bool>;
    fn list_policies(&self, tenant: &str) -> Result<Vec<SourcePolicy>>;
}

const POLICY_COLUMNS: &str = "source, source_type, sign, sample_size, learned_at";

fn row_to_policy(row: &Row<'_>) -> rusqlite::Result<SourcePolicy> {
    Ok(SourcePolicy {
        source: row.get(0)?,
        source_type: source_type_at(row, 1)?,
        sign: row.get(2)?,
        sample_size: row.get::<_, i64>(3)? as usize,
        learned_at: row.get(4)?,
    })
}

impl PolicyStore for SqliteStore {
    fn get_policy(&self, tenant: &str, source: &str) -> Result<Option<SourcePolicy>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {POLICY_COLUMNS} FROM source_policies WHERE tenant = ?1 AND source = ?2");
            Ok(conn.query_row(&sql, params![tenant, source], row_to_policy).optional()?)
        })
    }

    fn claim_policy(&self, tenant: &str, policy: &SourcePolicy) -> Result<SourcePolicy> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO source_policies (tenant, source, source_type, sign, sample_size) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tenant,
                    policy.source,
                    policy.source_type.as_str(),
                    policy.sign,
                    policy.sample_size as i64
                ],
            )?;
            let sql = format!("SELECT {POLICY_COLUMNS} FROM source_policies WHERE tenant = ?1 AND source = ?2");
            Ok(tx.query_row(&sql, params![tenant, policy.source], row_to_policy)?)
        })
    }

    fn reset_policy(&self, tenant: &str, source: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM source_policies WHERE tenant = ?1 AND source = ?2",
                params![tenant, source],
            )?;
            Ok(n > 0)
        })
    }

    fn list_policies(&self, tenant: &str) -> Result<Vec<SourcePolicy>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {POLICY_COLUMNS} FROM source_policies WHERE tenant = ?1 ORDER BY source");
            let mut stmt = conn.prepare(&sql)?;
            let policies = stmt
                .query_map([tenant], row_to_policy)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(policies)
        })
    }
}

/// Majority sign of the sample. Zeros abstain; a tie or an empty sample is +1.
pub fn majority_sign(sample: &[Decimal]) -> i8 {
    let negatives = sample.iter().filter(|a| a.is_sign_negative() && !a.is_zero()).count();
    let positives = sample.iter().filter(|a| a.is_sign_positive() && !a.is_zero()).count();
    if negatives > positives {
        -1
    } else {
        1
    }
}

pub struct SignPolicyEngine {
    policies: Arc<dyn PolicyStore>,
    history: Arc<dyn TransactionStore>,
    sample_size: usize,
    match_window_days: i64,
}

impl SignPolicyEngine {
    pub fn new(policies: Arc<dyn PolicyStore>, history: Arc<dyn TransactionStore>) -> Self {
        Self {
            policies,
            history,
            sample_size: DEFAULT_SAMPLE_SIZE,
            match_window_days: DEFAULT_MATCH_WINDOW_DAYS,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    pub fn with_match_window_days(mut self, days: i64) -> Self {
        self.match_window_days = days;
        self
    }

    /// Cached policy for `source`, learning it on first sight from the
    /// incoming batch plus stored history.
    pub fn policy_for(
        &self,
        tenant: &str,
        source: &str,
        source_type: SourceType,
        batch_raw: &[Decimal],
    ) -> Result<SourcePolicy> {
        if let Some(policy) = self.policies.get_policy(tenant, source)? {
            return Ok(policy);
        }
        let mut sample: Vec<Decimal> = batch_raw.iter().take(self.sample_size).copied().collect();
        if sample.len() < self.sample_size {
            let stored = self
                .history
                .recent_raw_amounts(tenant, source, self.sample_size - sample.len())?;
            sample.extend(stored);
        }
        let learned = SourcePolicy {
            source: source.to_string(),
            source_type,
            sign: majority_sign(&sample),
            sample_size: sample.len(),
            learned_at: None,
        };
        let policy = self.policies.claim_policy(tenant, &learned)?;
        info!(source, sign = policy.sign, sample = policy.sample_size, "learned sign policy");
        Ok(policy)
    }

    /// Tag liability-source inflows as payment or refund, and upgrade earlier
    /// refund tags when a matching bank outflow arrives. Returns the number
    /// of labels written.
    pub fn label_inflows(&self, txns: &[Transaction]) -> Result<usize> {
        let mut written = 0usize;
        for txn in txns {
            let window = Duration::days(self.match_window_days);
            if txn.source_type.is_liability() && txn.amount < Decimal::ZERO {
                let banks = self.history.range(
                    &txn.tenant,
                    txn.date - window,
                    txn.date + window,
                    Some(SourceType::Bank),
                )?;
                let matched = banks
                    .iter()
                    .any(|b| b.amount > Decimal::ZERO && b.amount.abs() == txn.amount.abs());
                let kind = if matched { InflowKind::Payment } else { InflowKind::Refund };
                if txn.inflow_kind != Some(kind) {
                    self.history.set_inflow_kind(&txn.id, kind)?;
                    written += 1;
                }
            } else if txn.source_type == SourceType::Bank && txn.amount > Decimal::ZERO {
                for source_type in [SourceType::Card, SourceType::Loan] {
                    let liabilities = self.history.range(
                        &txn.tenant,
                        txn.date - window,
                        txn.date + window,
                        Some(source_type),
                    )?;
                    for l in liabilities.iter().filter(|l| {
                        l.amount < Decimal::ZERO
                            && l.amount.abs() == txn.amount
                            && l.inflow_kind != Some(InflowKind::Payment)
                    }) {
                        debug!(id = %l.id, "inflow matched a bank outflow, labeling payment");
                        self.history.set_inflow_kind(&l.id, InflowKind::Payment)?;
                        written += 1;
                    }
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::txn;
    use rust_decimal_macros::dec;

    fn engine() -> (Arc<SqliteStore>, SignPolicyEngine) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = SignPolicyEngine::new(store.clone(), store.clone());
        (store, engine)
    }

    #[test]
    fn test_majority_sign() {
        assert_eq!(majority_sign(&[dec!(-1), dec!(-2), dec!(3)]), -1);
        assert_eq!(majority_sign(&[dec!(1), dec!(-2)]), 1);
        assert_eq!(majority_sign(&[]), 1);
        assert_eq!(majority_sign(&[dec!(0), dec!(0), dec!(-1)]), -1);
    }

    #[test]
    fn test_convergence_on_bank_history() {
        let (store, engine) = engine();
        let history: Vec<Transaction> = (0..100)
            .map(|i| {
                let amount = if i < 80 { dec!(-25.00) } else { dec!(300.00) };
                txn(&format!("t{i}"), 1 + (i % 28) as u32, amount, "Checking", SourceType::Bank)
            })
            .collect();
        store.insert_transactions(&history, None).unwrap();

        let policy = engine.policy_for("default", "Checking", SourceType::Bank, &[]).unwrap();
        assert_eq!(policy.sign, -1);
        assert_eq!(policy.sample_size, 100);
        // a new outflow printed negative displays positive
        assert_eq!(policy.display_amount(dec!(-42.10)), dec!(42.10));
        assert_eq!(policy.display_amount(dec!(500.00)), dec!(-500.00));
    }

    #[test]
    fn test_policy_is_cached_until_reset() {
        let (store, engine) = engine();
        let first = engine
            .policy_for("default", "Visa", SourceType::Card, &[dec!(10), dec!(20), dec!(-5)])
            .unwrap();
        assert_eq!(first.sign, 1);
        let cached = engine
            .policy_for("default", "Visa", SourceType::Card, &[dec!(-10), dec!(-20), dec!(-5)])
            .unwrap();
        assert_eq!(cached.sign, 1);

        assert!(store.reset_policy("default", "Visa").unwrap());
        let relearned = engine
            .policy_for("default", "Visa", SourceType::Card, &[dec!(-10), dec!(-20), dec!(-5)])
            .unwrap();
        assert_eq!(relearned.sign, -1);
    }

    #[test]
    fn test_tie_or_no_data_is_positive() {
        let (_store, engine) = engine();
        let p = engine.policy_for("default", "New", SourceType::Bank, &[]).unwrap();
        assert_eq!(p.sign, 1);
        let p = engine
            .policy_for("default", "Tied", SourceType::Bank, &[dec!(1), dec!(-1)])
            .unwrap();
        assert_eq!(p.sign, 1);
    }

    #[test]
    fn test_sample_is_bounded() {
        let (_store, engine) = engine();
        let engine = engine.with_sample_size(3);
        let batch = [dec!(-1), dec!(-1), dec!(-1), dec!(1), dec!(1), dec!(1), dec!(1)];
        let p = engine.policy_for("default", "Savings", SourceType::Bank, &batch).unwrap();
        assert_eq!(p.sign, -1);
        assert_eq!(p.sample_size, 3);
    }

    #[test]
    fn test_first_claim_wins() {
        let (store, _engine) = engine();
        let policy = |sign| SourcePolicy {
            source: "Visa".to_string(),
            source_type: SourceType::Card,
            sign,
            sample_size: 10,
            learned_at: None,
        };
        assert_eq!(store.claim_policy("default", &policy(-1)).unwrap().sign, -1);
        assert_eq!(store.claim_policy("default", &policy(1)).unwrap().sign, -1);
        assert_eq!(store.list_policies("default").unwrap().len(), 1);
    }

    #[test]
    fn test_card_inflow_labels() {
        let (store, engine) = engine();
        let bank_out = txn("bank", 10, dec!(500.00), "Checking", SourceType::Bank);
        let payment = txn("pay", 12, dec!(-500.00), "Visa", SourceType::Card);
        let refund = txn("ref", 12, dec!(-19.99), "Visa", SourceType::Card);
        store
            .insert_transactions(&[bank_out.clone(), payment.clone(), refund.clone()], None)
            .unwrap();
        engine.label_inflows(&[payment, refund]).unwrap();
        assert_eq!(store.get_transaction("pay").unwrap().unwrap().inflow_kind, Some(InflowKind::Payment));
        assert_eq!(store.get_transaction("ref").unwrap().unwrap().inflow_kind, Some(InflowKind::Refund));
        // label never touches the amount
        assert_eq!(store.get_transaction("pay").unwrap().unwrap().amount, dec!(-500.00));
    }

    #[test]
    fn test_late_bank_outflow_upgrades_refund() {
        let (store, engine) = engine();
        let payment = txn("pay", 12, dec!(-250.00), "Visa", SourceType::Card);
        store.insert_transactions(&[payment.clone()], None).unwrap();
        engine.label_inflows(&[payment]).unwrap();
        assert_eq!(store.get_transaction("pay").unwrap().unwrap().inflow_kind, Some(InflowKind::Refund));

        let bank_out = txn("bank", 9, dec!(250.00), "Checking", SourceType::Bank);
        store.insert_transactions(&[bank_out.clone()], None).unwrap();
        assert_eq!(engine.label_inflows(&[bank_out]).unwrap(), 1);
        assert_eq!(store.get_transaction("pay").unwrap().unwrap().inflow_kind, Some(InflowKind::Payment));
    }
}
