use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::store::SqliteStore;

/// Tenant-scoped exact-key rule: canonical vendor key to account.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: i64,
    pub vendor_key: String,
    pub account: String,
    pub hit_count: i64,
    pub is_active: bool,
}

pub trait RuleStore: Send + Sync {
    /// Active rule for exactly this key.
    fn find_rule(&self, tenant: &str, vendor_key: &str) -> Result<Option<Rule>>;
    fn record_rule_hit(&self, rule_id: i64) -> Result<()>;
    /// Creates the rule, or repoints and reactivates an existing one.
    fn add_rule(&self, tenant: &str, vendor_key: &str, account: &str) -> Result<i64>;
    fn list_rules(&self, tenant: &str) -> Result<Vec<Rule>>;
    /// Soft delete. Returns the rule as it was, `None` if no such rule.
    fn deactivate_rule(&self, tenant: &str, id: i64) -> Result<Option<Rule>>;
}

const RULE_COLUMNS: &str = "id, vendor_key, account, hit_count, is_active";

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<Rule> {
    Ok(Rule {
        id: row.get(0)?,
        vendor_key: row.get(1)?,
        account: row.get(2)?,
        hit_count: row.get(3)?,
        is_active: row.get(4)?,
    })
}

impl RuleStore for SqliteStore {
    fn find_rule(&self, tenant: &str, vendor_key: &str) -> Result<Option<Rule>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RULE_COLUMNS} FROM rules WHERE tenant = ?1 AND vendor_key = ?2 AND is_active = 1"
            );
            Ok(conn.query_row(&sql, params![tenant, vendor_key], row_to_rule).optional()?)
        })
    }

    fn record_rule_hit(&self, rule_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE rules SET hit_count = hit_count + 1 WHERE id = ?1", [rule_id])?;
            Ok(())
        })
    }

    fn add_rule(&self, tenant: &str, vendor_key: &str, account: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rules (tenant, vendor_key, account) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (tenant, vendor_key) DO UPDATE SET account = excluded.account, is_active = 1",
                params![tenant, vendor_key, account],
            )?;
            Ok(conn.query_row(
                "SELECT id FROM rules WHERE tenant = ?1 AND vendor_key = ?2",
                params![tenant, vendor_key],
                |row| row.get(0),
            )?)
        })
    }

    fn list_rules(&self, tenant: &str) -> Result<Vec<Rule>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RULE_COLUMNS} FROM rules WHERE tenant = ?1 AND is_active = 1 \
                 ORDER BY hit_count DESC, vendor_key"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rules = stmt
                .query_map([tenant], row_to_rule)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rules)
        })
    }

    fn deactivate_rule(&self, tenant: &str, id: i64) -> Result<Option<Rule>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE tenant = ?1 AND id = ?2");
            let rule = conn.query_row(&sql, params![tenant, id], row_to_rule).optional()?;
            if rule.as_ref().is_some_and(|r| r.is_active) {
                conn.execute("UPDATE rules SET is_active = 0 WHERE id = ?1", [id])?;
            }
            Ok(rule)
        })
    }
}
