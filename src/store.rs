use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::db::{get_connection, init_db};
use crate::error::{LedgerError, Result};
use crate::models::{
    date_key, ClassificationSource, InflowKind, PairRole, SourceType, Transaction,
};

/// Persistence for normalized transactions, queried by date-key range.
pub trait TransactionStore: Send + Sync {
    /// Insert-or-ignore on id; returns how many rows were new.
    fn insert_transactions(&self, txns: &[Transaction], document_id: Option<i64>) -> Result<usize>;

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>>;

    /// Inclusive range in natural (date, insertion) order.
    fn range(
        &self,
        tenant: &str,
        from: NaiveDate,
        to: NaiveDate,
        source_type: Option<SourceType>,
    ) -> Result<Vec<Transaction>>;

    /// Newest first.
    fn recent_raw_amounts(&self, tenant: &str, source: &str, limit: usize) -> Result<Vec<Decimal>>;

    fn set_inflow_kind(&self, id: &str, kind: InflowKind) -> Result<()>;

    /// Link two unpaired records atomically. `false` when either side was
    /// already paired, in which case nothing changes.
    fn link_pair(&self, leader: &str, shadow: &str, pair_id: &str) -> Result<bool>;
}

/// One ingested statement file.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub tenant: String,
    pub filename: String,
    pub source: String,
    pub source_type: SourceType,
    pub strategy: String,
    pub closing_date: Option<NaiveDate>,
    pub record_count: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub checksum: String,
}

pub trait DocumentLedger: Send + Sync {
    fn document_exists(&self, tenant: &str, checksum: &str) -> Result<bool>;
    /// Record the document and insert its rows as one unit: if either write
    /// fails, neither is kept. Returns how many rows were new.
    fn record_document(&self, doc: &DocumentRecord, txns: &[Transaction]) -> Result<usize>;
}

/// All storage traits backed by one SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Other("database lock poisoned".to_string()))
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    pub(crate) fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

pub(crate) fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = row.get(idx)?;
    Decimal::from_str(&s).map_err(|e| conversion_error(idx, e))
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

pub(crate) fn source_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<SourceType> {
    let s: String = row.get(idx)?;
    SourceType::from_str(&s).map_err(|e| conversion_error(idx, e))
}

const TXN_COLUMNS: &str = "id, tenant, date_key, memo_raw, memo_clean, vendor_key, raw_amount, amount, \
                           source, source_type, account, classification_source, inflow_kind, pair_id, \
                           pair_role, paired_with";

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        tenant: row.get(1)?,
        date: date_at(row, 2)?,
        memo_raw: row.get(3)?,
        memo_clean: row.get(4)?,
        vendor_key: row.get(5)?,
        raw_amount: decimal_at(row, 6)?,
        amount: decimal_at(row, 7)?,
        source: row.get(8)?,
        source_type: source_type_at(row, 9)?,
        account: row.get(10)?,
        classification_source: ClassificationSource::parse(&row.get::<_, String>(11)?),
        inflow_kind: row.get::<_, Option<String>>(12)?.as_deref().and_then(InflowKind::parse),
        pair_id: row.get(13)?,
        pair_role: row.get::<_, Option<String>>(14)?.as_deref().and_then(PairRole::parse),
        paired_with: row.get(15)?,
    })
}

fn insert_rows(conn: &Connection, txns: &[Transaction], document_id: Option<i64>) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO transactions (id, tenant, date_key, memo_raw, memo_clean, vendor_key, \
         raw_amount, amount, source, source_type, account, classification_source, inflow_kind, \
         pair_id, pair_role, paired_with, event_leader, document_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
    )?;
    let mut inserted = 0usize;
    for t in txns {
        inserted += stmt.execute(params![
            t.id,
            t.tenant,
            t.date_key(),
            t.memo_raw,
            t.memo_clean,
            t.vendor_key,
            t.raw_amount.to_string(),
            t.amount.to_string(),
            t.source,
            t.source_type.as_str(),
            t.account,
            t.classification_source.as_str(),
            t.inflow_kind.map(|k| k.as_str()),
            t.pair_id,
            t.pair_role.map(|r| r.as_str()),
            t.paired_with,
            t.event_leader(),
            document_id,
        ])?;
    }
    Ok(inserted)
}

impl TransactionStore for SqliteStore {
    fn insert_transactions(&self, txns: &[Transaction], document_id: Option<i64>) -> Result<usize> {
        self.with_tx(|tx| insert_rows(tx, txns, document_id))
    }

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], row_to_transaction).optional()?)
        })
    }

    fn range(
        &self,
        tenant: &str,
        from: NaiveDate,
        to: NaiveDate,
        source_type: Option<SourceType>,
    ) -> Result<Vec<Transaction>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {TXN_COLUMNS} FROM transactions \
                 WHERE tenant = ?1 AND date_key BETWEEN ?2 AND ?3 AND (?4 IS NULL OR source_type = ?4) \
                 ORDER BY date_key, rowid_seq"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![tenant, date_key(from), date_key(to), source_type.map(|s| s.as_str())],
                    row_to_transaction,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn recent_raw_amounts(&self, tenant: &str, source: &str, limit: usize) -> Result<Vec<Decimal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT raw_amount FROM transactions WHERE tenant = ?1 AND source = ?2 \
                 ORDER BY date_key DESC, rowid_seq DESC LIMIT ?3",
            )?;
            let amounts = stmt
                .query_map(params![tenant, source, limit as i64], |row| decimal_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(amounts)
        })
    }

    fn set_inflow_kind(&self, id: &str, kind: InflowKind) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE transactions SET inflow_kind = ?1 WHERE id = ?2",
                params![kind.as_str(), id],
            )?;
            Ok(())
        })
    }

    fn link_pair(&self, leader: &str, shadow: &str, pair_id: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let update = "UPDATE transactions SET pair_id = ?1, pair_role = ?2, paired_with = ?3, event_leader = ?4 \
                      WHERE id = ?5 AND pair_id IS NULL";
        let a = tx.execute(update, params![pair_id, PairRole::Leader.as_str(), shadow, true, leader])?;
        let b = tx.execute(update, params![pair_id, PairRole::Shadow.as_str(), leader, false, shadow])?;
        if a == 1 && b == 1 {
            tx.commit()?;
            Ok(true)
        } else {
            // dropping the transaction rolls it back
            Ok(false)
        }
    }
}

impl DocumentLedger for SqliteStore {
    fn document_exists(&self, tenant: &str, checksum: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT 1 FROM documents WHERE tenant = ?1 AND checksum = ?2")?;
            Ok(stmt.exists(params![tenant, checksum])?)
        })
    }

    fn record_document(&self, doc: &DocumentRecord, txns: &[Transaction]) -> Result<usize> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO documents (tenant, filename, source, source_type, strategy, closing_date, \
                 record_count, date_range_start, date_range_end, checksum) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    doc.tenant,
                    doc.filename,
                    doc.source,
                    doc.source_type.as_str(),
                    doc.strategy,
                    doc.closing_date.map(date_key),
                    doc.record_count as i64,
                    doc.date_range.map(|(start, _)| date_key(start)),
                    doc.date_range.map(|(_, end)| date_key(end)),
                    doc.checksum,
                ],
            )?;
            insert_rows(tx, txns, Some(tx.last_insert_rowid()))
        })
    }
}
