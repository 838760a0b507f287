use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    tenant TEXT NOT NULL,
    filename TEXT NOT NULL,
    source TEXT NOT NULL,
    source_type TEXT NOT NULL,
    strategy TEXT NOT NULL,
    closing_date TEXT,
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT NOT NULL,
    ingested_at TEXT DEFAULT (datetime('now')),
    UNIQUE (tenant, checksum)
);

CREATE TABLE IF NOT EXISTS transactions (
    rowid_seq INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    tenant TEXT NOT NULL,
    date_key TEXT NOT NULL,
    memo_raw TEXT NOT NULL,
    memo_clean TEXT NOT NULL,
    vendor_key TEXT NOT NULL,
    raw_amount TEXT NOT NULL,
    amount TEXT NOT NULL,
    source TEXT NOT NULL,
    source_type TEXT NOT NULL,
    account TEXT NOT NULL,
    classification_source TEXT NOT NULL,
    inflow_kind TEXT,
    pair_id TEXT,
    pair_role TEXT,
    paired_with TEXT,
    event_leader INTEGER DEFAULT 1,
    document_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (document_id) REFERENCES documents(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_range
    ON transactions (tenant, date_key, source_type);
CREATE INDEX IF NOT EXISTS idx_transactions_source
    ON transactions (tenant, source, date_key);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    tenant TEXT NOT NULL,
    vendor_key TEXT NOT NULL,
    account TEXT NOT NULL,
    hit_count INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (tenant, vendor_key)
);

CREATE TABLE IF NOT EXISTS vendor_memory (
    tenant TEXT NOT NULL,
    vendor_key TEXT NOT NULL,
    account TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    hit_count INTEGER DEFAULT 0,
    origin TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (tenant, vendor_key)
);

CREATE TABLE IF NOT EXISTS global_memory (
    vendor_key TEXT PRIMARY KEY,
    account TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    hit_count INTEGER DEFAULT 0,
    origin TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS source_policies (
    tenant TEXT NOT NULL,
    source TEXT NOT NULL,
    source_type TEXT NOT NULL,
    sign INTEGER NOT NULL,
    sample_size INTEGER NOT NULL,
    learned_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (tenant, source)
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "documents",
            "transactions",
            "rules",
            "vendor_memory",
            "global_memory",
            "source_policies",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        let (_dir, conn) = test_db();
        let insert = "INSERT INTO transactions (id, tenant, date_key, memo_raw, memo_clean, vendor_key, \
                      raw_amount, amount, source, source_type, account, classification_source) \
                      VALUES ('t1', 'default', '2024-05-02', 'X', 'X', 'x', '1', '1', 'Chk', 'bank', 'a', 'rule')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
