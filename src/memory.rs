use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryScope {
    Tenant,
    Global,
}

impl MemoryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Global => "global",
        }
    }
}

/// Who taught the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOrigin {
    Ai,
    User,
}

impl MemoryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Self::User,
            _ => Self::Ai,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub vendor_key: String,
    pub account: String,
    pub confidence: f64,
    pub hit_count: i64,
    pub origin: MemoryOrigin,
    pub created_at: String,
    pub updated_at: String,
}

/// Vendor-key to account memory, per tenant and global. Entries are never
/// removed automatically.
pub trait MemoryStore: Send + Sync {
    /// `tenant` is ignored for the global scope.
    fn get_memory(&self, scope: MemoryScope, tenant: &str, vendor_key: &str) -> Result<Option<MemoryEntry>>;
    /// Upsert; keeps `created_at` of an existing entry.
    fn set_memory(
        &self,
        scope: MemoryScope,
        tenant: &str,
        vendor_key: &str,
        account: &str,
        confidence: f64,
        origin: MemoryOrigin,
    ) -> Result<()>;
    /// Record a reuse: bump the hit count and `updated_at`.
    fn touch_memory(&self, scope: MemoryScope, tenant: &str, vendor_key: &str) -> Result<()>;
    fn list_memory(&self, scope: MemoryScope, tenant: &str) -> Result<Vec<MemoryEntry>>;
}

const MEMORY_COLUMNS: &str = "vendor_key, account, confidence, hit_count, origin, created_at, updated_at";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    Ok(MemoryEntry {
        vendor_key: row.get(0)?,
        account: row.get(1)?,
        confidence: row.get(2)?,
        hit_count: row.get(3)?,
        origin: MemoryOrigin::parse(&row.get::<_, String>(4)?),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl MemoryStore for SqliteStore {
    fn get_memory(&self, scope: MemoryScope, tenant: &str, vendor_key: &str) -> Result<Option<MemoryEntry>> {
        self.with_conn(|conn| {
            let entry = match scope {
                MemoryScope::Tenant => conn
                    .query_row(
                        &format!("SELECT {MEMORY_COLUMNS} FROM vendor_memory WHERE tenant = ?1 AND vendor_key = ?2"),
                        params![tenant, vendor_key],
                        row_to_entry,
                    )
                    .optional()?,
                MemoryScope::Global => conn
                    .query_row(
                        &format!("SELECT {MEMORY_COLUMNS} FROM global_memory WHERE vendor_key = ?1"),
                        [vendor_key],
                        row_to_entry,
                    )
                    .optional()?,
            };
            Ok(entry)
        })
    }

    fn set_memory(
        &self,
        scope: MemoryScope,
        tenant: &str,
        vendor_key: &str,
        account: &str,
        confidence: f64,
        origin: MemoryOrigin,
    ) -> Result<()> {
        self.with_conn(|conn| {
            match scope {
                MemoryScope::Tenant => conn.execute(
                    "INSERT INTO vendor_memory (tenant, vendor_key, account, confidence, origin) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT (tenant, vendor_key) DO UPDATE SET account = excluded.account, \
                     confidence = excluded.confidence, origin = excluded.origin, updated_at = datetime('now')",
                    params![tenant, vendor_key, account, confidence, origin.as_str()],
                )?,
                MemoryScope::Global => conn.execute(
                    "INSERT INTO global_memory (vendor_key, account, confidence, origin) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT (vendor_key) DO UPDATE SET account = excluded.account, \
                     confidence = excluded.confidence, origin = excluded.origin, updated_at = datetime('now')",
                    params![vendor_key, account, confidence, origin.as_str()],
                )?,
            };
            Ok(())
        })
    }

    fn touch_memory(&self, scope: MemoryScope, tenant: &str, vendor_key: &str) -> Result<()> {
        self.with_conn(|conn| {
            match scope {
                MemoryScope::Tenant => conn.execute(
                    "UPDATE vendor_memory SET hit_count = hit_count + 1, updated_at = datetime('now') \
                     WHERE tenant = ?1 AND vendor_key = ?2",
                    params![tenant, vendor_key],
                )?,
                MemoryScope::Global => conn.execute(
                    "UPDATE global_memory SET hit_count = hit_count + 1, updated_at = datetime('now') \
                     WHERE vendor_key = ?1",
                    [vendor_key],
                )?,
            };
            Ok(())
        })
    }

    fn list_memory(&self, scope: MemoryScope, tenant: &str) -> Result<Vec<MemoryEntry>> {
        self.with_conn(|conn| {
            let entries = match scope {
                MemoryScope::Tenant => conn
                    .prepare(&format!(
                        "SELECT {MEMORY_COLUMNS} FROM vendor_memory WHERE tenant = ?1 ORDER BY vendor_key"
                    ))?
                    .query_map([tenant], row_to_entry)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                MemoryScope::Global => conn
                    .prepare(&format!("SELECT {MEMORY_COLUMNS} FROM global_memory ORDER BY vendor_key"))?
                    .query_map([], row_to_entry)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            };
            Ok(entries)
        })
    }
}

type CacheKey = (MemoryScope, String, String);

/// Write-through cache in front of a [`MemoryStore`]. Reads hit the cache
/// first; writes go to the store, then the cache.
pub struct VendorMemory {
    store: Arc<dyn MemoryStore>,
    cache: RwLock<HashMap<CacheKey, MemoryEntry>>,
}

impl VendorMemory {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn key(scope: MemoryScope, tenant: &str, vendor_key: &str) -> CacheKey {
        let tenant = match scope {
            MemoryScope::Tenant => tenant.to_string(),
            MemoryScope::Global => String::new(),
        };
        (scope, tenant, vendor_key.to_string())
    }

    /// Look up and record the reuse. Store failures count as a miss.
    pub fn lookup(&self, scope: MemoryScope, tenant: &str, vendor_key: &str) -> Option<MemoryEntry> {
        let key = Self::key(scope, tenant, vendor_key);
        let cached = self.cache.read().ok().and_then(|c| c.get(&key).cloned());
        let entry = match cached {
            Some(entry) => entry,
            None => match self.store.get_memory(scope, tenant, vendor_key) {
                Ok(Some(entry)) => entry,
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, scope = scope.as_str(), "memory lookup failed");
                    return None;
                }
            },
        };

        if let Err(e) = self.store.touch_memory(scope, tenant, vendor_key) {
            warn!(error = %e, "failed to record memory hit");
        }
        let mut entry = entry;
        entry.hit_count += 1;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, entry.clone());
        }
        Some(entry)
    }

    /// Persist a mapping, then cache it.
    pub fn remember(
        &self,
        scope: MemoryScope,
        tenant: &str,
        vendor_key: &str,
        account: &str,
        confidence: f64,
        origin: MemoryOrigin,
    ) -> Result<()> {
        self.store
            .set_memory(scope, tenant, vendor_key, account, confidence, origin)?;
        let entry = match self.store.get_memory(scope, tenant, vendor_key)? {
            Some(entry) => entry,
            None => return Ok(()),
        };
        debug!(key = vendor_key, account, scope = scope.as_str(), "memory updated");
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(Self::key(scope, tenant, vendor_key), entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    fn memory() -> (Arc<SqliteStore>, VendorMemory) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let memory = VendorMemory::new(store.clone());
        (store, memory)
    }

    #[test]
    fn test_remember_then_lookup() {
        let (_store, memory) = memory();
        assert!(memory.lookup(MemoryScope::Tenant, "default", "starbucks store").is_none());
        memory
            .remember(MemoryScope::Tenant, "default", "starbucks store", "6100 - Meals", 0.9, MemoryOrigin::Ai)
            .unwrap();
        let entry = memory.lookup(MemoryScope::Tenant, "default", "starbucks store").unwrap();
        assert_eq!(entry.account, "6100 - Meals");
        assert_eq!(entry.origin, MemoryOrigin::Ai);
    }

    #[test]
    fn test_scopes_are_separate() {
        let (_store, memory) = memory();
        memory
            .remember(MemoryScope::Global, "", "netflix", "5800 - Software & Subscriptions", 1.0, MemoryOrigin::User)
            .unwrap();
        assert!(memory.lookup(MemoryScope::Tenant, "default", "netflix").is_none());
        assert!(memory.lookup(MemoryScope::Global, "acme", "netflix").is_some());
    }

    #[test]
    fn test_tenants_are_isolated() {
        let (_store, memory) = memory();
        memory
            .remember(MemoryScope::Tenant, "acme", "uber", "6000 - Travel", 1.0, MemoryOrigin::User)
            .unwrap();
        assert!(memory.lookup(MemoryScope::Tenant, "default", "uber").is_none());
    }

    #[test]
    fn test_reuse_is_recorded_in_store() {
        let (store, memory) = memory();
        memory
            .remember(MemoryScope::Tenant, "default", "uber", "6000 - Travel", 1.0, MemoryOrigin::Ai)
            .unwrap();
        memory.lookup(MemoryScope::Tenant, "default", "uber");
        memory.lookup(MemoryScope::Tenant, "default", "uber");
        let stored = store.get_memory(MemoryScope::Tenant, "default", "uber").unwrap().unwrap();
        assert_eq!(stored.hit_count, 2);
    }

    #[test]
    fn test_set_keeps_created_at() {
        let (store, _memory) = memory();
        store
            .set_memory(MemoryScope::Tenant, "default", "uber", "6000 - Travel", 1.0, MemoryOrigin::Ai)
            .unwrap();
        let before = store.get_memory(MemoryScope::Tenant, "default", "uber").unwrap().unwrap();
        store
            .set_memory(MemoryScope::Tenant, "default", "uber", "6100 - Meals", 1.0, MemoryOrigin::User)
            .unwrap();
        let after = store.get_memory(MemoryScope::Tenant, "default", "uber").unwrap().unwrap();
        assert_eq!(before.created_at, after.created_at);
        assert_eq!(after.account, "6100 - Meals");
        assert_eq!(store.list_memory(MemoryScope::Tenant, "default").unwrap().len(), 1);
    }

    /// Reads fail; writes succeed so the cache can be primed.
    struct FlakyStore;

    impl MemoryStore for FlakyStore {
        fn get_memory(&self, _: MemoryScope, _: &str, _: &str) -> Result<Option<MemoryEntry>> {
            Err(LedgerError::Other("database offline".to_string()))
        }
        fn set_memory(&self, _: MemoryScope, _: &str, _: &str, _: &str, _: f64, _: MemoryOrigin) -> Result<()> {
            Ok(())
        }
        fn touch_memory(&self, _: MemoryScope, _: &str, _: &str) -> Result<()> {
            Err(LedgerError::Other("database offline".to_string()))
        }
        fn list_memory(&self, _: MemoryScope, _: &str) -> Result<Vec<MemoryEntry>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_store_failure_is_a_miss() {
        let memory = VendorMemory::new(Arc::new(FlakyStore));
        assert!(memory.lookup(MemoryScope::Tenant, "default", "uber").is_none());
        assert!(memory.lookup(MemoryScope::Global, "default", "uber").is_none());
        assert!(memory
            .remember(MemoryScope::Tenant, "default", "uber", "6000 - Travel", 1.0, MemoryOrigin::User)
            .is_err());
    }
}
