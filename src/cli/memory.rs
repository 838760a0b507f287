use comfy_table::{Cell, Table};

use crate::cli::{load_chart, open_store};
use crate::error::{LedgerError, Result};
use crate::memory::{MemoryOrigin, MemoryScope, MemoryStore};
use crate::normalize::canonical_key;
use crate::settings::load_settings;

fn scope(global: bool) -> MemoryScope {
    if global {
        MemoryScope::Global
    } else {
        MemoryScope::Tenant
    }
}

pub fn list(global: bool) -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings)?;
    let scope = scope(global);
    let entries = store.list_memory(scope, &settings.tenant)?;

    let mut table = Table::new();
    table.set_header(vec!["Vendor key", "Account", "Origin", "Confidence", "Hits", "Updated"]);
    for e in entries {
        table.add_row(vec![
            Cell::new(e.vendor_key),
            Cell::new(e.account),
            Cell::new(e.origin.as_str()),
            Cell::new(format!("{:.2}", e.confidence)),
            Cell::new(e.hit_count),
            Cell::new(e.updated_at),
        ]);
    }
    let title = match scope {
        MemoryScope::Tenant => format!("Vendor memory ({})", settings.tenant),
        MemoryScope::Global => "Vendor memory (global)".to_string(),
    };
    println!("{title}\n{table}");
    Ok(())
}

/// A user classification: written with full confidence and `user` origin.
pub fn set(vendor: &str, account: &str, global: bool) -> Result<()> {
    let settings = load_settings();
    let chart = load_chart(&settings)?;
    let account = chart
        .lookup(account)
        .ok_or_else(|| LedgerError::UnknownAccount(account.to_string()))?;
    let key = canonical_key(vendor);
    if key.is_empty() {
        return Err(LedgerError::Other(format!("'{vendor}' has no letters to match on")));
    }

    let store = open_store(&settings)?;
    store.set_memory(scope(global), &settings.tenant, &key, account, 1.0, MemoryOrigin::User)?;
    println!("Remembered '{key}' \u{2192} {account}");
    Ok(())
}
