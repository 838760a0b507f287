use comfy_table::{Cell, Table};

use crate::cli::{load_chart, open_store};
use crate::error::{LedgerError, Result};
use crate::normalize::canonical_key;
use crate::rules::RuleStore;
use crate::settings::load_settings;

pub fn add(vendor: &str, account: &str) -> Result<()> {
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
    let id = store.add_rule(&settings.tenant, &key, account)?;
    println!("Added rule {id}: '{key}' \u{2192} {account}");
    Ok(())
}

pub fn list() -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings)?;
    let rules = store.list_rules(&settings.tenant)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Vendor key", "Account", "Hits"]);
    for rule in rules {
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(rule.vendor_key),
            Cell::new(rule.account),
            Cell::new(rule.hit_count),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings)?;
    match store.deactivate_rule(&settings.tenant, id)? {
        None => Err(LedgerError::Other(format!("No rule with ID {id}"))),
        Some(rule) if !rule.is_active => Err(LedgerError::Other(format!("Rule {id} is already inactive"))),
        Some(rule) => {
            println!("Deleted rule {id}: '{}' \u{2192} {}", rule.vendor_key, rule.account);
            Ok(())
        }
    }
}
