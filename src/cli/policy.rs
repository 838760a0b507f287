use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::{LedgerError, Result};
use crate::settings::load_settings;
use crate::sign_policy::PolicyStore;

pub fn list() -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings)?;
    let policies = store.list_policies(&settings.tenant)?;

    let mut table = Table::new();
    table.set_header(vec!["Source", "Type", "Outflows/charges printed", "Sample", "Learned"]);
    for p in policies {
        let printed = if p.sign < 0 { "negative" } else { "positive" };
        table.add_row(vec![
            Cell::new(p.source),
            Cell::new(p.source_type.as_str()),
            Cell::new(printed),
            Cell::new(p.sample_size),
            Cell::new(p.learned_at.unwrap_or_default()),
        ]);
    }
    println!("Sign policies\n{table}");
    Ok(())
}

pub fn reset(source: &str) -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings)?;
    if !store.reset_policy(&settings.tenant, source)? {
        return Err(LedgerError::Other(format!("No sign policy for '{source}'")));
    }
    println!("Reset sign policy for '{source}'; the next statement relearns it.");
    Ok(())
}
