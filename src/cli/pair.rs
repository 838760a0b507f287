use comfy_table::{Cell, Table};

use crate::cli::{date_range, open_store};
use crate::error::Result;
use crate::pairing::{PairOutcome, TransferPairing};
use crate::settings::load_settings;
use crate::store::TransactionStore;

pub fn run(from: Option<&str>, to: Option<&str>) -> Result<()> {
    let settings = load_settings();
    let (from, to) = date_range(from, to)?;
    let store = open_store(&settings)?;
    let pairing = TransferPairing::new(store.clone()).with_window_days(settings.pairing_window_days);
    let outcomes = pairing.pair_range(&settings.tenant, from, to)?;

    if outcomes.is_empty() {
        println!("No new transfers found.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Pair", "Leader", "Shadow"]);
    for outcome in &outcomes {
        let PairOutcome::Paired { pair_id, leader, shadow } = outcome else {
            continue;
        };
        table.add_row(vec![
            Cell::new(pair_id),
            Cell::new(describe(store.as_ref(), leader)?),
            Cell::new(describe(store.as_ref(), shadow)?),
        ]);
    }
    println!("Paired {} transfers\n{table}", outcomes.len());
    Ok(())
}

pub fn one(id: &str) -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings)?;
    let pairing = TransferPairing::new(store.clone()).with_window_days(settings.pairing_window_days);
    let outcome = pairing.pair(&settings.tenant, id)?;
    match (&outcome, outcome.pair_id()) {
        (PairOutcome::Paired { leader, shadow, .. }, Some(pair_id)) => {
            println!("Paired {pair_id}");
            println!("  leader: {}", describe(store.as_ref(), leader)?);
            println!("  shadow: {}", describe(store.as_ref(), shadow)?);
        }
        (_, Some(pair_id)) => println!("Already paired: {pair_id}"),
        (_, None) => println!("No matching transfer for {id}."),
    }
    Ok(())
}

fn describe(store: &dyn TransactionStore, id: &str) -> Result<String> {
    Ok(match store.get_transaction(id)? {
        Some(t) => format!("{} {} {} ({})", t.date, t.memo_clean, t.amount, t.source),
        None => id.to_string(),
    })
}
