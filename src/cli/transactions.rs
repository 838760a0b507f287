use colored::Colorize;
use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use crate::cli::{date_range, open_store};
use crate::error::Result;
use crate::fmt::{money, us_date};
use crate::models::{PairRole, SourceType};
use crate::settings::load_settings;
use crate::store::TransactionStore;

pub fn run(from: Option<&str>, to: Option<&str>, source_type: Option<&str>) -> Result<()> {
    let settings = load_settings();
    let (from, to) = date_range(from, to)?;
    let source_type = source_type.map(str::parse::<SourceType>).transpose()?;
    let store = open_store(&settings)?;
    let txns = store.range(&settings.tenant, from, to, source_type)?;

    let mut table = Table::new();
    table.set_header(vec!["Date", "Memo", "Amount", "Account", "Source", "Via", "Notes"]);
    let mut total = Decimal::ZERO;
    for t in &txns {
        let mut notes = Vec::new();
        if let Some(kind) = t.inflow_kind {
            notes.push(kind.as_str().to_string());
        }
        if let Some(role) = t.pair_role {
            notes.push(format!("transfer {}", role.as_str()));
        }
        if t.event_leader() {
            total += t.amount;
        }
        let amount = if t.amount < Decimal::ZERO {
            money(t.amount).green().to_string()
        } else {
            money(t.amount)
        };
        let memo = if t.pair_role == Some(PairRole::Shadow) {
            t.memo_clean.dimmed().to_string()
        } else {
            t.memo_clean.clone()
        };
        table.add_row(vec![
            Cell::new(us_date(t.date)),
            Cell::new(memo),
            Cell::new(amount),
            Cell::new(&t.account),
            Cell::new(&t.source),
            Cell::new(t.classification_source.as_str()),
            Cell::new(notes.join(", ")),
        ]);
    }
    println!("Transactions\n{table}");
    println!("{} {} across {} records", "Net:".bold(), money(total), txns.len());
    Ok(())
}
