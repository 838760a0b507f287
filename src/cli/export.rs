use std::path::PathBuf;

use crate::cli::{date_range, open_store};
use crate::error::Result;
use crate::fmt::us_date;
use crate::models::Transaction;
use crate::settings::{load_settings, Settings};
use crate::store::TransactionStore;

const HEADER: &[&str] = &[
    "id",
    "date",
    "memo",
    "memo_raw",
    "amount",
    "raw_amount",
    "account",
    "source",
    "source_type",
    "classification_source",
    "inflow_kind",
    "pair_id",
    "pair_role",
];

fn default_path(settings: &Settings) -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    PathBuf::from(&settings.data_dir)
        .join("exports")
        .join(format!("transactions-{date}.csv"))
}

pub fn run(from: Option<&str>, to: Option<&str>, output: Option<String>) -> Result<()> {
    let settings = load_settings();
    let (from, to) = date_range(from, to)?;
    let store = open_store(&settings)?;
    let txns = store.range(&settings.tenant, from, to, None)?;

    let path = output.map(PathBuf::from).unwrap_or_else(|| default_path(&settings));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(&path)?;
    write_transactions(&mut wtr, &txns)?;
    wtr.flush()?;
    println!("Wrote {} transactions to {}", txns.len(), path.display());
    Ok(())
}

fn write_transactions<W: std::io::Write>(wtr: &mut csv::Writer<W>, txns: &[Transaction]) -> Result<()> {
    wtr.write_record(HEADER)?;
    for t in txns {
        let date = us_date(t.date);
        let amount = t.amount.to_string();
        let raw_amount = t.raw_amount.to_string();
        wtr.write_record([
            t.id.as_str(),
            date.as_str(),
            t.memo_clean.as_str(),
            t.memo_raw.as_str(),
            amount.as_str(),
            raw_amount.as_str(),
            t.account.as_str(),
            t.source.as_str(),
            t.source_type.as_str(),
            t.classification_source.as_str(),
            t.inflow_kind.map_or("", |k| k.as_str()),
            t.pair_id.as_deref().unwrap_or(""),
            t.pair_role.map_or("", |r| r.as_str()),
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::store::tests::txn;
    use rust_decimal_macros::dec;

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut wtr = csv::Writer::from_path(&path).unwrap();
        let t = txn("a", 2, dec!(4.75), "2000 - Credit Card Payable", SourceType::Card);
        write_transactions(&mut wtr, &[t]).unwrap();
        wtr.flush().unwrap();
        drop(wtr);
        let out = std::fs::read_to_string(&path).unwrap();
        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("id,date,memo,"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("a,05/02/2024,Transfer,TRANSFER,4.75,4.75,"));
        assert!(row.contains(",card,"));
    }
}
