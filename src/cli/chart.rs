use comfy_table::{Cell, Table};

use crate::cli::load_chart;
use crate::error::Result;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let chart = load_chart(&settings)?;

    let mut table = Table::new();
    table.set_header(vec!["Code", "Account"]);
    for entry in chart.entries() {
        let (code, name) = entry.split_once(" - ").unwrap_or(("", entry.as_str()));
        let name = if entry == chart.default_account() {
            format!("{name} (default)")
        } else {
            name.to_string()
        };
        table.add_row(vec![Cell::new(code), Cell::new(name)]);
    }
    println!("Chart of accounts\n{table}");
    Ok(())
}
