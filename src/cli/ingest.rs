use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use crate::cli::{build_resolver, open_store};
use crate::error::Result;
use crate::extract::{CommandOcr, Document, TextExtractor};
use crate::models::SourceType;
use crate::pairing::TransferPairing;
use crate::pipeline::{IngestContext, Ingestor, OutputRecord};
use crate::settings::load_settings;
use crate::sign_policy::SignPolicyEngine;

pub fn run(file: &str, source: &str, source_type: &str, json: bool) -> Result<()> {
    let settings = load_settings();
    let source_type: SourceType = source_type.parse()?;
    let path = Path::new(file);
    let bytes = std::fs::read(path)?;

    let store = open_store(&settings)?;
    let resolver = build_resolver(&settings, &store)?;
    let mut extractor = TextExtractor::new();
    if settings.ocr && CommandOcr::available() {
        extractor = extractor.with_ocr(Box::new(CommandOcr::new("eng")));
    }
    let ingestor = Ingestor::new(store.clone(), resolver)
        .with_extractor(extractor)
        .with_sign_policy(
            SignPolicyEngine::new(store.clone(), store.clone())
                .with_sample_size(settings.policy_sample_size)
                .with_match_window_days(settings.pairing_window_days),
        )
        .with_pairing(TransferPairing::new(store).with_window_days(settings.pairing_window_days));

    let ctx = IngestContext {
        tenant: settings.tenant.clone(),
        source: source.to_string(),
        source_type,
        filename: path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file)
            .to_string(),
    };
    let report = if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("txt")) {
        let text = String::from_utf8_lossy(&bytes);
        ingestor.ingest_document(&Document::from_text(&text), &ctx)?
    } else {
        ingestor.ingest(&bytes, &ctx)?
    };

    if report.duplicate_document {
        println!("{}", format!("Skipped {}: already ingested.", ctx.filename).yellow());
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report.records)?);
        return Ok(());
    }

    print_records(&report.records);
    println!(
        "{} {} new, {} already stored, {} outside the statement period, {} duplicate rows, {} transfers paired ({})",
        "Ingested:".green().bold(),
        report.inserted,
        report.records.len() - report.inserted,
        report.dropped_by_period,
        report.duplicates,
        report.pairs,
        report.strategy,
    );
    Ok(())
}

fn print_records(records: &[OutputRecord]) {
    let mut table = Table::new();
    table.set_header(vec!["Date", "Memo", "Amount", "Account", "Via"]);
    for r in records {
        let amount = Decimal::from_f64_retain(r.amount)
            .map(|d| crate::fmt::money(d.round_dp(2)))
            .unwrap_or_else(|| r.amount.to_string());
        let amount = if r.amount < 0.0 {
            amount.green().to_string()
        } else {
            amount
        };
        table.add_row(vec![
            Cell::new(&r.date),
            Cell::new(&r.memo),
            Cell::new(amount),
            Cell::new(&r.account),
            Cell::new(&r.classification_source),
        ]);
    }
    println!("{table}");
}
