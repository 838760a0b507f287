use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::categorizer::{ClassificationResolver, ClassifyRequest};
use crate::dedupe::{dedupe_batch, NormalizedRow};
use crate::error::{LedgerError, Result};
use crate::extract::{Document, TextExtractor};
use crate::fmt::us_date;
use crate::models::{SourceType, Transaction};
use crate::normalize::{canonical_key, clean_memo};
use crate::pairing::{PairOutcome, TransferPairing};
use crate::period::resolve_period;
use crate::sign_policy::{SignPolicyEngine, SourcePolicy};
use crate::store::{DocumentLedger, DocumentRecord, SqliteStore};
use crate::strategies::parse_document;

/// Namespace for deterministic transaction ids.
const TXN_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_6467_6572_6c65_6e73_7478_6e00_0001);

/// Who the statement belongs to and which account it came from.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub tenant: String,
    pub source: String,
    pub source_type: SourceType,
    pub filename: String,
}

/// One transaction as handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    /// MM/DD/YYYY
    pub date: String,
    pub memo: String,
    pub amount: f64,
    pub account: String,
    pub source: String,
    pub classification_source: String,
}

impl From<&Transaction> for OutputRecord {
    fn from(t: &Transaction) -> Self {
        Self {
            date: us_date(t.date),
            memo: t.memo_clean.clone(),
            amount: t.amount.to_f64().unwrap_or_default(),
            account: t.account.clone(),
            source: t.source.clone(),
            classification_source: t.classification_source.as_str().to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<OutputRecord>,
    pub strategy: String,
    pub closing_date: Option<NaiveDate>,
    pub parsed: usize,
    pub dropped_by_period: usize,
    pub duplicates: usize,
    pub inserted: usize,
    pub inflow_labels: usize,
    pub pairs: usize,
    pub duplicate_document: bool,
}

/// Extract, parse, normalize, classify, store, then pair one document.
pub struct Ingestor {
    extractor: TextExtractor,
    documents: Arc<dyn DocumentLedger>,
    resolver: ClassificationResolver,
    policies: SignPolicyEngine,
    pairing: TransferPairing,
}

fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn transaction_id(tenant: &str, row: &NormalizedRow) -> String {
    let name = format!(
        "{tenant}|{}|{}|{}|{}",
        row.source,
        row.date,
        row.memo_clean,
        row.amount.normalize()
    );
    Uuid::new_v5(&TXN_NAMESPACE, name.as_bytes()).to_string()
}

impl Ingestor {
    pub fn new(store: Arc<SqliteStore>, resolver: ClassificationResolver) -> Self {
        Self {
            extractor: TextExtractor::new(),
            documents: store.clone(),
            resolver,
            policies: SignPolicyEngine::new(store.clone(), store.clone()),
            pairing: TransferPairing::new(store),
        }
    }

    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_sign_policy(mut self, policies: SignPolicyEngine) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_pairing(mut self, pairing: TransferPairing) -> Self {
        self.pairing = pairing;
        self
    }

    /// Ingest a PDF. Identical bytes already ingested for the tenant are
    /// reported as a duplicate document and skipped.
    pub fn ingest(&self, bytes: &[u8], ctx: &IngestContext) -> Result<IngestReport> {
        let sum = checksum(bytes);
        if self.documents.document_exists(&ctx.tenant, &sum)? {
            info!(filename = %ctx.filename, "document already ingested");
            return Ok(IngestReport {
                duplicate_document: true,
                ..IngestReport::default()
            });
        }
        let doc = self.extractor.extract(bytes)?;
        self.process(&doc, ctx, sum)
    }

    /// Ingest already-extracted text. The ledger checksum covers the text.
    pub fn ingest_document(&self, doc: &Document, ctx: &IngestContext) -> Result<IngestReport> {
        let sum = checksum(doc.full_text().as_bytes());
        if self.documents.document_exists(&ctx.tenant, &sum)? {
            return Ok(IngestReport {
                duplicate_document: true,
                ..IngestReport::default()
            });
        }
        self.process(doc, ctx, sum)
    }

    fn process(&self, doc: &Document, ctx: &IngestContext, sum: String) -> Result<IngestReport> {
        let period = resolve_period(doc, ctx.source_type);
        let closing = period.as_ref().map(|p| p.closing);
        let parsed = parse_document(doc, closing);
        if parsed.strategy.is_none() && parsed.rows.is_empty() {
            return Err(LedgerError::UnrecognizedLayout(ctx.filename.clone()));
        }

        let mut report = IngestReport {
            strategy: parsed.strategy_key().to_string(),
            closing_date: closing,
            parsed: parsed.rows.len(),
            ..IngestReport::default()
        };

        let mut normalized = Vec::with_capacity(parsed.rows.len());
        for raw in parsed.rows {
            if let Some(p) = &period {
                if !p.contains(raw.date) {
                    debug!(date = %raw.date, memo = %raw.memo, "dropping row outside statement period");
                    report.dropped_by_period += 1;
                    continue;
                }
            }
            normalized.push(NormalizedRow {
                date: raw.date,
                memo_clean: clean_memo(&raw.memo),
                vendor_key: canonical_key(&raw.memo),
                amount: raw.amount,
                source: raw.source_label.unwrap_or_else(|| ctx.source.clone()),
                memo_raw: raw.memo,
            });
        }
        let deduped = dedupe_batch(normalized);
        report.duplicates = deduped.dropped;
        let rows = deduped.rows;

        let policies = self.policies_for(ctx, &rows);
        let txns: Vec<Transaction> = rows
            .iter()
            .map(|row| {
                let amount = policies
                    .get(&row.source)
                    .map_or(row.amount, |p| p.display_amount(row.amount));
                let classification = self.resolver.classify(&ClassifyRequest {
                    tenant: &ctx.tenant,
                    memo: &row.memo_clean,
                    vendor_key: &row.vendor_key,
                    amount,
                    source: &row.source,
                    source_type: ctx.source_type,
                });
                Transaction {
                    id: transaction_id(&ctx.tenant, row),
                    tenant: ctx.tenant.clone(),
                    date: row.date,
                    memo_raw: row.memo_raw.clone(),
                    memo_clean: row.memo_clean.clone(),
                    vendor_key: row.vendor_key.clone(),
                    raw_amount: row.amount,
                    amount,
                    source: row.source.clone(),
                    source_type: ctx.source_type,
                    account: classification.account,
                    classification_source: classification.source,
                    inflow_kind: None,
                    pair_id: None,
                    pair_role: None,
                    paired_with: None,
                }
            })
            .collect();

        let dates = txns.iter().map(|t| t.date);
        let date_range = dates.clone().min().zip(dates.max());
        report.inserted = self.documents.record_document(
            &DocumentRecord {
                tenant: ctx.tenant.clone(),
                filename: ctx.filename.clone(),
                source: ctx.source.clone(),
                source_type: ctx.source_type,
                strategy: report.strategy.clone(),
                closing_date: closing,
                record_count: txns.len(),
                date_range,
                checksum: sum,
            },
            &txns,
        )?;

        match self.policies.label_inflows(&txns) {
            Ok(n) => report.inflow_labels = n,
            Err(e) => warn!(error = %e, "inflow labeling failed"),
        }
        for txn in &txns {
            match self.pairing.pair(&ctx.tenant, &txn.id) {
                Ok(PairOutcome::Paired { .. }) => report.pairs += 1,
                Ok(_) => {}
                Err(e) => warn!(id = %txn.id, error = %e, "pairing failed"),
            }
        }

        report.records = txns.iter().map(OutputRecord::from).collect();
        info!(
            filename = %ctx.filename,
            strategy = %report.strategy,
            parsed = report.parsed,
            inserted = report.inserted,
            dropped_by_period = report.dropped_by_period,
            duplicates = report.duplicates,
            pairs = report.pairs,
            "ingested document"
        );
        Ok(report)
    }

    /// One policy per source in the batch. A store failure leaves that
    /// source's amounts as printed.
    fn policies_for(&self, ctx: &IngestContext, rows: &[NormalizedRow]) -> HashMap<String, SourcePolicy> {
        let mut by_source: HashMap<&str, Vec<Decimal>> = HashMap::new();
        for row in rows {
            by_source.entry(row.source.as_str()).or_default().push(row.amount);
        }
        by_source
            .into_iter()
            .filter_map(|(source, sample)| {
                match self.policies.policy_for(&ctx.tenant, source, ctx.source_type, &sample) {
                    Ok(policy) => Some((source.to_string(), policy)),
                    Err(e) => {
                        warn!(source, error = %e, "sign policy unavailable, keeping printed signs");
                        None
                    }
                }
            })
            .collect()
    }
}
