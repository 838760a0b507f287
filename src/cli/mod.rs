pub mod chart;
pub mod export;
pub mod ingest;
pub mod init;
pub mod memory;
pub mod model;
pub mod pair;
pub mod policy;
pub mod rules;
pub mod transactions;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::categorizer::ClassificationResolver;
use crate::chart::ChartOfAccounts;
use crate::classifier::NaiveBayesModel;
use crate::error::{LedgerError, Result};
use crate::llm::{HttpCompletionClient, RetryPolicy};
use crate::memory::VendorMemory;
use crate::settings::Settings;
use crate::store::SqliteStore;

pub(crate) fn open_store(settings: &Settings) -> Result<Arc<SqliteStore>> {
    std::fs::create_dir_all(&settings.data_dir)?;
    Ok(Arc::new(SqliteStore::open(&settings.db_path())?))
}

pub(crate) fn load_chart(settings: &Settings) -> Result<ChartOfAccounts> {
    match &settings.chart_path {
        Some(path) => ChartOfAccounts::load(Path::new(path), &settings.default_account),
        None if settings.default_account == crate::settings::DEFAULT_ACCOUNT => Ok(ChartOfAccounts::builtin()),
        None => ChartOfAccounts::new(
            ChartOfAccounts::builtin().entries().to_vec(),
            &settings.default_account,
        ),
    }
}

/// Wire every configured tier. A missing model file or API key skips that
/// tier instead of failing.
pub(crate) fn build_resolver(settings: &Settings, store: &Arc<SqliteStore>) -> Result<ClassificationResolver> {
    let chart = Arc::new(load_chart(settings)?);
    let mut resolver = ClassificationResolver::new(chart)
        .with_rules(store.clone())
        .with_memory(Arc::new(VendorMemory::new(store.clone())));

    if let Some(path) = &settings.model_path {
        match NaiveBayesModel::load(Path::new(path)) {
            Ok(model) => {
                info!(path = %path, classes = model.class_count(), "loaded classifier");
                resolver = resolver.with_classifier(Arc::new(model));
            }
            Err(e) => warn!(path = %path, error = %e, "classifier unavailable"),
        }
    }

    if settings.llm.enabled {
        match HttpCompletionClient::from_settings(&settings.llm) {
            Ok(client) => {
                resolver = resolver.with_generative(
                    Arc::new(client),
                    RetryPolicy::new(settings.llm.max_retries),
                    Duration::from_secs(settings.llm.timeout_secs),
                );
            }
            Err(e) => warn!(error = %e, "generative classification disabled"),
        }
    }
    Ok(resolver)
}

pub(crate) fn parse_date_arg(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| LedgerError::Other(format!("Invalid date '{value}' (expected YYYY-MM-DD)")))
}

/// `--from`/`--to` with open ends defaulting to all time. Bounds stay within
/// four-digit years so date keys compare as strings.
pub(crate) fn date_range(from: Option<&str>, to: Option<&str>) -> Result<(NaiveDate, NaiveDate)> {
    let from = match from {
        Some(s) => parse_date_arg(s)?,
        None => NaiveDate::from_ymd_opt(1000, 1, 1).unwrap_or(NaiveDate::MIN),
    };
    let to = match to {
        Some(s) => parse_date_arg(s)?,
        None => NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX),
    };
    Ok((from, to))
}

#[derive(Parser)]
#[command(
    name = "ledgerlens",
    about = "Turn bank and card statement PDFs into categorized, sign-normalized transactions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for ledgerlens data (default: ~/Documents/ledgerlens)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Tenant that commands act on
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Extract, categorize and store the transactions in a statement PDF.
    Ingest {
        /// Path to the statement PDF, or a .txt file of already-extracted text
        file: String,
        /// Account the statement belongs to, as it appears in the chart (e.g. "1000 - Checking")
        #[arg(long)]
        source: String,
        /// bank, card or loan
        #[arg(long = "source-type")]
        source_type: String,
        /// Print records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List stored transactions.
    Transactions {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Only bank, card or loan records
        #[arg(long = "source-type")]
        source_type: Option<String>,
    },
    /// Manage exact-match vendor rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Inspect or teach vendor memory.
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// Inspect or reset learned sign policies.
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// Link transfers between accounts.
    Pair {
        /// Pair a single transaction instead of sweeping a range
        #[arg(long, conflicts_with_all = ["from", "to"])]
        id: Option<String>,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Show the chart of accounts.
    Chart,
    /// Export stored transactions to CSV.
    Export {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Output path (default: <data-dir>/exports/transactions-<date>.csv)
        #[arg(long)]
        output: Option<String>,
    },
    /// Train the offline classifier.
    Model {
        #[command(subcommand)]
        command: ModelCommands,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Map a vendor to an account.
    Add {
        /// Vendor text; matched on its canonical key
        vendor: String,
        /// Account from the chart
        account: String,
    },
    /// List active rules.
    List,
    /// Deactivate a rule.
    Delete {
        /// Rule ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// List remembered vendors.
    List {
        /// Show the cross-tenant memory
        #[arg(long)]
        global: bool,
    },
    /// Remember an account for a vendor.
    Set {
        /// Vendor text; stored under its canonical key
        vendor: String,
        /// Account from the chart
        account: String,
        /// Write to the cross-tenant memory
        #[arg(long)]
        global: bool,
    },
}

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List learned sign policies.
    List,
    /// Forget a source's policy so the next statement relearns it.
    Reset {
        /// Source account
        source: String,
    },
}

#[derive(Subcommand)]
pub enum ModelCommands {
    /// Fit the classifier from rules and vendor memory.
    Train {
        /// Output path (default: <data-dir>/model.json)
        #[arg(long)]
        output: Option<String>,
    },
}
