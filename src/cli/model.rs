use std::path::PathBuf;

use colored::Colorize;

use crate::classifier::NaiveBayesModel;
use crate::cli::open_store;
use crate::error::{LedgerError, Result};
use crate::memory::{MemoryScope, MemoryStore};
use crate::rules::RuleStore;
use crate::settings::{load_settings, save_settings};

/// Fit the statistical tier from everything the tenant has taught so far:
/// active rules, tenant memory and global memory.
pub fn train(output: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    let store = open_store(&settings)?;

    let mut examples: Vec<(String, String)> = store
        .list_rules(&settings.tenant)?
        .into_iter()
        .map(|r| (r.vendor_key, r.account))
        .collect();
    for scope in [MemoryScope::Tenant, MemoryScope::Global] {
        examples.extend(
            store
                .list_memory(scope, &settings.tenant)?
                .into_iter()
                .filter(|e| e.account != settings.default_account)
                .map(|e| (e.vendor_key, e.account)),
        );
    }
    if examples.is_empty() {
        return Err(LedgerError::Other(
            "Nothing to train on yet; add rules or memory first".to_string(),
        ));
    }

    let model = NaiveBayesModel::fit(examples.iter().map(|(k, a)| (k.as_str(), a.as_str())));
    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&settings.data_dir).join("model.json"));
    model.save(&path)?;

    settings.model_path = Some(path.to_string_lossy().to_string());
    save_settings(&settings)?;
    println!(
        "{} {} examples across {} accounts \u{2192} {}",
        "Trained:".green().bold(),
        examples.len(),
        model.class_count(),
        path.display()
    );
    Ok(())
}
