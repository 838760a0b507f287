use std::path::Path;

use crate::error::{LedgerError, Result};
use crate::settings::DEFAULT_ACCOUNT;

const BUILTIN_CHART: &[&str] = &[
    "1000 - Checking",
    "1010 - Savings",
    "2000 - Credit Card Payable",
    "2100 - Loan Payable",
    "3000 - Owner Draw / Distribution",
    "4000 - Client Services",
    "4100 - Reimbursements",
    "4200 - Interest Income",
    "4900 - Other Income",
    "5000 - Advertising & Marketing",
    "5100 - Car & Truck",
    "5200 - Commissions & Fees",
    "5300 - Contract Labor",
    "5400 - Insurance",
    "5500 - Legal & Professional",
    "5600 - Office Expense",
    "5700 - Rent / Lease",
    "5800 - Software & Subscriptions",
    "5810 - Hosting & Infrastructure",
    "5900 - Taxes & Licenses",
    "6000 - Travel",
    "6100 - Meals",
    "6200 - Groceries",
    "6300 - Utilities",
    "6400 - Payroll",
    "6500 - Bank & Merchant Fees",
    "6600 - Interest Expense",
    "6700 - Education & Training",
    "6800 - Equipment",
    "6900 - Shopping",
    "7000 - Transfer",
    DEFAULT_ACCOUNT,
];

/// Immutable, ordered list of "<code> - <name>" entries; the only authority
/// for valid `account` values.
#[derive(Debug, Clone)]
pub struct ChartOfAccounts {
    entries: Vec<String>,
    default_account: String,
}

impl ChartOfAccounts {
    pub fn new(entries: Vec<String>, default_account: &str) -> Result<Self> {
        let entries: Vec<String> = entries
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        // the fallback must always have an entry other than the source to pick
        if entries.iter().all(|e| e == &entries[0]) {
            return Err(LedgerError::Settings(
                "chart of accounts needs at least two distinct entries".to_string(),
            ));
        }
        if !entries.iter().any(|e| e == default_account) {
            return Err(LedgerError::UnknownAccount(format!(
                "default account '{default_account}' is not in the chart of accounts"
            )));
        }
        Ok(Self {
            entries,
            default_account: default_account.to_string(),
        })
    }

    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_CHART.iter().map(|s| s.to_string()).collect(),
            default_account: DEFAULT_ACCOUNT.to_string(),
        }
    }

    /// One entry per line; blank lines and `#` comments are ignored.
    pub fn load(path: &Path, default_account: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries = content
            .lines()
            .filter(|l| !l.trim_start().starts_with('#'))
            .map(|l| l.to_string())
            .collect();
        Self::new(entries, default_account)
    }

    pub fn contains(&self, account: &str) -> bool {
        self.entries.iter().any(|e| e == account)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn default_account(&self) -> &str {
        &self.default_account
    }

    /// Resolve a model answer: the exact entry, or a bare code that names
    /// exactly one entry.
    pub fn lookup(&self, answer: &str) -> Option<&str> {
        let answer = answer.trim();
        if let Some(e) = self.entries.iter().find(|e| e.as_str() == answer) {
            return Some(e);
        }
        let mut by_code = self
            .entries
            .iter()
            .filter(|e| e.split(" - ").next().map(str::trim) == Some(answer));
        match (by_code.next(), by_code.next()) {
            (Some(e), None) => Some(e),
            _ => None,
        }
    }

    /// Fallback account that is guaranteed to differ from `source`.
    pub fn fallback_for(&self, source: &str) -> &str {
        if self.default_account != source {
            return &self.default_account;
        }
        self.entries
            .iter()
            .find(|e| e.as_str() != source)
            .map(String::as_str)
            .unwrap_or(&self.default_account)
    }
}
