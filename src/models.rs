use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::LedgerError;

/// Category of the originating account; governs the display sign convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    Bank,
    Card,
    Loan,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Card => "card",
            Self::Loan => "loan",
        }
    }

    /// Card and loan accounts are liabilities: charges raise the balance owed.
    pub fn is_liability(&self) -> bool {
        matches!(self, Self::Card | Self::Loan)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bank" | "checking" | "savings" => Ok(Self::Bank),
            "card" | "credit_card" | "credit" => Ok(Self::Card),
            "loan" | "line_of_credit" => Ok(Self::Loan),
            other => Err(LedgerError::InvalidSourceType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    Rule,
    Memory,
    Ml,
    Ai,
    Default,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Memory => "memory",
            Self::Ml => "ml",
            Self::Ai => "ai",
            Self::Default => "default",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "rule" => Self::Rule,
            "memory" => Self::Memory,
            "ml" => Self::Ml,
            "ai" => Self::Ai,
            _ => Self::Default,
        }
    }
}

/// Metadata on a liability-source inflow; never changes the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflowKind {
    Payment,
    Refund,
}

impl InflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment" => Some(Self::Payment),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRole {
    Leader,
    Shadow,
}

impl PairRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Shadow => "shadow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "leader" => Some(Self::Leader),
            "shadow" => Some(Self::Shadow),
            _ => None,
        }
    }
}

/// Intermediate representation from a parsing strategy before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub memo: String,
    /// Signed as the statement prints it; the sign policy decides its meaning.
    pub amount: Decimal,
    /// Per-row account label when the statement covers several cards.
    pub source_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub tenant: String,
    pub date: NaiveDate,
    pub memo_raw: String,
    pub memo_clean: String,
    pub vendor_key: String,
    pub raw_amount: Decimal,
    pub amount: Decimal,
    pub source: String,
    pub source_type: SourceType,
    pub account: String,
    pub classification_source: ClassificationSource,
    pub inflow_kind: Option<InflowKind>,
    pub pair_id: Option<String>,
    pub pair_role: Option<PairRole>,
    pub paired_with: Option<String>,
}

impl Transaction {
    pub fn date_key(&self) -> String {
        date_key(self.date)
    }

    /// Shadow legs of a transfer are excluded from totals.
    pub fn event_leader(&self) -> bool {
        self.pair_role != Some(PairRole::Shadow)
    }
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
