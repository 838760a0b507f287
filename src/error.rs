use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("Document has no extractable text")]
    NoText,

    #[error("Unrecognized statement layout: {0}")]
    UnrecognizedLayout(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Invalid source type: {0} (expected bank, card or loan)")]
    InvalidSourceType(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
