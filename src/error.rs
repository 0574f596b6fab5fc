use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupingError {
    #[error("position {asset} in condition {condition_id} has negative outcome index {outcome_index}")]
    NegativeOutcomeIndex {
        condition_id: String,
        asset: String,
        outcome_index: i64,
    },

    #[error("position {asset} in condition {condition_id} has outcome index {outcome_index}, max supported is 63")]
    OutcomeIndexOutOfRange {
        condition_id: String,
        asset: String,
        outcome_index: i64,
    },

    #[error("total amount overflow in condition {0}")]
    AmountOverflow(String),
}

/// Failure of one group's redemption. Never fatal for the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("transaction reverted (tx {tx_hash})")]
    Reverted { tx_hash: String },

    #[error("confirmation timeout{}", .tx_hash.as_deref().map(|h| format!(" (tx {})", h)).unwrap_or_default())]
    ConfirmationTimeout { tx_hash: Option<String> },

    #[error("relayer error: {0}")]
    Relayer(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
