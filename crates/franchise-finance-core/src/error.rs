use thiserror::Error;

use crate::types::MonthKey;

#[derive(Debug, Error)]
pub enum FinanceError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Period {month} of franchise {franchise_id} is locked and cannot be modified")]
    LockedPeriod {
        franchise_id: String,
        month: MonthKey,
    },

    #[error("A mutation is already in flight for {franchise_id} {month}")]
    Conflict {
        franchise_id: String,
        month: MonthKey,
    },

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for FinanceError {
    fn from(e: serde_json::Error) -> Self {
        FinanceError::SerializationError(e.to_string())
    }
}
