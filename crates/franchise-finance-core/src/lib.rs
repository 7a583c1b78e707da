pub mod error;
pub mod health;
pub mod report;
pub mod simulator;
pub mod tax;
pub mod trends;
pub mod types;

#[cfg(feature = "cache")]
pub mod cache;

pub use error::FinanceError;
pub use types::*;

/// Standard result type for all franchise-finance operations
pub type FinanceResult<T> = Result<T, FinanceError>;
