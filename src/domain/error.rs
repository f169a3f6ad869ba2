//! Domain error types.

use rust_decimal::Decimal;

use super::order::OrderStatus;

/// Top-level error type for tradedesk.
#[derive(Debug, thiserror::Error)]
pub enum TradeDeskError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("{reason}")]
    Validation { reason: String },

    #[error("Invalid status")]
    InvalidStatus,

    #[error("Years must be 3, 5, or 7")]
    InvalidYears { years: i64 },

    #[error("Insufficient funds. You need ${needed:.2} but only have ${available:.2}.")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Insufficient funds. You requested ${requested:.2} but only have ${available:.2}.")]
    InsufficientCash {
        requested: Decimal,
        available: Decimal,
    },

    #[error("You don't own any shares of {symbol}. You must buy before selling.")]
    NoPosition { symbol: String },

    #[error("Insufficient shares of {symbol}: have {held}, requested {requested}")]
    InsufficientShares {
        symbol: String,
        held: i64,
        requested: i64,
    },

    #[error("Order not found")]
    OrderNotFound { order_id: i64 },

    #[error("Can only update pending orders")]
    OrderNotPending { order_id: i64, status: OrderStatus },

    #[error("quote provider unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradeDeskError {
    pub fn validation(reason: impl Into<String>) -> Self {
        TradeDeskError::Validation {
            reason: reason.into(),
        }
    }

    /// Business-rule violations: the request was well formed but the
    /// account state does not allow it.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            TradeDeskError::InsufficientFunds { .. }
                | TradeDeskError::InsufficientCash { .. }
                | TradeDeskError::NoPosition { .. }
                | TradeDeskError::InsufficientShares { .. }
                | TradeDeskError::OrderNotPending { .. }
        )
    }
}

impl From<&TradeDeskError> for std::process::ExitCode {
    fn from(err: &TradeDeskError) -> Self {
        let code: u8 = match err {
            TradeDeskError::Io(_) => 1,
            TradeDeskError::ConfigParse { .. }
            | TradeDeskError::ConfigMissing { .. }
            | TradeDeskError::ConfigInvalid { .. } => 2,
            TradeDeskError::Database { .. } | TradeDeskError::DatabaseQuery { .. } => 3,
            TradeDeskError::Validation { .. }
            | TradeDeskError::InvalidStatus
            | TradeDeskError::InvalidYears { .. }
            | TradeDeskError::InsufficientFunds { .. }
            | TradeDeskError::InsufficientCash { .. }
            | TradeDeskError::NoPosition { .. }
            | TradeDeskError::InsufficientShares { .. }
            | TradeDeskError::OrderNotFound { .. }
            | TradeDeskError::OrderNotPending { .. } => 4,
            TradeDeskError::QuoteUnavailable { .. } | TradeDeskError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
