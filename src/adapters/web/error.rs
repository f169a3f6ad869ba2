//! JSON error responses for the web adapter.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::domain::error::TradeDeskError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &TradeDeskError) -> StatusCode {
    match err {
        TradeDeskError::Validation { .. }
        | TradeDeskError::InvalidStatus
        | TradeDeskError::InvalidYears { .. }
        | TradeDeskError::InsufficientFunds { .. }
        | TradeDeskError::InsufficientCash { .. }
        | TradeDeskError::NoPosition { .. }
        | TradeDeskError::InsufficientShares { .. }
        | TradeDeskError::OrderNotPending { .. } => StatusCode::BAD_REQUEST,
        TradeDeskError::OrderNotFound { .. } => StatusCode::NOT_FOUND,
        TradeDeskError::QuoteUnavailable { .. } | TradeDeskError::InsufficientData { .. } => {
            StatusCode::BAD_GATEWAY
        }
        TradeDeskError::Database { .. }
        | TradeDeskError::DatabaseQuery { .. }
        | TradeDeskError::ConfigParse { .. }
        | TradeDeskError::ConfigMissing { .. }
        | TradeDeskError::ConfigInvalid { .. }
        | TradeDeskError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TradeDeskError> for WebError {
    fn from(err: TradeDeskError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            // Store and config details stay in the log.
            error!(error = %err, "request failed");
            return Self::new(status, "Internal server error");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for WebError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn business_rules_are_bad_requests_with_details() {
        let err = WebError::from(TradeDeskError::InsufficientFunds {
            needed: dec!(1500),
            available: dec!(1000),
        });
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("$1500.00"));
    }

    #[test]
    fn missing_order_is_not_found() {
        let err = WebError::from(TradeDeskError::OrderNotFound { order_id: 4 });
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Order not found");
    }

    #[test]
    fn store_failures_hide_details() {
        let err = WebError::from(TradeDeskError::Database {
            reason: "disk I/O error at /var/lib/tradedesk.db".into(),
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }
}
