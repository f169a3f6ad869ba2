//! Web server adapter.
//!
//! JSON API mounted under `/portfolio`. Handlers extract the caller's
//! identity, hand the request to the settlement engine or the backtest, and
//! map domain errors to `{"error": ...}` responses.

mod error;
mod handlers;
mod identity;

pub use error::{WebError, status_from_error};
pub use handlers::*;
pub use identity::{USER_ID_HEADER, UserId};

use axum::{
    Router,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::backtest::BacktestConfig;
use crate::domain::settlement::LedgerSettings;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::quote_port::QuotePort;

pub struct AppState {
    pub ledger: Arc<dyn LedgerPort + Send + Sync>,
    pub quotes: Arc<dyn QuotePort + Send + Sync>,
    pub ledger_settings: LedgerSettings,
    pub backtest: BacktestConfig,
}

pub fn build_router(state: AppState) -> Router {
    let portfolio = Router::new()
        .route("/balance", get(handlers::balance))
        .route("/topup", post(handlers::top_up))
        .route("/withdraw", post(handlers::withdraw))
        .route("/transactions", get(handlers::transactions))
        .route(
            "/orders",
            get(handlers::list_orders).post(handlers::create_order),
        )
        .route("/orders/{id}", patch(handlers::update_order))
        .route("/holdings", get(handlers::holdings))
        .route("/strategy-backtest", post(handlers::strategy_backtest));

    Router::new()
        .nest("/portfolio", portfolio)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
