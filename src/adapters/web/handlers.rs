//! HTTP request handlers for the portfolio API.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::account::{AccountBalance, CashMovementRequest, CashTransaction};
use crate::domain::backtest::{BacktestRequest, BacktestResult, resolve_series, run_crossover};
use crate::domain::error::TradeDeskError;
use crate::domain::holdings::Holding;
use crate::domain::order::{Order, OrderFilter, OrderRequest};
use crate::domain::settlement::SettlementEngine;
use crate::domain::synthetic;

use super::{AppState, UserId, WebError};

/// Runs a ledger operation on the blocking pool.
async fn with_engine<T, F>(state: Arc<AppState>, op: F) -> Result<T, WebError>
where
    T: Send + 'static,
    F: FnOnce(&SettlementEngine<'_>) -> Result<T, TradeDeskError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let engine = SettlementEngine::new(state.ledger.as_ref(), state.ledger_settings.clone());
        op(&engine)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "ledger task failed");
        WebError::internal("Internal server error")
    })?
    .map_err(WebError::from)
}

pub async fn balance(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<AccountBalance>, WebError> {
    with_engine(state, move |engine| engine.balance(user_id))
        .await
        .map(Json)
}

pub async fn top_up(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    payload: Result<Json<CashMovementRequest>, JsonRejection>,
) -> Result<Json<AccountBalance>, WebError> {
    let Json(request) = payload?;
    with_engine(state, move |engine| engine.top_up(user_id, &request))
        .await
        .map(Json)
}

pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    payload: Result<Json<CashMovementRequest>, JsonRejection>,
) -> Result<Json<AccountBalance>, WebError> {
    let Json(request) = payload?;
    with_engine(state, move |engine| engine.withdraw(user_id, &request))
        .await
        .map(Json)
}

pub async fn transactions(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<CashTransaction>>, WebError> {
    with_engine(state, move |engine| engine.transactions(user_id))
        .await
        .map(Json)
}

#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub direction: Option<String>,
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    query: Result<Query<OrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<Order>>, WebError> {
    let Query(query) = query?;
    let filter = OrderFilter::from_query(query.status.as_deref(), query.direction.as_deref())?;
    with_engine(state, move |engine| engine.orders(user_id, &filter))
        .await
        .map(Json)
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WebError> {
    let Json(request) = payload?;
    let order = with_engine(state, move |engine| engine.create_order(user_id, &request)).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
}

pub async fn update_order(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(order_id): Path<i64>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Order>, WebError> {
    let Json(update) = payload?;
    let target = update.status.unwrap_or_default();
    with_engine(state, move |engine| {
        engine.update_order_status(user_id, order_id, &target)
    })
    .await
    .map(Json)
}

pub async fn holdings(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Holding>>, WebError> {
    with_engine(state, move |engine| engine.holdings(user_id))
        .await
        .map(Json)
}

/// Runs the crossover backtest. The quote fetch is bounded by the configured
/// timeout; any failure to obtain a usable series falls back to synthetic
/// prices, which the result labels.
pub async fn strategy_backtest(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    payload: Result<Json<BacktestRequest>, JsonRejection>,
) -> Result<Json<BacktestResult>, WebError> {
    let Json(request) = payload?;
    let (symbol, years) = request.validate()?;
    let seed = request.seed.unwrap_or_else(synthetic::random_seed);

    let quotes = Arc::clone(&state.quotes);
    let fetch_symbol = symbol.clone();
    let fetch = tokio::task::spawn_blocking(move || {
        quotes.fetch_daily(&fetch_symbol, years.outputsize())
    });

    let outcome = match tokio::time::timeout(state.backtest.quote_timeout, fetch).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => {
            error!(symbol = %symbol, error = %join, "quote task failed");
            Err(TradeDeskError::QuoteUnavailable {
                symbol: symbol.clone(),
                reason: "quote task failed".into(),
            })
        }
        Err(_) => Err(TradeDeskError::QuoteUnavailable {
            symbol: symbol.clone(),
            reason: format!(
                "quote request timed out after {}s",
                state.backtest.quote_timeout.as_secs()
            ),
        }),
    };

    let series = resolve_series(&symbol, years, outcome, seed, Utc::now().date_naive());
    let result = run_crossover(&series, years, state.backtest.initial_capital)?;

    info!(
        user_id,
        symbol = %result.symbol,
        years = result.years,
        data_source = ?result.data_source,
        total_return = result.total_return,
        "strategy backtest complete"
    );
    Ok(Json(result))
}

pub async fn not_found() -> WebError {
    WebError::not_found("Not found")
}
