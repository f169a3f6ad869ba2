#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
pub use tradedesk::domain::error::TradeDeskError;
pub use tradedesk::domain::quote::QuoteBar;
use tradedesk::domain::account::CashMovementRequest;
use tradedesk::domain::order::OrderRequest;
use tradedesk::ports::quote_port::QuotePort;

pub struct MockQuotePort {
    pub data: HashMap<String, Vec<QuoteBar>>,
    pub errors: HashMap<String, String>,
    pub delay: Option<Duration>,
}

impl MockQuotePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            delay: None,
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<QuoteBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl QuotePort for MockQuotePort {
    fn fetch_daily(
        &self,
        symbol: &str,
        outputsize: usize,
    ) -> Result<Option<Vec<QuoteBar>>, TradeDeskError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TradeDeskError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).map(|bars| {
            let skip = bars.len().saturating_sub(outputsize);
            bars[skip..].to_vec()
        }))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> QuoteBar {
    QuoteBar {
        symbol: symbol.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// One bar per calendar day starting at `start_date`, closes taken from
/// `closes` in order.
pub fn bars_from_closes(symbol: &str, start_date: &str, closes: &[f64]) -> Vec<QuoteBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| QuoteBar {
            symbol: symbol.to_string(),
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        })
        .collect()
}

/// Sawtooth closes oscillating around `base`, enough to trigger crossover
/// entries and exits.
pub fn generate_bars(symbol: &str, start_date: &str, count: usize, base: f64) -> Vec<QuoteBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| base + ((i % 40) as f64 - 20.0).abs())
        .collect();
    bars_from_closes(symbol, start_date, &closes)
}

pub fn buy(symbol: &str, price: Decimal, quantity: i64) -> OrderRequest {
    OrderRequest {
        symbol: Some(symbol.to_string()),
        name: Some(format!("{symbol} Inc.")),
        direction: Some("Buy".to_string()),
        price: Some(price),
        quantity: Some(quantity),
        order_type: Some("Limit".to_string()),
        session: None,
    }
}

pub fn sell(symbol: &str, price: Decimal, quantity: i64) -> OrderRequest {
    OrderRequest {
        direction: Some("Sell".to_string()),
        ..buy(symbol, price, quantity)
    }
}

pub fn cash(amount: Decimal) -> CashMovementRequest {
    CashMovementRequest {
        amount: Some(amount),
        payment_method: Some("credit_card".to_string()),
    }
}
