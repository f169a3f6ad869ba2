//! Daily quote bars as supplied by a quote provider.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl QuoteBar {
    /// A bar with a non-finite or non-positive close carries no price
    /// information and must not be read as a zero-price quote.
    pub fn has_price(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}
