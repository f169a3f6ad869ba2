//! Simulated single-symbol portfolio used by the backtest.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeAction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    /// Forced liquidation of an open position at the end of the series.
    #[serde(rename = "SELL (Final)")]
    FinalSell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::FinalSell => "SELL (Final)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimTrade {
    pub date: NaiveDate,
    pub action: TradeAction,
    pub price: f64,
    pub shares: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Cash plus at most one long position, all-in or flat.
#[derive(Debug, Clone, PartialEq)]
pub struct SimPortfolio {
    pub cash: f64,
    pub shares: i64,
    pub trades: Vec<SimTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl SimPortfolio {
    pub fn new(initial_capital: f64) -> Self {
        SimPortfolio {
            cash: initial_capital,
            shares: 0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.shares == 0
    }

    /// Buys as many whole shares as cash allows. Returns false (and does
    /// nothing) if not even one share is affordable.
    pub fn buy_all(&mut self, date: NaiveDate, price: f64) -> bool {
        if self.cash <= 0.0 || price <= 0.0 {
            return false;
        }
        let shares = (self.cash / price).floor() as i64;
        if shares <= 0 {
            return false;
        }
        let value = shares as f64 * price;
        self.cash -= value;
        self.shares = shares;
        self.trades.push(SimTrade {
            date,
            action: TradeAction::Buy,
            price,
            shares,
            value,
        });
        true
    }

    /// Sells the whole position. No-op when flat.
    pub fn sell_all(&mut self, date: NaiveDate, price: f64, action: TradeAction) {
        if self.shares == 0 {
            return;
        }
        let value = self.shares as f64 * price;
        self.cash += value;
        self.trades.push(SimTrade {
            date,
            action,
            price,
            shares: self.shares,
            value,
        });
        self.shares = 0;
    }

    pub fn total_value(&self, price: f64) -> f64 {
        self.cash + self.shares as f64 * price
    }

    pub fn record_equity(&mut self, date: NaiveDate, price: f64) {
        let value = self.total_value(price);
        self.equity_curve.push(EquityPoint { date, value });
    }
}
