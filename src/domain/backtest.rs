//! Moving-average crossover backtest.
//!
//! A single pass over a daily close series. From the first day on which both
//! moving averages are defined, a flat account buys as many shares as it can
//! when the close dips below MA30, and a long account sells everything when
//! the close rises above MA90. Any position still open on the last day is
//! liquidated at the final close.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::error::TradeDeskError;
use super::metrics::{annualized_return_pct, max_drawdown_pct, total_return_pct};
use super::moving_average::sma;
use super::portfolio::{EquityPoint, SimPortfolio, SimTrade, TradeAction};
use super::quote::QuoteBar;
use super::synthetic;
use crate::ports::config_port::ConfigPort;

pub const SHORT_WINDOW: usize = 30;
pub const LONG_WINDOW: usize = 90;
pub const TRADING_DAYS_PER_YEAR: usize = 252;
/// Extra bars requested on top of the backtest horizon so the long moving
/// average is defined from the start of the simulated period.
pub const WARMUP_BARS: usize = 100;
/// The simulation starts at index `LONG_WINDOW`, so a usable series needs
/// at least one bar past it.
pub const MIN_BARS: usize = LONG_WINDOW + 1;

/// Backtest horizon. Only 3, 5 and 7 years are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestYears {
    Three,
    Five,
    Seven,
}

impl BacktestYears {
    pub fn get(&self) -> u32 {
        match self {
            BacktestYears::Three => 3,
            BacktestYears::Five => 5,
            BacktestYears::Seven => 7,
        }
    }

    /// Number of daily bars to request from the quote provider.
    pub fn outputsize(&self) -> usize {
        self.get() as usize * TRADING_DAYS_PER_YEAR + WARMUP_BARS
    }

    /// Length of the synthetic fallback series.
    pub fn synthetic_points(&self) -> usize {
        self.get() as usize * TRADING_DAYS_PER_YEAR
    }
}

impl TryFrom<i64> for BacktestYears {
    type Error = TradeDeskError;

    fn try_from(years: i64) -> Result<Self, Self::Error> {
        match years {
            3 => Ok(BacktestYears::Three),
            5 => Ok(BacktestYears::Five),
            7 => Ok(BacktestYears::Seven),
            other => Err(TradeDeskError::InvalidYears { years: other }),
        }
    }
}

/// Backtest request as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BacktestRequest {
    pub symbol: Option<String>,
    pub years: Option<i64>,
    pub seed: Option<u64>,
}

impl BacktestRequest {
    /// Normalized symbol and horizon.
    pub fn validate(&self) -> Result<(String, BacktestYears), TradeDeskError> {
        let symbol = self
            .symbol
            .as_deref()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TradeDeskError::validation("Symbol is required"))?;
        let years = BacktestYears::try_from(self.years.unwrap_or_default())?;
        Ok((symbol, years))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub quote_timeout: Duration,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 10_000.0,
            quote_timeout: Duration::from_secs(10),
        }
    }
}

impl BacktestConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let defaults = BacktestConfig::default();
        let timeout_secs = config.get_int(
            "backtest",
            "quote_timeout_secs",
            defaults.quote_timeout.as_secs() as i64,
        );
        BacktestConfig {
            initial_capital: config.get_double(
                "backtest",
                "initial_capital",
                defaults.initial_capital,
            ),
            quote_timeout: Duration::from_secs(timeout_secs.max(1) as u64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Quoted,
    Synthetic,
}

/// Closing prices for one symbol, oldest first, with their provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    pub source: DataSource,
    pub seed: Option<u64>,
    pub fallback_reason: Option<String>,
}

impl PriceSeries {
    /// Builds a series from provider bars. Every bar must carry a price and
    /// there must be enough of them to run the simulation.
    pub fn from_quotes(symbol: &str, mut bars: Vec<QuoteBar>) -> Result<Self, TradeDeskError> {
        if let Some(bad) = bars.iter().find(|b| !b.has_price()) {
            return Err(TradeDeskError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no usable close on {}", bad.date),
            });
        }
        if bars.len() < MIN_BARS {
            return Err(TradeDeskError::InsufficientData {
                symbol: symbol.to_string(),
                bars: bars.len(),
                minimum: MIN_BARS,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(PriceSeries {
            symbol: symbol.to_string(),
            dates: bars.iter().map(|b| b.date).collect(),
            closes: bars.iter().map(|b| b.close).collect(),
            source: DataSource::Quoted,
            seed: None,
            fallback_reason: None,
        })
    }

    pub fn synthetic(
        symbol: &str,
        years: BacktestYears,
        seed: u64,
        end: NaiveDate,
        reason: String,
    ) -> Self {
        let (dates, closes) = synthetic::random_walk(years.synthetic_points(), seed, end);
        PriceSeries {
            symbol: symbol.to_string(),
            dates,
            closes,
            source: DataSource::Synthetic,
            seed: Some(seed),
            fallback_reason: Some(reason),
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

/// Picks the series to simulate from the provider's answer. Anything short
/// of a complete, priced series falls back to the synthetic random walk,
/// never to a mix of both.
pub fn resolve_series(
    symbol: &str,
    years: BacktestYears,
    quotes: Result<Option<Vec<QuoteBar>>, TradeDeskError>,
    seed: u64,
    end: NaiveDate,
) -> PriceSeries {
    let reason = match quotes {
        Ok(Some(bars)) => match PriceSeries::from_quotes(symbol, bars) {
            Ok(series) => return series,
            Err(e) => e.to_string(),
        },
        Ok(None) => format!("no quotes available for {symbol}"),
        Err(e) => e.to_string(),
    };

    warn!(symbol, seed, reason = %reason, "using synthetic price series");
    PriceSeries::synthetic(symbol, years, seed, end, reason)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyHoldComparison {
    pub final_value: f64,
    #[serde(rename = "return")]
    pub return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<f64>,
    pub ma30: Vec<Option<f64>>,
    pub ma90: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub symbol: String,
    pub years: u32,
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub trades: Vec<SimTrade>,
    pub portfolio_value: Vec<EquityPoint>,
    pub buy_hold_comparison: BuyHoldComparison,
    pub chart_data: ChartData,
    pub data_source: DataSource,
    pub synthetic_seed: Option<u64>,
    pub fallback_reason: Option<String>,
}

/// Runs the crossover strategy over `series`.
pub fn run_crossover(
    series: &PriceSeries,
    years: BacktestYears,
    initial_capital: f64,
) -> Result<BacktestResult, TradeDeskError> {
    if series.len() < MIN_BARS {
        return Err(TradeDeskError::InsufficientData {
            symbol: series.symbol.clone(),
            bars: series.len(),
            minimum: MIN_BARS,
        });
    }

    let prices = &series.closes;
    let dates = &series.dates;
    let ma30 = sma(prices, SHORT_WINDOW);
    let ma90 = sma(prices, LONG_WINDOW);

    let mut portfolio = SimPortfolio::new(initial_capital);

    for i in LONG_WINDOW..prices.len() {
        let price = prices[i];
        let date = dates[i];

        if portfolio.is_flat() {
            if let Some(short) = ma30[i] {
                if portfolio.cash > 0.0 && price < short {
                    portfolio.buy_all(date, price);
                }
            }
        } else if let Some(long) = ma90[i] {
            if price > long {
                portfolio.sell_all(date, price, TradeAction::Sell);
            }
        }

        portfolio.record_equity(date, price);
    }

    let last = prices.len() - 1;
    portfolio.sell_all(dates[last], prices[last], TradeAction::FinalSell);

    let final_value = portfolio.cash;
    let buy_hold_shares = (initial_capital / prices[LONG_WINDOW]).floor();
    let buy_hold_final = buy_hold_shares * prices[last];

    Ok(BacktestResult {
        symbol: series.symbol.clone(),
        years: years.get(),
        initial_capital,
        final_value,
        total_return: total_return_pct(initial_capital, final_value),
        annualized_return: annualized_return_pct(initial_capital, final_value, years.get()),
        max_drawdown: max_drawdown_pct(&portfolio.equity_curve),
        total_trades: portfolio.trades.len(),
        trades: portfolio.trades,
        portfolio_value: portfolio.equity_curve,
        buy_hold_comparison: BuyHoldComparison {
            final_value: buy_hold_final,
            return_pct: total_return_pct(initial_capital, buy_hold_final),
        },
        chart_data: ChartData {
            dates: dates[LONG_WINDOW..].to_vec(),
            prices: prices[LONG_WINDOW..].to_vec(),
            ma30: ma30[LONG_WINDOW..].to_vec(),
            ma90: ma90[LONG_WINDOW..].to_vec(),
        },
        data_source: series.source,
        synthetic_seed: series.seed,
        fallback_reason: series.fallback_reason.clone(),
    })
}
