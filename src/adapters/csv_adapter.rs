//! CSV quote files.
//!
//! Each file holds one symbol's daily bars with the header
//! `date,open,high,low,close,volume`. As a [`QuotePort`] the adapter reads
//! `<SYMBOL>.csv` from a base directory.

use crate::domain::error::TradeDeskError;
use crate::domain::quote::QuoteBar;
use crate::ports::quote_port::QuotePort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn data_err(symbol: &str, reason: String) -> TradeDeskError {
    TradeDeskError::QuoteUnavailable {
        symbol: symbol.to_string(),
        reason,
    }
}

fn field<T>(record: &StringRecord, idx: usize, name: &str, symbol: &str) -> Result<T, TradeDeskError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    record
        .get(idx)
        .ok_or_else(|| data_err(symbol, format!("missing {} column", name)))?
        .trim()
        .parse()
        .map_err(|e| data_err(symbol, format!("invalid {} value: {}", name, e)))
}

/// Reads every bar in `path` for `symbol`, sorted oldest first.
pub fn read_quote_file(path: &Path, symbol: &str) -> Result<Vec<QuoteBar>, TradeDeskError> {
    let content = fs::read_to_string(path)?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| data_err(symbol, format!("CSV parse error: {}", e)))?;

        let date_str: String = field(&record, 0, "date", symbol)?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| data_err(symbol, format!("invalid date format: {}", e)))?;

        bars.push(QuoteBar {
            symbol: symbol.to_string(),
            date,
            open: field(&record, 1, "open", symbol)?,
            high: field(&record, 2, "high", symbol)?,
            low: field(&record, 3, "low", symbol)?,
            close: field(&record, 4, "close", symbol)?,
            volume: field(&record, 5, "volume", symbol)?,
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

impl QuotePort for CsvAdapter {
    fn fetch_daily(
        &self,
        symbol: &str,
        outputsize: usize,
    ) -> Result<Option<Vec<QuoteBar>>, TradeDeskError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Ok(None);
        }

        let mut bars = read_quote_file(&path, symbol)?;
        if bars.len() > outputsize {
            bars.drain(..bars.len() - outputsize);
        }
        Ok(Some(bars))
    }
}
