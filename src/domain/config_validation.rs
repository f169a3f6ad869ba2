//! Configuration validation.
//!
//! Checks every configured value before the store is opened or the server
//! starts. Missing keys fall back to their defaults; present keys must be
//! usable.

use crate::domain::error::TradeDeskError;
use crate::ports::config_port::ConfigPort;
use rust_decimal::Decimal;
use std::net::SocketAddr;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_POOL_SIZE: i64 = 4;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TradeDeskError> {
    validate_pool_size(config, "sqlite")?;
    validate_pool_size(config, "postgres")?;
    validate_starting_cash(config)?;
    validate_initial_capital(config)?;
    validate_quote_timeout(config)?;
    validate_listen(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> TradeDeskError {
    TradeDeskError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_pool_size(config: &dyn ConfigPort, section: &str) -> Result<(), TradeDeskError> {
    if config.get_int(section, "pool_size", DEFAULT_POOL_SIZE) < 1 {
        return Err(invalid(section, "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

fn validate_starting_cash(config: &dyn ConfigPort) -> Result<(), TradeDeskError> {
    let Some(raw) = config.get_string("ledger", "default_starting_cash") else {
        return Ok(());
    };
    match raw.trim().parse::<Decimal>() {
        Ok(value) if value >= Decimal::ZERO => Ok(()),
        Ok(_) => Err(invalid(
            "ledger",
            "default_starting_cash",
            "default_starting_cash must be non-negative",
        )),
        Err(_) => Err(invalid(
            "ledger",
            "default_starting_cash",
            "default_starting_cash must be a decimal amount",
        )),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), TradeDeskError> {
    let value = config.get_double("backtest", "initial_capital", 10_000.0);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_quote_timeout(config: &dyn ConfigPort) -> Result<(), TradeDeskError> {
    if config.get_int("backtest", "quote_timeout_secs", 10) <= 0 {
        return Err(invalid(
            "backtest",
            "quote_timeout_secs",
            "quote_timeout_secs must be positive",
        ));
    }
    Ok(())
}

fn validate_listen(config: &dyn ConfigPort) -> Result<(), TradeDeskError> {
    let listen = config
        .get_string("web", "listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    listen
        .trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| invalid("web", "listen", "listen must be host:port"))
}
