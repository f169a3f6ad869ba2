//! Store selection.
//!
//! PostgreSQL is used when the `postgres` feature is compiled in and
//! `[postgres] connection_string` is set; otherwise SQLite.

use std::sync::Arc;

use crate::domain::error::TradeDeskError;
use crate::domain::quote::QuoteBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::quote_port::QuotePort;

#[cfg(feature = "postgres")]
use crate::adapters::postgres_adapter::PostgresAdapter;
#[cfg(feature = "sqlite")]
use crate::adapters::sqlite_adapter::SqliteAdapter;

pub enum Store {
    #[cfg(feature = "sqlite")]
    Sqlite(Arc<SqliteAdapter>),
    #[cfg(feature = "postgres")]
    Postgres(Arc<PostgresAdapter>),
}

impl Store {
    /// Opens the configured store and makes sure its schema exists.
    pub fn open(config: &dyn ConfigPort) -> Result<Self, TradeDeskError> {
        let store = Self::connect(config)?;
        store.initialize_schema()?;
        Ok(store)
    }

    fn connect(config: &dyn ConfigPort) -> Result<Self, TradeDeskError> {
        #[cfg(feature = "postgres")]
        {
            if config.get_string("postgres", "connection_string").is_some() {
                return Ok(Store::Postgres(Arc::new(PostgresAdapter::from_config(
                    config,
                )?)));
            }
        }

        #[cfg(feature = "sqlite")]
        {
            Ok(Store::Sqlite(Arc::new(SqliteAdapter::from_config(config)?)))
        }

        #[cfg(not(feature = "sqlite"))]
        {
            Err(TradeDeskError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Store::Postgres(_) => "postgres",
        }
    }

    pub fn initialize_schema(&self) -> Result<(), TradeDeskError> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(a) => a.initialize_schema(),
            #[cfg(feature = "postgres")]
            Store::Postgres(a) => a.initialize_schema(),
        }
    }

    pub fn insert_quotes(&self, bars: &[QuoteBar]) -> Result<usize, TradeDeskError> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(a) => a.insert_quotes(bars),
            #[cfg(feature = "postgres")]
            Store::Postgres(a) => a.insert_quotes(bars),
        }
    }

    pub fn ledger(&self) -> Arc<dyn LedgerPort + Send + Sync> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(a) => a.clone(),
            #[cfg(feature = "postgres")]
            Store::Postgres(a) => a.clone(),
        }
    }

    pub fn quotes(&self) -> Arc<dyn QuotePort + Send + Sync> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(a) => a.clone(),
            #[cfg(feature = "postgres")]
            Store::Postgres(a) => a.clone(),
        }
    }
}
