//! SQLite ledger and quote store.

use crate::domain::account::{AccountBalance, CashTransaction, PaymentMethod, TransactionType};
use crate::domain::error::TradeDeskError;
use crate::domain::order::{NewOrder, Order, OrderFilter, OrderStatus};
use crate::domain::quote::QuoteBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerPort, LedgerTx};
use crate::ports::quote_port::QuotePort;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, error};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS account_balances (
    user_id INTEGER PRIMARY KEY,
    available_cash TEXT NOT NULL,
    total_invested TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    name TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('Buy', 'Sell')),
    price TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    order_type TEXT NOT NULL,
    session TEXT,
    status TEXT NOT NULL CHECK (status IN ('Pending', 'Filled', 'Cancelled')),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_user_symbol ON orders(user_id, symbol, status);
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    type TEXT NOT NULL CHECK (type IN ('TopUp', 'Withdraw')),
    amount TEXT NOT NULL,
    payment_method TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);
CREATE TABLE IF NOT EXISTS quotes (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    PRIMARY KEY (symbol, date)
);";

const ORDER_COLUMNS: &str =
    "id, user_id, symbol, name, direction, price, quantity, order_type, session, status, created_at";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> TradeDeskError {
    error!(error = %e, "sqlite pool error");
    TradeDeskError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> TradeDeskError {
    error!(error = %e, "sqlite query error");
    TradeDeskError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// Reads a TEXT column and parses it into `T`.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        name: row.get(3)?,
        direction: parse_column(row, 4)?,
        price: parse_column(row, 5)?,
        quantity: row.get(6)?,
        order_type: parse_column(row, 7)?,
        session: row.get(8)?,
        status: parse_column(row, 9)?,
        created_at: parse_column(row, 10)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<CashTransaction> {
    Ok(CashTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_column(row, 2)?,
        amount: parse_column(row, 3)?,
        payment_method: parse_column(row, 4)?,
        created_at: parse_column(row, 5)?,
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradeDeskError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TradeDeskError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(())));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        debug!(path = %db_path, pool_size, "opened sqlite store");
        Ok(Self { pool })
    }

    /// A private in-memory database. The pool holds a single connection so
    /// every caller sees the same data.
    pub fn in_memory() -> Result<Self, TradeDeskError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TradeDeskError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), TradeDeskError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    /// Upserts quote bars, returning how many rows were written.
    pub fn insert_quotes(&self, bars: &[QuoteBar]) -> Result<usize, TradeDeskError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO quotes (symbol, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.symbol,
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }
}

/// Ledger operations against a connection that already holds the write
/// lock for the current unit of work.
struct SqliteTx<'c> {
    conn: &'c Connection,
}

impl LedgerTx for SqliteTx<'_> {
    fn balance(&mut self, user_id: i64) -> Result<Option<AccountBalance>, TradeDeskError> {
        self.conn
            .query_row(
                "SELECT user_id, available_cash, total_invested, updated_at
                 FROM account_balances WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(AccountBalance {
                        user_id: row.get(0)?,
                        available_cash: parse_column(row, 1)?,
                        total_invested: parse_column(row, 2)?,
                        updated_at: parse_column(row, 3)?,
                    })
                },
            )
            .optional()
            .map_err(query_err)
    }

    fn save_balance(&mut self, balance: &AccountBalance) -> Result<(), TradeDeskError> {
        self.conn
            .execute(
                "INSERT INTO account_balances (user_id, available_cash, total_invested, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    available_cash = excluded.available_cash,
                    total_invested = excluded.total_invested,
                    updated_at = excluded.updated_at",
                params![
                    balance.user_id,
                    balance.available_cash.to_string(),
                    balance.total_invested.to_string(),
                    balance.updated_at.to_rfc3339()
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn order(&mut self, user_id: i64, order_id: i64) -> Result<Option<Order>, TradeDeskError> {
        self.conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1 AND user_id = ?2"),
                params![order_id, user_id],
                order_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn filled_orders(
        &mut self,
        user_id: i64,
        symbol: Option<&str>,
    ) -> Result<Vec<Order>, TradeDeskError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders
                 WHERE user_id = ?1 AND status = 'Filled' AND (?2 IS NULL OR symbol = ?2)
                 ORDER BY id ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id, symbol], order_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn insert_order(
        &mut self,
        user_id: i64,
        order: &NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<Order, TradeDeskError> {
        self.conn
            .execute(
                "INSERT INTO orders
                    (user_id, symbol, name, direction, price, quantity, order_type, session, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    user_id,
                    order.symbol,
                    order.name,
                    order.direction.as_str(),
                    order.price.to_string(),
                    order.quantity,
                    order.order_type.as_str(),
                    order.session,
                    OrderStatus::Pending.as_str(),
                    created_at.to_rfc3339()
                ],
            )
            .map_err(query_err)?;

        Ok(Order {
            id: self.conn.last_insert_rowid(),
            user_id,
            symbol: order.symbol.clone(),
            name: order.name.clone(),
            direction: order.direction,
            price: order.price,
            quantity: order.quantity,
            order_type: order.order_type,
            session: order.session.clone(),
            status: OrderStatus::Pending,
            created_at,
        })
    }

    fn set_order_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<(), TradeDeskError> {
        let changed = self
            .conn
            .execute(
                "UPDATE orders SET status = ?1 WHERE id = ?2",
                params![status.as_str(), order_id],
            )
            .map_err(query_err)?;
        if changed == 0 {
            return Err(TradeDeskError::OrderNotFound { order_id });
        }
        Ok(())
    }

    fn insert_transaction(
        &mut self,
        user_id: i64,
        kind: TransactionType,
        amount: Decimal,
        payment_method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Result<CashTransaction, TradeDeskError> {
        self.conn
            .execute(
                "INSERT INTO transactions (user_id, type, amount, payment_method, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    kind.as_str(),
                    amount.to_string(),
                    payment_method.as_str(),
                    created_at.to_rfc3339()
                ],
            )
            .map_err(query_err)?;

        Ok(CashTransaction {
            id: self.conn.last_insert_rowid(),
            user_id,
            kind,
            amount,
            payment_method,
            created_at,
        })
    }
}

impl LedgerPort for SqliteAdapter {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), TradeDeskError>,
    ) -> Result<(), TradeDeskError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock before the first read, so two units
        // of work never check the same stale balance.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let mut handle = SqliteTx { conn: &tx };
        work(&mut handle)?;

        tx.commit().map_err(query_err)
    }

    fn orders(&self, user_id: i64, filter: &OrderFilter) -> Result<Vec<Order>, TradeDeskError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR status = ?2)
                   AND (?3 IS NULL OR direction = ?3)
                 ORDER BY id DESC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![
                    user_id,
                    filter.status.map(|s| s.as_str()),
                    filter.direction.map(|d| d.as_str())
                ],
                order_from_row,
            )
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn transactions(&self, user_id: i64) -> Result<Vec<CashTransaction>, TradeDeskError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, type, amount, payment_method, created_at
                 FROM transactions WHERE user_id = ?1
                 ORDER BY id DESC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id], transaction_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl QuotePort for SqliteAdapter {
    fn fetch_daily(
        &self,
        symbol: &str,
        outputsize: usize,
    ) -> Result<Option<Vec<QuoteBar>>, TradeDeskError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, date, open, high, low, close, volume
                 FROM quotes WHERE symbol = ?1
                 ORDER BY date DESC
                 LIMIT ?2",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, outputsize as i64], |row| {
                Ok(QuoteBar {
                    symbol: row.get(0)?,
                    date: parse_column(row, 1)?,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                })
            })
            .map_err(query_err)?;

        let mut bars = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        if bars.is_empty() {
            return Ok(None);
        }
        bars.reverse();
        Ok(Some(bars))
    }
}
