//! PostgreSQL ledger and quote store.

use crate::domain::account::{AccountBalance, CashTransaction, PaymentMethod, TransactionType};
use crate::domain::error::TradeDeskError;
use crate::domain::order::{NewOrder, Order, OrderFilter, OrderStatus};
use crate::domain::quote::QuoteBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerPort, LedgerTx};
use crate::ports::quote_port::QuotePort;
use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{IsolationLevel, NoTls, Row, Transaction};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, error};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS account_balances (
    user_id BIGINT PRIMARY KEY,
    available_cash NUMERIC NOT NULL,
    total_invested NUMERIC NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS orders (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    symbol TEXT NOT NULL,
    name TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('Buy', 'Sell')),
    price NUMERIC NOT NULL,
    quantity BIGINT NOT NULL CHECK (quantity > 0),
    order_type TEXT NOT NULL,
    session TEXT,
    status TEXT NOT NULL CHECK (status IN ('Pending', 'Filled', 'Cancelled')),
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_user_symbol ON orders(user_id, symbol, status);
CREATE TABLE IF NOT EXISTS transactions (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    type TEXT NOT NULL CHECK (type IN ('TopUp', 'Withdraw')),
    amount NUMERIC NOT NULL,
    payment_method TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);
CREATE TABLE IF NOT EXISTS quotes (
    symbol TEXT NOT NULL,
    date DATE NOT NULL,
    open DOUBLE PRECISION NOT NULL,
    high DOUBLE PRECISION NOT NULL,
    low DOUBLE PRECISION NOT NULL,
    close DOUBLE PRECISION NOT NULL,
    volume BIGINT NOT NULL,
    PRIMARY KEY (symbol, date)
);";

const ORDER_COLUMNS: &str =
    "id, user_id, symbol, name, direction, price, quantity, order_type, session, status, created_at";

type PgManager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<PgManager>,
}

fn pool_err(e: r2d2::Error) -> TradeDeskError {
    error!(error = %e, "postgres pool error");
    TradeDeskError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> TradeDeskError {
    error!(error = %e, "postgres query error");
    TradeDeskError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// Reads a TEXT column holding one of the domain's enum labels.
fn parse_text<T>(row: &Row, idx: usize) -> Result<T, TradeDeskError>
where
    T: FromStr<Err = TradeDeskError>,
{
    let raw: String = row.try_get(idx).map_err(query_err)?;
    raw.parse()
}

fn order_from_row(row: &Row) -> Result<Order, TradeDeskError> {
    Ok(Order {
        id: row.try_get(0).map_err(query_err)?,
        user_id: row.try_get(1).map_err(query_err)?,
        symbol: row.try_get(2).map_err(query_err)?,
        name: row.try_get(3).map_err(query_err)?,
        direction: parse_text(row, 4)?,
        price: row.try_get(5).map_err(query_err)?,
        quantity: row.try_get(6).map_err(query_err)?,
        order_type: parse_text(row, 7)?,
        session: row.try_get(8).map_err(query_err)?,
        status: parse_text(row, 9)?,
        created_at: row.try_get(10).map_err(query_err)?,
    })
}

fn transaction_from_row(row: &Row) -> Result<CashTransaction, TradeDeskError> {
    Ok(CashTransaction {
        id: row.try_get(0).map_err(query_err)?,
        user_id: row.try_get(1).map_err(query_err)?,
        kind: parse_text(row, 2)?,
        amount: row.try_get(3).map_err(query_err)?,
        payment_method: parse_text(row, 4)?,
        created_at: row.try_get(5).map_err(query_err)?,
    })
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradeDeskError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| TradeDeskError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| TradeDeskError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        debug!(pool_size, "opened postgres store");
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<PgManager>, TradeDeskError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), TradeDeskError> {
        self.conn()?.batch_execute(SCHEMA).map_err(query_err)
    }

    pub fn insert_quotes(&self, bars: &[QuoteBar]) -> Result<usize, TradeDeskError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT INTO quotes (symbol, date, open, high, low, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (symbol, date) DO UPDATE SET
                    open = excluded.open, high = excluded.high, low = excluded.low,
                    close = excluded.close, volume = excluded.volume",
                &[
                    &bar.symbol,
                    &bar.date,
                    &bar.open,
                    &bar.high,
                    &bar.low,
                    &bar.close,
                    &bar.volume,
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }
}

struct PgTx<'c> {
    tx: Transaction<'c>,
}

impl LedgerTx for PgTx<'_> {
    fn balance(&mut self, user_id: i64) -> Result<Option<AccountBalance>, TradeDeskError> {
        let row = self
            .tx
            .query_opt(
                "SELECT user_id, available_cash, total_invested, updated_at
                 FROM account_balances WHERE user_id = $1
                 FOR UPDATE",
                &[&user_id],
            )
            .map_err(query_err)?;

        row.map(|row| {
            Ok(AccountBalance {
                user_id: row.try_get(0).map_err(query_err)?,
                available_cash: row.try_get(1).map_err(query_err)?,
                total_invested: row.try_get(2).map_err(query_err)?,
                updated_at: row.try_get(3).map_err(query_err)?,
            })
        })
        .transpose()
    }

    fn save_balance(&mut self, balance: &AccountBalance) -> Result<(), TradeDeskError> {
        self.tx
            .execute(
                "INSERT INTO account_balances (user_id, available_cash, total_invested, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (user_id) DO UPDATE SET
                    available_cash = excluded.available_cash,
                    total_invested = excluded.total_invested,
                    updated_at = excluded.updated_at",
                &[
                    &balance.user_id,
                    &balance.available_cash,
                    &balance.total_invested,
                    &balance.updated_at,
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn order(&mut self, user_id: i64, order_id: i64) -> Result<Option<Order>, TradeDeskError> {
        let row = self
            .tx
            .query_opt(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE"
                ),
                &[&order_id, &user_id],
            )
            .map_err(query_err)?;
        row.as_ref().map(order_from_row).transpose()
    }

    fn filled_orders(
        &mut self,
        user_id: i64,
        symbol: Option<&str>,
    ) -> Result<Vec<Order>, TradeDeskError> {
        let rows = self
            .tx
            .query(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders
                     WHERE user_id = $1 AND status = 'Filled'
                       AND ($2::TEXT IS NULL OR symbol = $2)
                     ORDER BY id ASC"
                ),
                &[&user_id, &symbol],
            )
            .map_err(query_err)?;
        rows.iter().map(order_from_row).collect()
    }

    fn insert_order(
        &mut self,
        user_id: i64,
        order: &NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<Order, TradeDeskError> {
        let row = self
            .tx
            .query_one(
                "INSERT INTO orders
                    (user_id, symbol, name, direction, price, quantity, order_type, session, status, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 RETURNING id",
                &[
                    &user_id,
                    &order.symbol,
                    &order.name,
                    &order.direction.as_str(),
                    &order.price,
                    &order.quantity,
                    &order.order_type.as_str(),
                    &order.session,
                    &OrderStatus::Pending.as_str(),
                    &created_at,
                ],
            )
            .map_err(query_err)?;

        Ok(Order {
            id: row.try_get(0).map_err(query_err)?,
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
            .tx
            .execute(
                "UPDATE orders SET status = $1 WHERE id = $2",
                &[&status.as_str(), &order_id],
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
        let row = self
            .tx
            .query_one(
                "INSERT INTO transactions (user_id, type, amount, payment_method, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id",
                &[
                    &user_id,
                    &kind.as_str(),
                    &amount,
                    &payment_method.as_str(),
                    &created_at,
                ],
            )
            .map_err(query_err)?;

        Ok(CashTransaction {
            id: row.try_get(0).map_err(query_err)?,
            user_id,
            kind,
            amount,
            payment_method,
            created_at,
        })
    }
}

impl LedgerPort for PostgresAdapter {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), TradeDeskError>,
    ) -> Result<(), TradeDeskError> {
        let mut conn = self.conn()?;
        let tx = conn
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .map_err(query_err)?;

        let mut handle = PgTx { tx };
        work(&mut handle)?;

        handle.tx.commit().map_err(query_err)
    }

    fn orders(&self, user_id: i64, filter: &OrderFilter) -> Result<Vec<Order>, TradeDeskError> {
        let status = filter.status.map(|s| s.as_str());
        let direction = filter.direction.map(|d| d.as_str());
        let params: &[&(dyn ToSql + Sync)] = &[&user_id, &status, &direction];

        let rows = self
            .conn()?
            .query(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders
                     WHERE user_id = $1
                       AND ($2::TEXT IS NULL OR status = $2)
                       AND ($3::TEXT IS NULL OR direction = $3)
                     ORDER BY id DESC"
                ),
                params,
            )
            .map_err(query_err)?;
        rows.iter().map(order_from_row).collect()
    }

    fn transactions(&self, user_id: i64) -> Result<Vec<CashTransaction>, TradeDeskError> {
        let rows = self
            .conn()?
            .query(
                "SELECT id, user_id, type, amount, payment_method, created_at
                 FROM transactions WHERE user_id = $1
                 ORDER BY id DESC",
                &[&user_id],
            )
            .map_err(query_err)?;
        rows.iter().map(transaction_from_row).collect()
    }
}

impl QuotePort for PostgresAdapter {
    fn fetch_daily(
        &self,
        symbol: &str,
        outputsize: usize,
    ) -> Result<Option<Vec<QuoteBar>>, TradeDeskError> {
        let limit = outputsize as i64;
        let rows = self
            .conn()?
            .query(
                "SELECT symbol, date, open, high, low, close, volume
                 FROM quotes WHERE symbol = $1
                 ORDER BY date DESC
                 LIMIT $2",
                &[&symbol, &limit],
            )
            .map_err(query_err)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut bars = rows
            .iter()
            .map(|row| {
                Ok(QuoteBar {
                    symbol: row.try_get(0).map_err(query_err)?,
                    date: row.try_get(1).map_err(query_err)?,
                    open: row.try_get(2).map_err(query_err)?,
                    high: row.try_get(3).map_err(query_err)?,
                    low: row.try_get(4).map_err(query_err)?,
                    close: row.try_get(5).map_err(query_err)?,
                    volume: row.try_get(6).map_err(query_err)?,
                })
            })
            .collect::<Result<Vec<_>, TradeDeskError>>()?;
        bars.reverse();
        Ok(Some(bars))
    }
}
