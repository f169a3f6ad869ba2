//! Ledger store port traits.
//!
//! Every read-check-write sequence the settlement engine performs runs
//! inside [`LedgerPort::atomically`]. An adapter must either commit all
//! writes made through the [`LedgerTx`] handle or none of them, and must
//! keep concurrent units of work on the same user from interleaving.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::account::{AccountBalance, CashTransaction, PaymentMethod, TransactionType};
use crate::domain::error::TradeDeskError;
use crate::domain::order::{NewOrder, Order, OrderFilter, OrderStatus};

/// Reads and writes visible inside one unit of work.
pub trait LedgerTx {
    fn balance(&mut self, user_id: i64) -> Result<Option<AccountBalance>, TradeDeskError>;

    /// Inserts or replaces the balance row for `balance.user_id`.
    fn save_balance(&mut self, balance: &AccountBalance) -> Result<(), TradeDeskError>;

    /// The order with `order_id`, only if it belongs to `user_id`.
    fn order(&mut self, user_id: i64, order_id: i64) -> Result<Option<Order>, TradeDeskError>;

    fn filled_orders(
        &mut self,
        user_id: i64,
        symbol: Option<&str>,
    ) -> Result<Vec<Order>, TradeDeskError>;

    fn insert_order(
        &mut self,
        user_id: i64,
        order: &NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<Order, TradeDeskError>;

    fn set_order_status(&mut self, order_id: i64, status: OrderStatus)
    -> Result<(), TradeDeskError>;

    fn insert_transaction(
        &mut self,
        user_id: i64,
        kind: TransactionType,
        amount: Decimal,
        payment_method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Result<CashTransaction, TradeDeskError>;
}

pub trait LedgerPort {
    /// Runs `work` in a single store transaction. Commits when `work`
    /// returns `Ok`, rolls back otherwise.
    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), TradeDeskError>,
    ) -> Result<(), TradeDeskError>;

    /// Orders for `user_id` matching `filter`, newest first.
    fn orders(&self, user_id: i64, filter: &OrderFilter) -> Result<Vec<Order>, TradeDeskError>;

    /// Cash movements for `user_id`, newest first.
    fn transactions(&self, user_id: i64) -> Result<Vec<CashTransaction>, TradeDeskError>;
}

/// Typed wrapper over [`LedgerPort::atomically`] that hands back the value
/// produced by `work`.
pub fn transact<T>(
    ledger: &dyn LedgerPort,
    mut work: impl FnMut(&mut dyn LedgerTx) -> Result<T, TradeDeskError>,
) -> Result<T, TradeDeskError> {
    let mut output = None;
    ledger.atomically(&mut |tx| {
        output = Some(work(tx)?);
        Ok(())
    })?;
    output.ok_or_else(|| TradeDeskError::Database {
        reason: "unit of work committed without producing a result".into(),
    })
}
