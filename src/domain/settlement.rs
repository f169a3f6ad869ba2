//! Order validation and settlement engine.
//!
//! Orders are checked against a point-in-time snapshot of cash and holdings
//! when they are created, and settled against the balance only when they are
//! filled. Each operation runs as one unit of work on the ledger store.
//!
//! Fills are re-validated: a buy fill that would overdraw the account, or a
//! sell fill for more shares than are currently held, is refused and the
//! order stays `Pending`. This closes the gap where several orders each pass
//! their own creation check but jointly exceed the account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::account::{AccountBalance, CashMovementRequest, CashTransaction, TransactionType};
use super::error::TradeDeskError;
use super::holdings::{self, Holding};
use super::order::{Direction, NewOrder, Order, OrderFilter, OrderRequest, OrderStatus};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerPort, LedgerTx, transact};

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    /// Cash credited to an account when it is first created.
    pub default_starting_cash: Decimal,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            default_starting_cash: Decimal::ZERO,
        }
    }
}

impl LedgerSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        LedgerSettings {
            default_starting_cash: config.get_decimal(
                "ledger",
                "default_starting_cash",
                Decimal::ZERO,
            ),
        }
    }
}

pub struct SettlementEngine<'a> {
    ledger: &'a dyn LedgerPort,
    settings: LedgerSettings,
}

impl<'a> SettlementEngine<'a> {
    pub fn new(ledger: &'a dyn LedgerPort, settings: LedgerSettings) -> Self {
        Self { ledger, settings }
    }

    pub fn balance(&self, user_id: i64) -> Result<AccountBalance, TradeDeskError> {
        transact(self.ledger, |tx| {
            load_or_create_balance(tx, user_id, &self.settings, Utc::now())
        })
    }

    pub fn create_order(
        &self,
        user_id: i64,
        request: &OrderRequest,
    ) -> Result<Order, TradeDeskError> {
        let new_order = request.validate()?;

        let order = transact(self.ledger, |tx| {
            let now = Utc::now();
            let balance = load_or_create_balance(tx, user_id, &self.settings, now)?;
            check_order(tx, user_id, &new_order, &balance)?;
            tx.insert_order(user_id, &new_order, now)
        })?;

        info!(
            user_id,
            order_id = order.id,
            symbol = %order.symbol,
            direction = %order.direction,
            quantity = order.quantity,
            "order accepted"
        );
        Ok(order)
    }

    /// Moves a pending order to `Filled` or `Cancelled`. Filling settles the
    /// order value against the balance in the same unit of work.
    pub fn update_order_status(
        &self,
        user_id: i64,
        order_id: i64,
        target: &str,
    ) -> Result<Order, TradeDeskError> {
        let target: OrderStatus = target.parse()?;
        if target == OrderStatus::Pending {
            return Err(TradeDeskError::InvalidStatus);
        }

        let result = transact(self.ledger, |tx| {
            let mut order = tx
                .order(user_id, order_id)?
                .ok_or(TradeDeskError::OrderNotFound { order_id })?;

            if !order.status.can_transition_to(target) {
                return Err(TradeDeskError::OrderNotPending {
                    order_id,
                    status: order.status,
                });
            }

            if target == OrderStatus::Filled {
                let now = Utc::now();
                let mut balance = load_or_create_balance(tx, user_id, &self.settings, now)?;
                let pending = NewOrder {
                    symbol: order.symbol.clone(),
                    name: order.name.clone(),
                    direction: order.direction,
                    price: order.price,
                    quantity: order.quantity,
                    order_type: order.order_type,
                    session: order.session.clone(),
                };
                check_order(tx, user_id, &pending, &balance)?;
                balance.settle_fill(order.direction, order.value()?, now)?;
                tx.save_balance(&balance)?;
            }

            tx.set_order_status(order.id, target)?;
            order.status = target;
            Ok(order)
        });

        match &result {
            Ok(order) => info!(
                user_id,
                order_id,
                status = %order.status,
                price = %order.price,
                quantity = order.quantity,
                "order status updated"
            ),
            Err(e) if e.is_business_rule() => {
                warn!(user_id, order_id, error = %e, "order status update refused")
            }
            Err(_) => {}
        }
        result
    }

    pub fn top_up(
        &self,
        user_id: i64,
        request: &CashMovementRequest,
    ) -> Result<AccountBalance, TradeDeskError> {
        let (amount, method) = request.validate()?;
        let balance = transact(self.ledger, |tx| {
            let now = Utc::now();
            let mut balance = load_or_create_balance(tx, user_id, &self.settings, now)?;
            balance.credit(amount, now)?;
            tx.save_balance(&balance)?;
            tx.insert_transaction(user_id, TransactionType::TopUp, amount, method, now)?;
            Ok(balance)
        })?;
        info!(user_id, amount = %amount, method = %method, "account topped up");
        Ok(balance)
    }

    pub fn withdraw(
        &self,
        user_id: i64,
        request: &CashMovementRequest,
    ) -> Result<AccountBalance, TradeDeskError> {
        let (amount, method) = request.validate()?;
        let balance = transact(self.ledger, |tx| {
            let now = Utc::now();
            let mut balance = load_or_create_balance(tx, user_id, &self.settings, now)?;
            balance.debit(amount, now)?;
            tx.save_balance(&balance)?;
            tx.insert_transaction(user_id, TransactionType::Withdraw, amount, method, now)?;
            Ok(balance)
        })?;
        info!(user_id, amount = %amount, method = %method, "withdrawal recorded");
        Ok(balance)
    }

    pub fn holdings(&self, user_id: i64) -> Result<Vec<Holding>, TradeDeskError> {
        let filled = transact(self.ledger, |tx| tx.filled_orders(user_id, None))?;
        holdings::aggregate(&filled)
    }

    pub fn orders(&self, user_id: i64, filter: &OrderFilter) -> Result<Vec<Order>, TradeDeskError> {
        self.ledger.orders(user_id, filter)
    }

    pub fn transactions(&self, user_id: i64) -> Result<Vec<CashTransaction>, TradeDeskError> {
        self.ledger.transactions(user_id)
    }
}

fn load_or_create_balance(
    tx: &mut dyn LedgerTx,
    user_id: i64,
    settings: &LedgerSettings,
    now: DateTime<Utc>,
) -> Result<AccountBalance, TradeDeskError> {
    if let Some(balance) = tx.balance(user_id)? {
        return Ok(balance);
    }
    let balance = AccountBalance::new(user_id, settings.default_starting_cash, now);
    tx.save_balance(&balance)?;
    Ok(balance)
}

/// Funds check for buys, holdings check for sells.
fn check_order(
    tx: &mut dyn LedgerTx,
    user_id: i64,
    order: &NewOrder,
    balance: &AccountBalance,
) -> Result<(), TradeDeskError> {
    match order.direction {
        Direction::Buy => {
            let needed = order.value()?;
            if needed > balance.available_cash {
                return Err(TradeDeskError::InsufficientFunds {
                    needed,
                    available: balance.available_cash,
                });
            }
        }
        Direction::Sell => {
            let filled = tx.filled_orders(user_id, Some(&order.symbol))?;
            let held = holdings::position_quantity(&filled, &order.symbol)?;
            if held <= 0 {
                return Err(TradeDeskError::NoPosition {
                    symbol: order.symbol.clone(),
                });
            }
            if order.quantity > held {
                return Err(TradeDeskError::InsufficientShares {
                    symbol: order.symbol.clone(),
                    held,
                    requested: order.quantity,
                });
            }
        }
    }
    Ok(())
}
