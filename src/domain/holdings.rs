//! Current positions derived from filled orders.
//!
//! Holdings are never stored. They are a fold over the filled orders of a
//! user: buys add quantity and cost, sells subtract them. The fold is a sum
//! keyed by symbol, so the input order does not matter.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::TradeDeskError;
use super::order::Order;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub quantity: i64,
    pub total_cost: Decimal,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone)]
struct Accumulator {
    name_source_id: i64,
    name: String,
    quantity: i64,
    total_cost: Decimal,
}

/// Aggregates holdings across every symbol. Non-filled orders are ignored.
/// Only symbols with a strictly positive net quantity are returned, sorted by
/// symbol.
pub fn aggregate(orders: &[Order]) -> Result<Vec<Holding>, TradeDeskError> {
    let mut book: BTreeMap<&str, Accumulator> = BTreeMap::new();

    for order in orders.iter().filter(|o| o.is_filled()) {
        let sign = Decimal::from(order.direction.sign());
        let acc = book
            .entry(order.symbol.as_str())
            .or_insert_with(|| Accumulator {
                name_source_id: order.id,
                name: order.name.clone(),
                quantity: 0,
                total_cost: Decimal::ZERO,
            });

        // The lowest order id names the holding, whatever order we see them in.
        if order.id < acc.name_source_id {
            acc.name_source_id = order.id;
            acc.name = order.name.clone();
        }
        acc.quantity = acc
            .quantity
            .checked_add(order.direction.sign() * order.quantity)
            .ok_or_else(position_too_large)?;
        acc.total_cost = acc
            .total_cost
            .checked_add(sign * order.value()?)
            .ok_or_else(position_too_large)?;
    }

    Ok(book
        .into_iter()
        .filter(|(_, acc)| acc.quantity > 0)
        .map(|(symbol, acc)| Holding {
            symbol: symbol.to_string(),
            name: acc.name,
            quantity: acc.quantity,
            avg_price: acc.total_cost / Decimal::from(acc.quantity),
            total_cost: acc.total_cost,
        })
        .collect())
}

/// Net filled quantity for one symbol. May be zero or negative if the
/// history is inconsistent; callers treat anything `<= 0` as "not held".
pub fn position_quantity(orders: &[Order], symbol: &str) -> Result<i64, TradeDeskError> {
    orders
        .iter()
        .filter(|o| o.is_filled() && o.symbol == symbol)
        .try_fold(0i64, |held, o| {
            held.checked_add(o.direction.sign() * o.quantity)
                .ok_or_else(position_too_large)
        })
}

fn position_too_large() -> TradeDeskError {
    TradeDeskError::validation("Position too large")
}
