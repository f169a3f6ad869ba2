//! Order records and their lifecycle.
//!
//! An order is accepted in `Pending` and leaves it exactly once, either to
//! `Filled` (which settles against the account balance) or to `Cancelled`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::TradeDeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "Buy",
            Direction::Sell => "Sell",
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Buy => 1,
            Direction::Sell => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = TradeDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" => Ok(Direction::Buy),
            "Sell" => Ok(Direction::Sell),
            other => Err(TradeDeskError::validation(format!(
                "Invalid direction: {other}"
            ))),
        }
    }
}

/// Informational only; every order type settles the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Limit,
    Market,
    Stop,
    #[serde(rename = "Stop Limit")]
    StopLimit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "Limit",
            OrderType::Market => "Market",
            OrderType::Stop => "Stop",
            OrderType::StopLimit => "Stop Limit",
        }
    }
}

impl FromStr for OrderType {
    type Err = TradeDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Limit" => Ok(OrderType::Limit),
            "Market" => Ok(OrderType::Market),
            "Stop" => Ok(OrderType::Stop),
            "Stop Limit" => Ok(OrderType::StopLimit),
            other => Err(TradeDeskError::validation(format!(
                "Invalid order type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Filled => "Filled",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Only `Pending -> Filled` and `Pending -> Cancelled` exist.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Pending, OrderStatus::Filled)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = TradeDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Filled" => Ok(OrderStatus::Filled),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(TradeDeskError::InvalidStatus),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub name: String,
    pub direction: Direction,
    pub price: Decimal,
    pub quantity: i64,
    pub order_type: OrderType,
    pub session: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// `price * quantity`, refused when it does not fit in a `Decimal`.
pub fn order_value(price: Decimal, quantity: i64) -> Result<Decimal, TradeDeskError> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| TradeDeskError::validation("Order value too large"))
}

impl Order {
    pub fn value(&self) -> Result<Decimal, TradeDeskError> {
        order_value(self.price, self.quantity)
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}

/// An order that passed field validation and is ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub symbol: String,
    pub name: String,
    pub direction: Direction,
    pub price: Decimal,
    pub quantity: i64,
    pub order_type: OrderType,
    pub session: Option<String>,
}

impl NewOrder {
    pub fn value(&self) -> Result<Decimal, TradeDeskError> {
        order_value(self.price, self.quantity)
    }
}

/// Order request as submitted by a client. Every field is optional so that
/// missing fields surface as a validation error rather than a decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub direction: Option<String>,
    pub price: Option<Decimal>,
    pub quantity: Option<i64>,
    pub order_type: Option<String>,
    pub session: Option<String>,
}

impl OrderRequest {
    pub fn validate(&self) -> Result<NewOrder, TradeDeskError> {
        let symbol = self
            .symbol
            .as_deref()
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_default();
        let direction = self.direction.as_deref().map(str::trim).unwrap_or_default();

        let (price, quantity) = match (self.price, self.quantity) {
            (Some(p), Some(q)) if !symbol.is_empty() && !direction.is_empty() => (p, q),
            _ => return Err(TradeDeskError::validation("Missing required fields")),
        };

        if price <= Decimal::ZERO || quantity <= 0 {
            return Err(TradeDeskError::validation(
                "Price and quantity must be positive",
            ));
        }

        order_value(price, quantity)?;

        let direction: Direction = direction.parse()?;
        let order_type = match self.order_type.as_deref().map(str::trim) {
            None | Some("") => OrderType::default(),
            Some(s) => s.parse()?,
        };

        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| symbol.clone());

        Ok(NewOrder {
            symbol,
            name,
            direction,
            price,
            quantity,
            order_type,
            session: self.session.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}

/// Listing filter. `None` matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub direction: Option<Direction>,
}

impl OrderFilter {
    /// Builds a filter from query-string values, where `All` or an empty
    /// value means "no constraint".
    pub fn from_query(
        status: Option<&str>,
        direction: Option<&str>,
    ) -> Result<Self, TradeDeskError> {
        let status = match status {
            None | Some("") | Some("All") => None,
            Some(s) => Some(s.parse()?),
        };
        let direction = match direction {
            None | Some("") | Some("All") => None,
            Some(d) => Some(d.parse()?),
        };
        Ok(Self { status, direction })
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| s == order.status)
            && self.direction.is_none_or(|d| d == order.direction)
    }
}
