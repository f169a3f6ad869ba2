//! Account balance and cash-movement records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::TradeDeskError;
use super::order::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub user_id: i64,
    pub available_cash: Decimal,
    pub total_invested: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    pub fn new(user_id: i64, starting_cash: Decimal, now: DateTime<Utc>) -> Self {
        AccountBalance {
            user_id,
            available_cash: starting_cash,
            total_invested: Decimal::ZERO,
            updated_at: now,
        }
    }

    /// Settles a filled order of `value`. Buys move cash into invested
    /// capital, sells move it back.
    /// The balance is left untouched when either side would overflow.
    pub fn settle_fill(
        &mut self,
        direction: Direction,
        value: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), TradeDeskError> {
        let (cash, invested) = match direction {
            Direction::Buy => (
                self.available_cash.checked_sub(value),
                self.total_invested.checked_add(value),
            ),
            Direction::Sell => (
                self.available_cash.checked_add(value),
                self.total_invested.checked_sub(value),
            ),
        };
        let (Some(cash), Some(invested)) = (cash, invested) else {
            return Err(TradeDeskError::validation("Order value too large"));
        };
        self.available_cash = cash;
        self.total_invested = invested;
        self.updated_at = now;
        Ok(())
    }

    pub fn credit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), TradeDeskError> {
        self.available_cash = self
            .available_cash
            .checked_add(amount)
            .ok_or_else(|| TradeDeskError::validation("Amount too large"))?;
        self.updated_at = now;
        Ok(())
    }

    pub fn debit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), TradeDeskError> {
        if amount > self.available_cash {
            return Err(TradeDeskError::InsufficientCash {
                requested: amount,
                available: self.available_cash,
            });
        }
        self.available_cash = self
            .available_cash
            .checked_sub(amount)
            .ok_or_else(|| TradeDeskError::validation("Amount too large"))?;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    TopUp,
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::TopUp => "TopUp",
            TransactionType::Withdraw => "Withdraw",
        }
    }
}

impl FromStr for TransactionType {
    type Err = TradeDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TopUp" => Ok(TransactionType::TopUp),
            "Withdraw" => Ok(TransactionType::Withdraw),
            other => Err(TradeDeskError::validation(format!(
                "Invalid transaction type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = TradeDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            _ => Err(TradeDeskError::validation(
                "Invalid payment method. Only Credit Card or Debit Card allowed.",
            )),
        }
    }
}

/// Append-only record of a top-up or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashTransaction {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashMovementRequest {
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
}

impl CashMovementRequest {
    pub fn validate(&self) -> Result<(Decimal, PaymentMethod), TradeDeskError> {
        let amount = match self.amount {
            Some(a) if a > Decimal::ZERO => a,
            _ => return Err(TradeDeskError::validation("Amount must be positive")),
        };
        let method = self.payment_method.as_deref().unwrap_or_default().parse()?;
        Ok((amount, method))
    }
}
