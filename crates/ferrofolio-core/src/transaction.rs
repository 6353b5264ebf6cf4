use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Symbol, UtcDateTime};
use crate::error::ValidationError;
use crate::format;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(ValidationError::InvalidDirection {
                value: value.to_owned(),
            }),
        }
    }
}

/// Execution style. Only market orders are executed by the ledger; limit
/// orders are recorded as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Market,
    Limit,
}

impl OrderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
        }
    }
}

impl Display for OrderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MARKET" => Ok(Self::Market),
            "LIMIT" => Ok(Self::Limit),
            _ => Err(ValidationError::InvalidOrderKind {
                value: value.to_owned(),
            }),
        }
    }
}

/// Immutable record of an executed order.
///
/// Deserialization goes through [`Transaction::restore`], so price and
/// quantity are re-checked and the market value is recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionRecord")]
pub struct Transaction {
    id: Uuid,
    timestamp: UtcDateTime,
    symbol: Symbol,
    direction: Direction,
    order_kind: OrderKind,
    price: f64,
    quantity: u64,
    market_value: f64,
}

impl Transaction {
    /// Validate and build a new order. `timestamp` may not lie in the future.
    pub fn new(
        timestamp: UtcDateTime,
        symbol: Symbol,
        direction: Direction,
        order_kind: OrderKind,
        price: f64,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        if timestamp > UtcDateTime::now() {
            return Err(ValidationError::FutureTimestamp {
                value: timestamp.format_rfc3339(),
            });
        }

        Self::restore(
            Uuid::new_v4(),
            timestamp,
            symbol,
            direction,
            order_kind,
            price,
            quantity,
        )
    }

    pub fn market_buy(
        timestamp: UtcDateTime,
        symbol: Symbol,
        price: f64,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            timestamp,
            symbol,
            Direction::Buy,
            OrderKind::Market,
            price,
            quantity,
        )
    }

    pub fn market_sell(
        timestamp: UtcDateTime,
        symbol: Symbol,
        price: f64,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            timestamp,
            symbol,
            Direction::Sell,
            OrderKind::Market,
            price,
            quantity,
        )
    }

    /// Rebuild a persisted order under its original id. Price and quantity
    /// are re-checked; the timestamp is taken as stored.
    pub fn restore(
        id: Uuid,
        timestamp: UtcDateTime,
        symbol: Symbol,
        direction: Direction,
        order_kind: OrderKind,
        price: f64,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        if !price.is_finite() {
            return Err(ValidationError::NonFinitePrice);
        }
        if price < 0.0 {
            return Err(ValidationError::NegativePrice { price });
        }
        let quantity =
            u64::try_from(quantity).map_err(|_| ValidationError::NegativeQuantity { qty: quantity })?;

        Ok(Self {
            id,
            timestamp,
            symbol,
            direction,
            order_kind,
            price,
            quantity,
            market_value: price * quantity as f64,
        })
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub const fn order_kind(&self) -> OrderKind {
        self.order_kind
    }

    pub const fn price(&self) -> f64 {
        self.price
    }

    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Price times quantity, fixed at construction.
    pub const fn market_value(&self) -> f64 {
        self.market_value
    }
}

/// Wire shape of a [`Transaction`]. A stored `market_value` is ignored.
#[derive(Deserialize)]
struct TransactionRecord {
    id: Uuid,
    timestamp: UtcDateTime,
    symbol: Symbol,
    direction: Direction,
    order_kind: OrderKind,
    price: f64,
    quantity: i64,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = ValidationError;

    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        Self::restore(
            record.id,
            record.timestamp,
            record.symbol,
            record.direction,
            record.order_kind,
            record.price,
            record.quantity,
        )
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} - {} shares @ {}",
            self.timestamp,
            self.order_kind,
            self.direction,
            self.symbol,
            self.quantity,
            format::currency(self.price)
        )
    }
}
