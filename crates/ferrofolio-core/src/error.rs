use ferrofolio_warehouse::WarehouseError;
use thiserror::Error;
use time::Date;

use crate::domain::Symbol;
use crate::price_source::SourceError;
use crate::transaction::Direction;

/// Stable classification shared by every error type of the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSymbol,
    InvalidTransaction,
    InsufficientFunds,
    InsufficientShares,
    HoldingNotFound,
    PriceNotFound,
    MetadataUnavailable,
}

/// Construction-time validation errors exposed by `ferrofolio-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("transaction price {price} must be non-negative")]
    NegativePrice { price: f64 },
    #[error("transaction price must be finite")]
    NonFinitePrice,
    #[error("transaction quantity {qty} must be non-negative")]
    NegativeQuantity { qty: i64 },
    #[error("timestamp '{value}' lies in the future")]
    FutureTimestamp { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("invalid interval '{value}', expected one of 1d, 5d, 1wk, 1mo, 3mo")]
    InvalidInterval { value: String },
    #[error(
        "invalid period '{value}', expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max"
    )]
    InvalidPeriod { value: String },
    #[error("invalid direction '{value}', expected BUY or SELL")]
    InvalidDirection { value: String },
    #[error("invalid order type '{value}', expected MARKET or LIMIT")]
    InvalidOrderKind { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("holding quantity must be greater than zero")]
    EmptyHolding,
    #[error("portfolio name cannot be empty")]
    EmptyPortfolioName,

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,

    #[error("config field '{field}' {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::EmptySymbol | Self::SymbolTooLong { .. } | Self::SymbolInvalidChar { .. } => {
                Some(ErrorKind::InvalidSymbol)
            }
            Self::NegativePrice { .. }
            | Self::NonFinitePrice
            | Self::NegativeQuantity { .. }
            | Self::FutureTimestamp { .. } => Some(ErrorKind::InvalidTransaction),
            _ => None,
        }
    }
}

/// Ledger rule violations. A failed ledger operation leaves the portfolio untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient funds: order requires {required:.2}, {available:.2} available")]
    InsufficientFunds { required: f64, available: f64 },
    #[error("insufficient shares of {symbol}: requested {requested}, owned {owned}")]
    InsufficientShares {
        symbol: Symbol,
        requested: u64,
        owned: u64,
    },
    #[error("no holding for {symbol}")]
    HoldingNotFound { symbol: Symbol },
    #[error(
        "no price available for {symbol}{}",
        .date.map(|date| format!(" on {date}")).unwrap_or_default()
    )]
    PriceNotFound { symbol: Symbol, date: Option<Date> },
    #[error("expected a {expected} order, got {actual}")]
    DirectionMismatch {
        expected: Direction,
        actual: Direction,
    },
    #[error("order for {order} cannot be applied to stock {stock}")]
    SymbolMismatch { order: Symbol, stock: Symbol },
    #[error("position in {symbol} cannot grow by {requested} from {held} shares")]
    PositionOverflow {
        symbol: Symbol,
        held: u64,
        requested: u64,
    },
}

impl LedgerError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientShares { .. } => ErrorKind::InsufficientShares,
            Self::HoldingNotFound { .. } => ErrorKind::HoldingNotFound,
            Self::PriceNotFound { .. } => ErrorKind::PriceNotFound,
            Self::DirectionMismatch { .. }
            | Self::SymbolMismatch { .. }
            | Self::PositionOverflow { .. } => ErrorKind::InvalidTransaction,
        }
    }
}

/// Persistence failures surfaced through [`crate::PortfolioStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no company metadata stored for {symbol}")]
    MetadataUnavailable { symbol: Symbol },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("corrupt {table} record: {reason}")]
    CorruptRecord { table: &'static str, reason: String },

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, reason: impl ToString) -> Self {
        Self::CorruptRecord {
            table,
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::MetadataUnavailable { .. } => Some(ErrorKind::MetadataUnavailable),
            _ => None,
        }
    }
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no candidates left in the stock pool")]
    EmptyCandidatePool,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Validation(error) => error.kind(),
            Self::Ledger(error) => Some(error.kind()),
            Self::Store(error) => error.kind(),
            _ => None,
        }
    }
}

impl From<WarehouseError> for CoreError {
    fn from(value: WarehouseError) -> Self {
        Self::Store(StoreError::Warehouse(value))
    }
}
