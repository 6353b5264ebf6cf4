//! # Ferrofolio Core
//!
//! Portfolio ledger and valuation engine for the ferrofolio tracker.
//!
//! ## Overview
//!
//! - **Ledger**: [`Portfolio`] buys and sells [`Transaction`]s against cash,
//!   keeps [`Holding`]s and a value history
//! - **Pricing**: [`Stock`] serves prices from a date-keyed series and
//!   refreshes itself from a [`PriceSource`] when stale
//! - **Builder**: [`PortfolioBuilder`] draws random candidates from an index
//!   universe, optionally filtered by sector or industry
//! - **Collaborators**: [`PortfolioStore`] for persistence, [`PriceSource`]
//!   for market data, [`UniverseSource`] for index constituents
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo Finance price source |
//! | [`builder`] | Random candidate selection and purchase |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`config`] | Runtime settings |
//! | [`domain`] | Symbols, timestamps, price series, company metadata |
//! | [`error`] | Error types |
//! | [`format`] | Currency and date rendering |
//! | [`http_client`] | Blocking HTTP transport |
//! | [`metrics`] | Returns and volatility with memoization |
//! | [`portfolio`] | The ledger |
//! | [`price_source`] | Market-data provider contract |
//! | [`stock`] | Priced security with lazy refresh |
//! | [`stock_cache`] | Shared stocks built from the store |
//! | [`store`] | Persistence contract, memory and DuckDB stores |
//! | [`sync`] | Parallel bulk download |
//! | [`throttling`] | Request budget |
//! | [`universe`] | Index constituent sources |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrofolio_core::{MemoryStore, Portfolio, StockCache, Symbol, Transaction, UtcDateTime};
//!
//! let stocks = StockCache::new(Arc::new(MemoryStore::new()));
//! let aapl = stocks.get(&Symbol::parse("AAPL")?)?;
//!
//! let mut portfolio = Portfolio::new("growth", 10_000.0)?;
//! let order = Transaction::market_buy(UtcDateTime::now(), aapl.symbol().clone(), 150.0, 10)?;
//! portfolio.purchase(order, aapl)?;
//! ```

pub mod adapters;
pub mod builder;
pub mod circuit_breaker;
pub mod config;
pub mod domain;
pub mod error;
pub mod format;
pub mod holding;
pub mod http_client;
pub mod metrics;
pub mod portfolio;
pub mod price_source;
pub mod stock;
pub mod stock_cache;
pub mod store;
pub mod sync;
pub mod throttling;
pub mod transaction;
pub mod universe;

pub use adapters::YahooAdapter;
pub use builder::PortfolioBuilder;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::FolioConfig;
pub use domain::{
    format_date, normalize_symbol, parse_date, Company, Interval, Period, PricePoint,
    PriceSeries, Symbol, SymbolNormalizer, UtcDateTime, DEFAULT_MAX_SYMBOL_LEN,
};
pub use error::{CoreError, ErrorKind, LedgerError, StoreError, ValidationError};
pub use ferrofolio_warehouse::{Warehouse, WarehouseConfig, WarehouseError};
pub use holding::Holding;
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use metrics::{Metric, MetricCache, MetricKey, MetricValue, ReturnInterval};
pub use portfolio::{Portfolio, ValuePoint};
pub use price_source::{
    FetchMode, FetchRequest, PriceFetch, PriceSource, SourceError, SourceErrorKind,
};
pub use stock::{Stock, DEFAULT_STALENESS};
pub use stock_cache::StockCache;
pub use store::{
    MemoryStore, PortfolioSnapshot, PortfolioStore, StoredHolding, StoredPortfolio, StoredSeries,
};
pub use sync::{MarketDataSync, SyncReport};
pub use throttling::Throttle;
pub use transaction::{Direction, OrderKind, Transaction};
pub use universe::{CsvUniverse, StaticUniverse, StoreUniverse, UniverseSource, SP500};
