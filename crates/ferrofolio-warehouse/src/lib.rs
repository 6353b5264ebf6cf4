//! # Ferrofolio Warehouse
//!
//! DuckDB-backed table store for Ferrofolio.
//!
//! ## Overview
//!
//! The warehouse persists everything the tracker needs between sessions:
//! company metadata, daily price history, index constituent lists, and the
//! state of each named portfolio (cash, holdings, transaction and value
//! history). Records here are plain, string-typed rows; validation into domain
//! types happens in `ferrofolio-core`.
//!
//! - **Parameterized SQL**: every user-provided value is bound, never interpolated
//! - **Atomic writes**: multi-row writes run inside one transaction
//! - **Idempotent upserts**: saving the same state twice leaves one copy
//! - **Pooled connections**: returned to the pool on drop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrofolio_warehouse::{PortfolioRecord, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!
//!     let record = PortfolioRecord {
//!         name: "retirement".to_string(),
//!         initial_cash: 100_000.0,
//!         free_cash: 100_000.0,
//!     };
//!     warehouse.save_portfolio(&record, &[], &[], &[])?;
//!
//!     let loaded = warehouse.fetch_portfolio("retirement")?;
//!     assert!(loaded.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `companies` | Company metadata by symbol |
//! | `bars_1d` | Daily OHLCV bars |
//! | `price_sync` | Last successful price download per symbol |
//! | `index_constituents` | Ordered symbol lists per index |
//! | `portfolios` | Cash balances per portfolio |
//! | `holdings` | Open positions per portfolio |
//! | `transactions` | Executed orders per portfolio |
//! | `portfolio_values` | Value snapshots per portfolio |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use thiserror::Error;

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A write was refused before reaching the database.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for ferrofolio data.
    pub ferrofolio_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let ferrofolio_home = resolve_ferrofolio_home();
        let db_path = ferrofolio_home.join("data").join("ferrofolio.duckdb");
        Self {
            ferrofolio_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Company metadata row.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub symbol: String,
    pub company_name: String,
    pub sector: String,
    pub industry: String,
    pub business_summary: String,
    pub country: String,
    pub employee_count: Option<i64>,
    pub market_cap: Option<f64>,
    pub float_shares: Option<f64>,
    pub is_esg_populated: Option<bool>,
}

/// Daily OHLCV row. `date` is `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRecord {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<i64>,
}

/// Cash balances of a named portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRecord {
    pub name: String,
    pub initial_cash: f64,
    pub free_cash: f64,
}

/// Open position row. `date_purchased` is RFC3339.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingRecord {
    pub symbol: String,
    pub qty_owned: i64,
    pub date_purchased: String,
}

/// Executed order row. `ts` is RFC3339.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: String,
    pub ts: String,
    pub symbol: String,
    pub direction: String,
    pub order_type: String,
    pub price: f64,
    pub qty: i64,
}

/// Portfolio value snapshot row. `ts` is RFC3339.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    pub ts: String,
    pub value: f64,
}

/// The main warehouse interface.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        log::info!("opening warehouse at {}", config.db_path.display());
        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    // ------------------------------------------------------------------
    // Companies
    // ------------------------------------------------------------------

    /// Insert or replace company metadata rows.
    pub fn upsert_companies(&self, rows: &[CompanyRecord]) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 10] = [
                    &row.symbol,
                    &row.company_name,
                    &row.sector,
                    &row.industry,
                    &row.business_summary,
                    &row.country,
                    &row.employee_count,
                    &row.market_cap,
                    &row.float_shares,
                    &row.is_esg_populated,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO companies \
                     (symbol, company_name, sector, industry, business_summary, country, \
                      employee_count, market_cap, float_shares, is_esg_populated, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)?;
        log::debug!("upserted {} company rows", rows.len());
        Ok(())
    }

    /// Fetch company metadata for a single symbol.
    pub fn fetch_company(&self, symbol: &str) -> Result<Option<CompanyRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT symbol, company_name, sector, industry, business_summary, country, \
                    employee_count, market_cap, float_shares, is_esg_populated \
             FROM companies WHERE symbol = ?",
        )?;
        let params: [&dyn ToSql; 1] = [&symbol];
        let mut rows = statement.query_map(params.as_slice(), |row| {
            Ok(CompanyRecord {
                symbol: row.get(0)?,
                company_name: row.get(1)?,
                sector: row.get(2)?,
                industry: row.get(3)?,
                business_summary: row.get(4)?,
                country: row.get(5)?,
                employee_count: row.get(6)?,
                market_cap: row.get(7)?,
                float_shares: row.get(8)?,
                is_esg_populated: row.get(9)?,
            })
        })?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Price history
    // ------------------------------------------------------------------

    /// Store daily bars for `symbol` and record when they were fetched.
    ///
    /// With `replace` set, existing bars for the symbol are removed first;
    /// otherwise rows are merged by date.
    pub fn upsert_bars(
        &self,
        symbol: &str,
        source: &str,
        rows: &[BarRecord],
        fetched_at: &str,
        replace: bool,
    ) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            if replace {
                let params: [&dyn ToSql; 1] = [&symbol];
                connection.execute("DELETE FROM bars_1d WHERE symbol = ?", params.as_slice())?;
            }

            for row in rows {
                let params: [&dyn ToSql; 8] = [
                    &symbol,
                    &row.date,
                    &row.open,
                    &row.high,
                    &row.low,
                    &row.close,
                    &row.volume,
                    &source,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO bars_1d \
                     (symbol, date, open, high, low, close, volume, source, updated_at) \
                     VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }

            let params: [&dyn ToSql; 3] = [&symbol, &fetched_at, &source];
            connection.execute(
                "INSERT OR REPLACE INTO price_sync (symbol, fetched_at, source, updated_at) \
                 VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
                params.as_slice(),
            )?;
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// Fetch all daily bars for `symbol`, oldest first.
    pub fn fetch_bars(&self, symbol: &str) -> Result<Vec<BarRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT CAST(date AS VARCHAR), open, high, low, close, volume \
             FROM bars_1d WHERE symbol = ? ORDER BY date",
        )?;
        let params: [&dyn ToSql; 1] = [&symbol];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(BarRecord {
                date: row.get(0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                volume: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// When the bars for `symbol` were last fetched, if ever.
    pub fn fetch_price_sync(&self, symbol: &str) -> Result<Option<String>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement =
            connection.prepare("SELECT fetched_at FROM price_sync WHERE symbol = ?")?;
        let params: [&dyn ToSql; 1] = [&symbol];
        let mut rows = statement.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Index constituents
    // ------------------------------------------------------------------

    /// Replace the stored constituent list of `index_id`, keeping input order.
    pub fn replace_constituents(
        &self,
        index_id: &str,
        symbols: &[String],
    ) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let params: [&dyn ToSql; 1] = [&index_id];
            connection.execute(
                "DELETE FROM index_constituents WHERE index_id = ?",
                params.as_slice(),
            )?;

            for (position, symbol) in symbols.iter().enumerate() {
                let position = position as i64;
                let params: [&dyn ToSql; 3] = [&index_id, &position, symbol];
                connection.execute(
                    "INSERT OR REPLACE INTO index_constituents \
                     (index_id, position, symbol, updated_at) \
                     VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    pub fn fetch_constituents(&self, index_id: &str) -> Result<Vec<String>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT symbol FROM index_constituents WHERE index_id = ? ORDER BY position",
        )?;
        let params: [&dyn ToSql; 1] = [&index_id];
        let rows = statement.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ------------------------------------------------------------------
    // Portfolios
    // ------------------------------------------------------------------

    /// Persist the full state of one portfolio in a single transaction.
    ///
    /// Holdings, transactions and value snapshots of the portfolio are
    /// replaced as a set, so liquidated positions disappear and repeated
    /// saves of the same state are idempotent. History order is kept in `seq`.
    pub fn save_portfolio(
        &self,
        portfolio: &PortfolioRecord,
        holdings: &[HoldingRecord],
        transactions: &[TransactionRecord],
        values: &[ValueRecord],
    ) -> Result<(), WarehouseError> {
        if portfolio.name.trim().is_empty() {
            return Err(WarehouseError::InvalidData(String::from(
                "portfolio name must not be empty",
            )));
        }
        if let Some(holding) = holdings.iter().find(|holding| holding.qty_owned <= 0) {
            return Err(WarehouseError::InvalidData(format!(
                "holding {} has non-positive quantity {}",
                holding.symbol, holding.qty_owned
            )));
        }

        let name = portfolio.name.as_str();
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let params: [&dyn ToSql; 3] =
                [&name, &portfolio.initial_cash, &portfolio.free_cash];
            connection.execute(
                "INSERT OR REPLACE INTO portfolios (name, initial_cash, free_cash, updated_at) \
                 VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
                params.as_slice(),
            )?;

            let params: [&dyn ToSql; 1] = [&name];
            for table in ["holdings", "transactions", "portfolio_values"] {
                connection.execute(
                    &format!("DELETE FROM {table} WHERE portfolio = ?"),
                    params.as_slice(),
                )?;
            }
            for holding in holdings {
                let params: [&dyn ToSql; 4] = [
                    &name,
                    &holding.symbol,
                    &holding.qty_owned,
                    &holding.date_purchased,
                ];
                connection.execute(
                    "INSERT INTO holdings \
                     (portfolio, symbol, qty_owned, date_purchased, updated_at) \
                     VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }

            for (seq, transaction) in transactions.iter().enumerate() {
                let seq = seq as i64;
                let params: [&dyn ToSql; 9] = [
                    &transaction.id,
                    &name,
                    &seq,
                    &transaction.ts,
                    &transaction.symbol,
                    &transaction.direction,
                    &transaction.order_type,
                    &transaction.price,
                    &transaction.qty,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO transactions \
                     (id, portfolio, seq, ts, symbol, direction, order_type, price, qty) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }

            for (seq, value) in values.iter().enumerate() {
                let seq = seq as i64;
                let params: [&dyn ToSql; 4] = [&name, &seq, &value.ts, &value.value];
                connection.execute(
                    "INSERT OR REPLACE INTO portfolio_values (portfolio, seq, ts, value) \
                     VALUES (?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)?;
        log::info!(
            "saved portfolio {name}: {} holdings, {} transactions, {} values",
            holdings.len(),
            transactions.len(),
            values.len()
        );
        Ok(())
    }

    pub fn fetch_portfolio(&self, name: &str) -> Result<Option<PortfolioRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection
            .prepare("SELECT name, initial_cash, free_cash FROM portfolios WHERE name = ?")?;
        let params: [&dyn ToSql; 1] = [&name];
        let mut rows = statement.query_map(params.as_slice(), |row| {
            Ok(PortfolioRecord {
                name: row.get(0)?,
                initial_cash: row.get(1)?,
                free_cash: row.get(2)?,
            })
        })?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn fetch_holdings(&self, portfolio: &str) -> Result<Vec<HoldingRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT symbol, qty_owned, date_purchased FROM holdings \
             WHERE portfolio = ? ORDER BY symbol",
        )?;
        let params: [&dyn ToSql; 1] = [&portfolio];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(HoldingRecord {
                symbol: row.get(0)?,
                qty_owned: row.get(1)?,
                date_purchased: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fetch the transaction history of `portfolio` in execution order.
    pub fn fetch_transactions(
        &self,
        portfolio: &str,
    ) -> Result<Vec<TransactionRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT id, ts, symbol, direction, order_type, price, qty FROM transactions \
             WHERE portfolio = ? ORDER BY seq",
        )?;
        let params: [&dyn ToSql; 1] = [&portfolio];
        let rows = statement.query_map(params.as_slice(), read_transaction)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fetch the transactions of `portfolio` that traded `symbol`.
    pub fn fetch_transactions_for_symbol(
        &self,
        portfolio: &str,
        symbol: &str,
    ) -> Result<Vec<TransactionRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT id, ts, symbol, direction, order_type, price, qty FROM transactions \
             WHERE portfolio = ? AND symbol = ? ORDER BY seq",
        )?;
        let params: [&dyn ToSql; 2] = [&portfolio, &symbol];
        let rows = statement.query_map(params.as_slice(), read_transaction)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fetch the value history of `portfolio` in snapshot order.
    pub fn fetch_values(&self, portfolio: &str) -> Result<Vec<ValueRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT ts, value FROM portfolio_values WHERE portfolio = ? ORDER BY seq",
        )?;
        let params: [&dyn ToSql; 1] = [&portfolio];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(ValueRecord {
                ts: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn read_transaction(row: &::duckdb::Row<'_>) -> Result<TransactionRecord, ::duckdb::Error> {
    Ok(TransactionRecord {
        id: row.get(0)?,
        ts: row.get(1)?,
        symbol: row.get(2)?,
        direction: row.get(3)?,
        order_type: row.get(4)?,
        price: row.get(5)?,
        qty: row.get(6)?,
    })
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the ferrofolio home directory from environment or default.
fn resolve_ferrofolio_home() -> PathBuf {
    if let Some(path) = env::var_os("FERROFOLIO_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".ferrofolio");
    }

    PathBuf::from(".ferrofolio")
}
