//! Persistence contract and its two implementations.
//!
//! [`PortfolioStore`] is the narrow table-store interface the ledger and the
//! market-data layer talk to. [`MemoryStore`] keeps everything in process and
//! backs tests; the DuckDB [`Warehouse`] is the durable implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use ferrofolio_warehouse::{
    BarRecord, CompanyRecord, HoldingRecord, PortfolioRecord, TransactionRecord, ValueRecord,
    Warehouse,
};
use uuid::Uuid;

use crate::domain::{
    format_date, parse_date, Company, PricePoint, PriceSeries, Symbol, UtcDateTime,
};
use crate::error::StoreError;
use crate::portfolio::ValuePoint;
use crate::price_source::FetchMode;
use crate::transaction::{Direction, OrderKind, Transaction};

/// Stored price history and when it was downloaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSeries {
    pub series: PriceSeries,
    pub fetched_at: Option<UtcDateTime>,
}

/// Cash balances of a stored portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPortfolio {
    pub name: String,
    pub initial_cash: f64,
    pub free_cash: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHolding {
    pub symbol: Symbol,
    pub quantity: u64,
    pub acquired: UtcDateTime,
}

/// Everything persisted for one portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub portfolio: StoredPortfolio,
    pub holdings: Vec<StoredHolding>,
    pub transactions: Vec<Transaction>,
    pub values: Vec<ValuePoint>,
}

/// Table store queried by symbol and portfolio name.
pub trait PortfolioStore: Send + Sync {
    /// Metadata for `symbol`; [`StoreError::MetadataUnavailable`] when none is stored.
    fn get_company(&self, symbol: &Symbol) -> Result<Company, StoreError>;

    fn upsert_companies(&self, companies: &[Company]) -> Result<(), StoreError>;

    /// Stored history for `symbol`; empty when nothing was downloaded yet.
    fn get_price_series(&self, symbol: &Symbol) -> Result<StoredSeries, StoreError>;

    fn upsert_price_series(
        &self,
        symbol: &Symbol,
        points: &[PricePoint],
        mode: FetchMode,
        fetched_at: UtcDateTime,
        source: &str,
    ) -> Result<(), StoreError>;

    fn get_portfolio(&self, name: &str) -> Result<Option<StoredPortfolio>, StoreError>;

    fn get_holdings(&self, name: &str) -> Result<Vec<StoredHolding>, StoreError>;

    /// Transaction history of `name` in execution order.
    fn get_transactions(&self, name: &str) -> Result<Vec<Transaction>, StoreError>;

    /// Transactions of portfolio `name` that traded `symbol`.
    fn get_transactions_for_symbol(
        &self,
        name: &str,
        symbol: &Symbol,
    ) -> Result<Vec<Transaction>, StoreError>;

    fn get_value_history(&self, name: &str) -> Result<Vec<ValuePoint>, StoreError>;

    /// Idempotent upsert of cash, the holdings set, transactions and values.
    fn save_portfolio(&self, snapshot: &PortfolioSnapshot) -> Result<(), StoreError>;

    fn get_constituents(&self, index: &str) -> Result<Vec<String>, StoreError>;

    fn upsert_constituents(&self, index: &str, symbols: &[String]) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemoryTables {
    companies: HashMap<Symbol, Company>,
    series: HashMap<Symbol, StoredSeries>,
    portfolios: HashMap<String, PortfolioSnapshot>,
    constituents: HashMap<String, Vec<String>>,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl PortfolioStore for MemoryStore {
    fn get_company(&self, symbol: &Symbol) -> Result<Company, StoreError> {
        self.tables()?
            .companies
            .get(symbol)
            .cloned()
            .ok_or_else(|| StoreError::MetadataUnavailable {
                symbol: symbol.clone(),
            })
    }

    fn upsert_companies(&self, companies: &[Company]) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        for company in companies {
            tables
                .companies
                .insert(company.symbol.clone(), company.clone());
        }
        Ok(())
    }

    fn get_price_series(&self, symbol: &Symbol) -> Result<StoredSeries, StoreError> {
        Ok(self
            .tables()?
            .series
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    fn upsert_price_series(
        &self,
        symbol: &Symbol,
        points: &[PricePoint],
        mode: FetchMode,
        fetched_at: UtcDateTime,
        _source: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables.series.entry(symbol.clone()).or_default();
        if mode == FetchMode::Replace {
            stored.series = PriceSeries::new();
        }
        stored.series.merge(points.iter().copied());
        stored.fetched_at = Some(fetched_at);
        Ok(())
    }

    fn get_portfolio(&self, name: &str) -> Result<Option<StoredPortfolio>, StoreError> {
        Ok(self
            .tables()?
            .portfolios
            .get(name)
            .map(|snapshot| snapshot.portfolio.clone()))
    }

    fn get_holdings(&self, name: &str) -> Result<Vec<StoredHolding>, StoreError> {
        Ok(self
            .tables()?
            .portfolios
            .get(name)
            .map(|snapshot| snapshot.holdings.clone())
            .unwrap_or_default())
    }

    fn get_transactions(&self, name: &str) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .tables()?
            .portfolios
            .get(name)
            .map(|snapshot| snapshot.transactions.clone())
            .unwrap_or_default())
    }

    fn get_transactions_for_symbol(
        &self,
        name: &str,
        symbol: &Symbol,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .get_transactions(name)?
            .into_iter()
            .filter(|transaction| transaction.symbol() == symbol)
            .collect())
    }

    fn get_value_history(&self, name: &str) -> Result<Vec<ValuePoint>, StoreError> {
        Ok(self
            .tables()?
            .portfolios
            .get(name)
            .map(|snapshot| snapshot.values.clone())
            .unwrap_or_default())
    }

    fn save_portfolio(&self, snapshot: &PortfolioSnapshot) -> Result<(), StoreError> {
        self.tables()?
            .portfolios
            .insert(snapshot.portfolio.name.clone(), snapshot.clone());
        Ok(())
    }

    fn get_constituents(&self, index: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tables()?
            .constituents
            .get(index)
            .cloned()
            .unwrap_or_default())
    }

    fn upsert_constituents(&self, index: &str, symbols: &[String]) -> Result<(), StoreError> {
        self.tables()?
            .constituents
            .insert(index.to_string(), symbols.to_vec());
        Ok(())
    }
}

impl PortfolioStore for Warehouse {
    fn get_company(&self, symbol: &Symbol) -> Result<Company, StoreError> {
        let record = self
            .fetch_company(symbol.as_str())?
            .ok_or_else(|| StoreError::MetadataUnavailable {
                symbol: symbol.clone(),
            })?;
        company_from_record(record)
    }

    fn upsert_companies(&self, companies: &[Company]) -> Result<(), StoreError> {
        let rows: Vec<CompanyRecord> = companies.iter().map(company_to_record).collect();
        Ok(Warehouse::upsert_companies(self, &rows)?)
    }

    fn get_price_series(&self, symbol: &Symbol) -> Result<StoredSeries, StoreError> {
        let points = self
            .fetch_bars(symbol.as_str())?
            .into_iter()
            .map(point_from_record)
            .collect::<Result<Vec<_>, _>>()?;
        let fetched_at = self
            .fetch_price_sync(symbol.as_str())?
            .map(|value| {
                UtcDateTime::parse(&value).map_err(|e| StoreError::corrupt("price_sync", e))
            })
            .transpose()?;

        Ok(StoredSeries {
            series: PriceSeries::from_points(points),
            fetched_at,
        })
    }

    fn upsert_price_series(
        &self,
        symbol: &Symbol,
        points: &[PricePoint],
        mode: FetchMode,
        fetched_at: UtcDateTime,
        source: &str,
    ) -> Result<(), StoreError> {
        let rows: Vec<BarRecord> = points.iter().map(point_to_record).collect();
        self.upsert_bars(
            symbol.as_str(),
            source,
            &rows,
            &fetched_at.format_rfc3339(),
            mode == FetchMode::Replace,
        )?;
        Ok(())
    }

    fn get_portfolio(&self, name: &str) -> Result<Option<StoredPortfolio>, StoreError> {
        Ok(self.fetch_portfolio(name)?.map(|record| StoredPortfolio {
            name: record.name,
            initial_cash: record.initial_cash,
            free_cash: record.free_cash,
        }))
    }

    fn get_holdings(&self, name: &str) -> Result<Vec<StoredHolding>, StoreError> {
        self.fetch_holdings(name)?
            .into_iter()
            .map(|record| {
                Ok(StoredHolding {
                    symbol: Symbol::parse(&record.symbol)
                        .map_err(|e| StoreError::corrupt("holdings", e))?,
                    quantity: u64::try_from(record.qty_owned)
                        .map_err(|e| StoreError::corrupt("holdings", e))?,
                    acquired: UtcDateTime::parse(&record.date_purchased)
                        .map_err(|e| StoreError::corrupt("holdings", e))?,
                })
            })
            .collect()
    }

    fn get_transactions(&self, name: &str) -> Result<Vec<Transaction>, StoreError> {
        self.fetch_transactions(name)?
            .into_iter()
            .map(transaction_from_record)
            .collect()
    }

    fn get_transactions_for_symbol(
        &self,
        name: &str,
        symbol: &Symbol,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.fetch_transactions_for_symbol(name, symbol.as_str())?
            .into_iter()
            .map(transaction_from_record)
            .collect()
    }

    fn get_value_history(&self, name: &str) -> Result<Vec<ValuePoint>, StoreError> {
        self.fetch_values(name)?
            .into_iter()
            .map(|record| {
                Ok(ValuePoint {
                    timestamp: UtcDateTime::parse(&record.ts)
                        .map_err(|e| StoreError::corrupt("portfolio_values", e))?,
                    value: record.value,
                })
            })
            .collect()
    }

    fn save_portfolio(&self, snapshot: &PortfolioSnapshot) -> Result<(), StoreError> {
        let portfolio = PortfolioRecord {
            name: snapshot.portfolio.name.clone(),
            initial_cash: snapshot.portfolio.initial_cash,
            free_cash: snapshot.portfolio.free_cash,
        };
        let holdings = snapshot
            .holdings
            .iter()
            .map(|holding| {
                Ok(HoldingRecord {
                    symbol: holding.symbol.to_string(),
                    qty_owned: i64::try_from(holding.quantity)
                        .map_err(|e| StoreError::corrupt("holdings", e))?,
                    date_purchased: holding.acquired.format_rfc3339(),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        let transactions = snapshot
            .transactions
            .iter()
            .map(transaction_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        let values: Vec<ValueRecord> = snapshot
            .values
            .iter()
            .map(|point| ValueRecord {
                ts: point.timestamp.format_rfc3339(),
                value: point.value,
            })
            .collect();

        Warehouse::save_portfolio(self, &portfolio, &holdings, &transactions, &values)?;
        Ok(())
    }

    fn get_constituents(&self, index: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.fetch_constituents(index)?)
    }

    fn upsert_constituents(&self, index: &str, symbols: &[String]) -> Result<(), StoreError> {
        Ok(self.replace_constituents(index, symbols)?)
    }
}

fn company_to_record(company: &Company) -> CompanyRecord {
    CompanyRecord {
        symbol: company.symbol.to_string(),
        company_name: company.company_name.clone(),
        sector: company.sector.clone(),
        industry: company.industry.clone(),
        business_summary: company.business_summary.clone(),
        country: company.country.clone(),
        employee_count: company
            .employee_count
            .and_then(|count| i64::try_from(count).ok()),
        market_cap: company.market_cap,
        float_shares: company.float_shares,
        is_esg_populated: company.is_esg_populated,
    }
}

fn company_from_record(record: CompanyRecord) -> Result<Company, StoreError> {
    Ok(Company {
        symbol: Symbol::parse(&record.symbol).map_err(|e| StoreError::corrupt("companies", e))?,
        company_name: record.company_name,
        sector: record.sector,
        industry: record.industry,
        business_summary: record.business_summary,
        country: record.country,
        employee_count: record
            .employee_count
            .and_then(|count| u64::try_from(count).ok()),
        market_cap: record.market_cap,
        float_shares: record.float_shares,
        is_esg_populated: record.is_esg_populated,
    })
}

fn point_to_record(point: &PricePoint) -> BarRecord {
    BarRecord {
        date: format_date(point.date),
        open: point.open,
        high: point.high,
        low: point.low,
        close: point.close,
        volume: point.volume.and_then(|volume| i64::try_from(volume).ok()),
    }
}

fn point_from_record(record: BarRecord) -> Result<PricePoint, StoreError> {
    let date = parse_date(&record.date).map_err(|e| StoreError::corrupt("bars_1d", e))?;
    PricePoint::new(
        date,
        record.open,
        record.high,
        record.low,
        record.close,
        record.volume.and_then(|volume| u64::try_from(volume).ok()),
    )
    .map_err(|e| StoreError::corrupt("bars_1d", e))
}

fn transaction_to_record(transaction: &Transaction) -> Result<TransactionRecord, StoreError> {
    Ok(TransactionRecord {
        id: transaction.id().to_string(),
        ts: transaction.timestamp().format_rfc3339(),
        symbol: transaction.symbol().to_string(),
        direction: transaction.direction().as_str().to_string(),
        order_type: transaction.order_kind().as_str().to_string(),
        price: transaction.price(),
        qty: i64::try_from(transaction.quantity())
            .map_err(|e| StoreError::corrupt("transactions", e))?,
    })
}

fn transaction_from_record(record: TransactionRecord) -> Result<Transaction, StoreError> {
    let corrupt = |reason: String| StoreError::corrupt("transactions", reason);

    let id = Uuid::parse_str(&record.id).map_err(|e| corrupt(e.to_string()))?;
    let timestamp = UtcDateTime::parse(&record.ts).map_err(|e| corrupt(e.to_string()))?;
    let symbol = Symbol::parse(&record.symbol).map_err(|e| corrupt(e.to_string()))?;
    let direction = record
        .direction
        .parse::<Direction>()
        .map_err(|e| corrupt(e.to_string()))?;
    let order_kind = record
        .order_type
        .parse::<OrderKind>()
        .map_err(|e| corrupt(e.to_string()))?;

    Transaction::restore(
        id,
        timestamp,
        symbol,
        direction,
        order_kind,
        record.price,
        record.qty,
    )
    .map_err(|e| corrupt(e.to_string()))
}
