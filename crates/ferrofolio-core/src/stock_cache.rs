use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use time::Duration;

use crate::domain::{Company, Symbol};
use crate::error::{CoreError, StoreError};
use crate::price_source::{FetchMode, PriceSource};
use crate::stock::{Stock, DEFAULT_STALENESS};
use crate::store::PortfolioStore;

/// Identity map of [`Stock`]s built from the store.
///
/// Every caller asking for the same symbol gets the same `Arc<Stock>`, so a
/// refresh through one holding is visible to all of them.
pub struct StockCache {
    store: Arc<dyn PortfolioStore>,
    source: Option<Arc<dyn PriceSource>>,
    staleness: Duration,
    stocks: Mutex<HashMap<Symbol, Arc<Stock>>>,
}

impl StockCache {
    pub fn new(store: Arc<dyn PortfolioStore>) -> Self {
        Self {
            store,
            source: None,
            staleness: DEFAULT_STALENESS,
            stocks: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a price source to every stock built from now on.
    pub fn with_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn store(&self) -> &Arc<dyn PortfolioStore> {
        &self.store
    }

    /// The shared stock for `symbol`. Missing metadata yields a stock
    /// without a company; a cached stock without one looks it up again and
    /// picks up metadata stored since.
    pub fn get(&self, symbol: &Symbol) -> Result<Arc<Stock>, StoreError> {
        let cached = self.lock()?.get(symbol).cloned();
        if let Some(stock) = cached {
            if stock.company().is_none() {
                if let Some(company) = self.lookup_company(symbol)? {
                    stock.attach_company(company);
                }
            }
            return Ok(stock);
        }

        let company = self.lookup_company(symbol)?;
        let stored = self.store.get_price_series(symbol)?;

        let mut stock = Stock::new(symbol.clone(), company)
            .with_series(stored.series, stored.fetched_at)
            .with_staleness(self.staleness);
        if let Some(source) = &self.source {
            stock = stock.with_source(Arc::clone(source));
        }

        let mut stocks = self.lock()?;
        let shared = stocks
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(stock));
        Ok(Arc::clone(shared))
    }

    /// Like [`StockCache::get`] but requires stored company metadata.
    pub fn get_listed(&self, symbol: &Symbol) -> Result<Arc<Stock>, StoreError> {
        let stock = self.get(symbol)?;
        if stock.company().is_none() {
            return Err(StoreError::MetadataUnavailable {
                symbol: symbol.clone(),
            });
        }
        Ok(stock)
    }

    /// Refresh `stock` from its source and write the result to the store.
    pub fn refresh(&self, stock: &Stock) -> Result<usize, CoreError> {
        let received = stock.refresh()?;
        self.persist(stock)?;
        Ok(received)
    }

    /// Write the full in-memory series of `stock` to the store.
    pub fn persist(&self, stock: &Stock) -> Result<(), StoreError> {
        let Some(fetched_at) = stock.fetched_at() else {
            return Ok(());
        };

        let points: Vec<_> = stock.series().iter().copied().collect();
        let source = self.source.as_ref().map_or("unknown", |source| source.name());
        self.store.upsert_price_series(
            stock.symbol(),
            &points,
            FetchMode::Replace,
            fetched_at,
            source,
        )
    }

    /// Persist every cached stock that has been fetched at least once.
    pub fn persist_all(&self) -> Result<usize, StoreError> {
        let stocks: Vec<Arc<Stock>> = self.lock()?.values().cloned().collect();
        let mut written = 0;
        for stock in stocks.iter().filter(|stock| stock.fetched_at().is_some()) {
            self.persist(stock)?;
            written += 1;
        }
        log::debug!("persisted {written} stock series");
        Ok(written)
    }

    pub fn len(&self) -> usize {
        self.stocks.lock().map(|stocks| stocks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup_company(&self, symbol: &Symbol) -> Result<Option<Company>, StoreError> {
        match self.store.get_company(symbol) {
            Ok(company) => Ok(Some(company)),
            Err(StoreError::MetadataUnavailable { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Symbol, Arc<Stock>>>, StoreError> {
        self.stocks.lock().map_err(|_| StoreError::Poisoned)
    }
}
