use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::domain::{Company, SymbolNormalizer, UtcDateTime};
use crate::error::{CoreError, StoreError};
use crate::portfolio::Portfolio;
use crate::stock::Stock;
use crate::stock_cache::StockCache;
use crate::transaction::Transaction;
use crate::universe::UniverseSource;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PoolFilter {
    Sector(String),
    Industry(String),
}

impl PoolFilter {
    fn matches(&self, company: &Company) -> bool {
        match self {
            Self::Sector(sector) => company.sector == *sector,
            Self::Industry(industry) => company.industry == *industry,
        }
    }
}

/// Picks random candidates from an index universe and buys them into a
/// target portfolio.
///
/// Every stock in the pool has company metadata; constituents that fail
/// symbol normalization, have nothing stored, or whose lookup fails in the
/// store are dropped at construction.
pub struct PortfolioBuilder {
    portfolio: Portfolio,
    pool: Vec<Arc<Stock>>,
    filter: Option<PoolFilter>,
    active: Vec<usize>,
    rng: fastrand::Rng,
}

impl PortfolioBuilder {
    pub fn new(
        portfolio: Portfolio,
        universe: &dyn UniverseSource,
        index: &str,
        stocks: &StockCache,
    ) -> Result<Self, CoreError> {
        Self::with_normalizer(portfolio, universe, index, stocks, SymbolNormalizer::default())
    }

    pub fn with_normalizer(
        portfolio: Portfolio,
        universe: &dyn UniverseSource,
        index: &str,
        stocks: &StockCache,
        normalizer: SymbolNormalizer,
    ) -> Result<Self, CoreError> {
        let raw_symbols = universe.list_constituents(index)?;
        let listed = raw_symbols.len();

        let mut seen = HashSet::new();
        let mut pool = Vec::new();
        for raw in raw_symbols {
            let symbol = match normalizer.normalize(&raw) {
                Ok(symbol) => symbol,
                Err(error) => {
                    log::warn!("dropping constituent '{raw}' of {index}: {error}");
                    continue;
                }
            };
            if !seen.insert(symbol.clone()) {
                continue;
            }

            match stocks.get_listed(&symbol) {
                Ok(stock) => pool.push(stock),
                Err(error @ StoreError::MetadataUnavailable { .. }) => {
                    log::warn!("dropping constituent {symbol} of {index}: {error}");
                }
                Err(error) => {
                    log::error!("metadata lookup for {symbol} of {index} failed: {error}");
                }
            }
        }

        log::info!(
            "candidate pool for {index}: {} of {listed} constituents usable",
            pool.len()
        );
        let active = (0..pool.len()).collect();
        Ok(Self {
            portfolio,
            pool,
            filter: None,
            active,
            rng: fastrand::Rng::new(),
        })
    }

    /// Use a deterministic random sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Size of the pool candidates are currently drawn from.
    pub fn active_size(&self) -> usize {
        self.active.len()
    }

    /// Uniformly random stock from the filtered pool, or the full pool when
    /// no filter is set.
    pub fn fetch_candidate(&mut self) -> Result<Arc<Stock>, CoreError> {
        if self.active.is_empty() {
            return Err(CoreError::EmptyCandidatePool);
        }

        let index = self.active[self.rng.usize(..self.active.len())];
        Ok(Arc::clone(&self.pool[index]))
    }

    /// Restrict candidates to an exact, case-sensitive sector. Returns the
    /// number of matching stocks.
    pub fn filter_by_sector(&mut self, sector: &str) -> usize {
        self.apply_filter(PoolFilter::Sector(sector.to_string()))
    }

    /// Restrict candidates to an exact, case-sensitive industry. Returns the
    /// number of matching stocks.
    pub fn filter_by_industry(&mut self, industry: &str) -> usize {
        self.apply_filter(PoolFilter::Industry(industry.to_string()))
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    pub fn drop_filter(&mut self) {
        self.filter = None;
        self.active = (0..self.pool.len()).collect();
    }

    /// Distinct sectors present in the full pool.
    pub fn sectors(&self) -> Vec<String> {
        self.distinct(|company| &company.sector)
    }

    /// Distinct industries present in the full pool.
    pub fn industries(&self) -> Vec<String> {
        self.distinct(|company| &company.industry)
    }

    /// Buy `quantity` shares of `stock` at its latest price into the
    /// target portfolio.
    pub fn offer(&mut self, stock: Arc<Stock>, quantity: i64) -> Result<Transaction, CoreError> {
        let price = stock.latest_price()?;
        let order =
            Transaction::market_buy(UtcDateTime::now(), stock.symbol().clone(), price, quantity)?;
        self.portfolio.purchase(order.clone(), stock)?;
        Ok(order)
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn portfolio_mut(&mut self) -> &mut Portfolio {
        &mut self.portfolio
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }

    fn apply_filter(&mut self, filter: PoolFilter) -> usize {
        self.active = self
            .pool
            .iter()
            .enumerate()
            .filter(|(_, stock)| stock.company().is_some_and(|company| filter.matches(company)))
            .map(|(index, _)| index)
            .collect();
        log::debug!("filter {filter:?} leaves {} candidates", self.active.len());
        self.filter = Some(filter);
        self.active.len()
    }

    fn distinct(&self, field: impl Fn(&Company) -> &String) -> Vec<String> {
        self.pool
            .iter()
            .filter_map(|stock| stock.company())
            .map(|company| field(company).clone())
            .filter(|value| !value.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
