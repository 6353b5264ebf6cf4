//! Bulk download of market data into the store.
//!
//! Fetches run on a bounded `rayon` pool and share one [`Throttle`]; the
//! results are written to the store serially on the calling thread.

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;

use crate::domain::{Symbol, UtcDateTime};
use crate::error::CoreError;
use crate::price_source::{FetchMode, FetchRequest, PriceFetch, PriceSource, SourceError};
use crate::store::PortfolioStore;
use crate::throttling::Throttle;

pub const DEFAULT_DOWNLOAD_WORKERS: usize = 8;

/// Outcome of one [`MarketDataSync::sync`] run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Distinct symbols asked for.
    pub requested: usize,
    /// Symbols whose data reached the store.
    pub synced: usize,
    /// Symbols skipped, with the reason.
    pub failed: Vec<(Symbol, String)>,
}

pub struct MarketDataSync {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PortfolioStore>,
    workers: usize,
    throttle: Option<Throttle>,
}

impl MarketDataSync {
    pub fn new(source: Arc<dyn PriceSource>, store: Arc<dyn PortfolioStore>) -> Self {
        Self {
            source,
            store,
            workers: DEFAULT_DOWNLOAD_WORKERS,
            throttle: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Download full history (and metadata when asked) for every symbol
    /// and replace what the store holds for it.
    ///
    /// Per-symbol fetch failures are reported in [`SyncReport::failed`];
    /// a store failure aborts the run.
    pub fn sync(&self, symbols: &[Symbol], include_metadata: bool) -> Result<SyncReport, CoreError> {
        let mut seen = HashSet::new();
        let unique: Vec<&Symbol> = symbols
            .iter()
            .filter(|symbol| seen.insert(*symbol))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| CoreError::Config(format!("failed to start download pool: {e}")))?;

        log::info!(
            "syncing {} symbols from {} on {} workers",
            unique.len(),
            self.source.name(),
            self.workers
        );
        let fetched: Vec<(&Symbol, Result<PriceFetch, SourceError>)> = pool.install(|| {
            unique
                .par_iter()
                .map(|symbol| (*symbol, self.fetch_one(symbol, include_metadata)))
                .collect()
        });

        let mut report = SyncReport {
            requested: unique.len(),
            ..SyncReport::default()
        };
        for (symbol, outcome) in fetched {
            match self.store_one(symbol, outcome, include_metadata)? {
                Ok(()) => report.synced += 1,
                Err(reason) => {
                    log::warn!("skipping {symbol}: {reason}");
                    report.failed.push((symbol.clone(), reason));
                }
            }
        }

        log::info!(
            "sync finished: {} of {} symbols stored",
            report.synced,
            report.requested
        );
        Ok(report)
    }

    fn fetch_one(&self, symbol: &Symbol, include_metadata: bool) -> Result<PriceFetch, SourceError> {
        if let Some(throttle) = &self.throttle {
            throttle.acquire();
        }
        let request = FetchRequest::full(symbol.clone()).with_metadata(include_metadata);
        self.source.fetch(&request)
    }

    /// Outer error: the store failed. Inner error: this symbol is skipped.
    fn store_one(
        &self,
        symbol: &Symbol,
        outcome: Result<PriceFetch, SourceError>,
        include_metadata: bool,
    ) -> Result<Result<(), String>, CoreError> {
        let fetched = match outcome {
            Ok(fetched) => fetched,
            Err(error) => return Ok(Err(error.to_string())),
        };

        let company = fetched
            .metadata
            .filter(|company| !company.company_name.trim().is_empty());
        if include_metadata && company.is_none() {
            return Ok(Err(String::from("no company metadata")));
        }
        if fetched.series.is_empty() {
            return Ok(Err(String::from("no price history")));
        }

        if let Some(company) = company {
            self.store.upsert_companies(&[company])?;
        }
        self.store.upsert_price_series(
            symbol,
            &fetched.series,
            FetchMode::Replace,
            UtcDateTime::now(),
            self.source.name(),
        )?;
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Company, PricePoint};
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::date;

    struct CannedSource {
        responses: HashMap<String, Result<PriceFetch, SourceError>>,
        calls: AtomicUsize,
    }

    impl PriceSource for CannedSource {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn fetch(&self, request: &FetchRequest) -> Result<PriceFetch, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(request.symbol.as_str())
                .cloned()
                .unwrap_or_else(|| Err(SourceError::not_found("unknown symbol")))
        }
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    fn history(close: f64) -> Vec<PricePoint> {
        vec![
            PricePoint::flat(date!(2024 - 03 - 01), close).expect("valid point"),
            PricePoint::flat(date!(2024 - 03 - 04), close + 1.0).expect("valid point"),
        ]
    }

    fn fixture() -> (Arc<CannedSource>, Arc<MemoryStore>) {
        let responses = HashMap::from([
            (
                String::from("AAPL"),
                Ok(PriceFetch {
                    metadata: Some(
                        Company::named(symbol("AAPL"), "Apple Inc.")
                            .with_classification("Technology", "Consumer Electronics"),
                    ),
                    series: history(180.0),
                }),
            ),
            (
                String::from("NONAM"),
                Ok(PriceFetch {
                    metadata: Some(Company::named(symbol("NONAM"), "  ")),
                    series: history(10.0),
                }),
            ),
            (
                String::from("MSFT"),
                Err(SourceError::rate_limited("slow down")),
            ),
        ]);
        let source = Arc::new(CannedSource {
            responses,
            calls: AtomicUsize::new(0),
        });
        (source, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn stores_good_symbols_and_reports_the_rest() {
        let (source, store) = fixture();
        let sync = MarketDataSync::new(source.clone(), store.clone()).with_workers(2);

        let report = sync
            .sync(
                &[symbol("AAPL"), symbol("MSFT"), symbol("NONAM"), symbol("AAPL")],
                true,
            )
            .expect("store is healthy");

        assert_eq!(report.requested, 3);
        assert_eq!(report.synced, 1);
        let failed: Vec<&str> = report.failed.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(failed, vec!["MSFT", "NONAM"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        let company = store.get_company(&symbol("AAPL")).expect("stored");
        assert_eq!(company.sector, "Technology");
        let stored = store.get_price_series(&symbol("AAPL")).expect("stored");
        assert_eq!(stored.series.len(), 2);
        assert!(store.get_company(&symbol("NONAM")).is_err());
    }

    #[test]
    fn without_metadata_nameless_results_still_store_prices() {
        let (source, store) = fixture();
        let sync = MarketDataSync::new(source, store.clone())
            .with_workers(1)
            .with_throttle(Throttle::per_minute(600));

        let report = sync.sync(&[symbol("NONAM")], false).expect("store is healthy");

        assert_eq!(report.synced, 1);
        assert!(report.failed.is_empty());
        let stored = store.get_price_series(&symbol("NONAM")).expect("stored");
        assert_eq!(stored.series.latest().map(|p| p.close), Some(11.0));
        assert!(stored.fetched_at.is_some());
    }
}
