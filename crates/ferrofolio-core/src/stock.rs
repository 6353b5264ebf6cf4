use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, RwLockReadGuard};

use time::{Date, Duration};

use crate::domain::{Company, PriceSeries, Symbol, UtcDateTime};
use crate::error::LedgerError;
use crate::format;
use crate::metrics::{
    pct_change, sample_std_dev, Metric, MetricCache, MetricKey, MetricValue, ReturnInterval,
};
use crate::price_source::{FetchMode, FetchRequest, PriceSource, SourceError};

/// Default maximum age of local price data before a refresh is attempted.
pub const DEFAULT_STALENESS: Duration = Duration::days(1);

#[derive(Debug, Default)]
struct SeriesState {
    series: PriceSeries,
    fetched_at: Option<UtcDateTime>,
}

/// A tradable equity with its locally known price history.
///
/// Shared between holdings and the builder as `Arc<Stock>`. The symbol never
/// changes and company metadata is set at most once; the series is replaced
/// wholesale by [`Stock::refresh`].
pub struct Stock {
    symbol: Symbol,
    company: OnceLock<Company>,
    state: RwLock<SeriesState>,
    metrics: Mutex<MetricCache>,
    source: Option<Arc<dyn PriceSource>>,
    staleness: Duration,
}

impl Stock {
    pub fn new(symbol: Symbol, company: Option<Company>) -> Self {
        let slot = OnceLock::new();
        if let Some(company) = company {
            let _ = slot.set(company);
        }
        Self {
            symbol,
            company: slot,
            state: RwLock::new(SeriesState::default()),
            metrics: Mutex::new(MetricCache::default()),
            source: None,
            staleness: DEFAULT_STALENESS,
        }
    }

    pub fn with_series(self, series: PriceSeries, fetched_at: Option<UtcDateTime>) -> Self {
        {
            let mut state = self
                .state
                .write()
                .expect("stock series lock is not poisoned");
            state.series = series;
            state.fetched_at = fetched_at;
        }
        self
    }

    pub fn with_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn company(&self) -> Option<&Company> {
        self.company.get()
    }

    /// Attach metadata that arrived after construction. Returns `false` when
    /// the stock already had a company.
    pub fn attach_company(&self, company: Company) -> bool {
        self.company.set(company).is_ok()
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    pub fn fetched_at(&self) -> Option<UtcDateTime> {
        self.read_state().fetched_at
    }

    /// Snapshot of the current price history.
    pub fn series(&self) -> PriceSeries {
        self.read_state().series.clone()
    }

    /// Whether the local data is older than the staleness threshold at `now`.
    /// Data that was never fetched is always stale.
    pub fn is_stale_at(&self, now: UtcDateTime) -> bool {
        match self.read_state().fetched_at {
            Some(fetched_at) => fetched_at.until(now) > self.staleness,
            None => true,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(UtcDateTime::now())
    }

    /// Closing price on `on_date`, or the latest close when `None`.
    ///
    /// The latest-price path refreshes stale data first when a source is
    /// attached. A failed refresh is logged and the cached price is served.
    pub fn get_price(&self, on_date: Option<Date>) -> Result<f64, LedgerError> {
        let Some(date) = on_date else {
            if self.source.is_some() && self.is_stale() {
                if let Err(error) = self.refresh() {
                    log::warn!(
                        "refresh of {} failed, serving cached price: {error}",
                        self.symbol
                    );
                }
            }

            return self
                .read_state()
                .series
                .latest()
                .map(|point| point.close)
                .ok_or_else(|| LedgerError::PriceNotFound {
                    symbol: self.symbol.clone(),
                    date: None,
                });
        };

        self.read_state()
            .series
            .on(date)
            .map(|point| point.close)
            .ok_or_else(|| LedgerError::PriceNotFound {
                symbol: self.symbol.clone(),
                date: Some(date),
            })
    }

    pub fn latest_price(&self) -> Result<f64, LedgerError> {
        self.get_price(None)
    }

    /// Pull new history from the attached source and swap it in.
    ///
    /// An empty series triggers a full download; otherwise only days after
    /// the last known date are requested and merged. On error the series is
    /// left as it was. Returns the number of points received.
    pub fn refresh(&self) -> Result<usize, SourceError> {
        let Some(source) = self.source.as_ref() else {
            return Err(SourceError::unavailable(format!(
                "no price source attached to {}",
                self.symbol
            )));
        };

        let now = UtcDateTime::now();
        let last_date = self.read_state().series.last_date();
        let request = match last_date {
            None => FetchRequest::full(self.symbol.clone()),
            Some(last) => match last.next_day() {
                Some(start) if start <= now.date() => {
                    FetchRequest::since(self.symbol.clone(), start)
                }
                _ => {
                    log::debug!("{} is already current through {last}", self.symbol);
                    self.write_fetched_at(now);
                    return Ok(0);
                }
            },
        };
        let request = request.validate_as_of(now.date())?;

        log::debug!(
            "refreshing {} ({:?} from {:?})",
            self.symbol,
            request.mode,
            request.start
        );
        let fetched = source.fetch(&request)?;
        let received = fetched.series.len();

        let mut state = self
            .state
            .write()
            .expect("stock series lock is not poisoned");
        let next = match request.mode {
            FetchMode::Replace => PriceSeries::from_points(fetched.series),
            FetchMode::Append => {
                let mut merged = state.series.clone();
                merged.merge(fetched.series);
                merged
            }
        };
        state.series = next;
        state.fetched_at = Some(now);
        drop(state);

        log::info!("refreshed {}: {received} new points", self.symbol);
        Ok(received)
    }

    /// Fractional returns over `interval`, memoized until invalidated.
    pub fn returns(&self, interval: ReturnInterval) -> Arc<[f64]> {
        let key = MetricKey::new(Metric::Returns, interval);
        let value = self.lock_metrics().get_or_compute(key, || {
            let closes = self.read_state().series.closes();
            MetricValue::Series(pct_change(&closes, interval.trading_days()).into())
        });

        match value {
            MetricValue::Series(values) => values,
            MetricValue::Scalar(_) => Arc::from(Vec::new()),
        }
    }

    /// Sample standard deviation of [`Stock::returns`], memoized until invalidated.
    pub fn std_dev(&self, interval: ReturnInterval) -> Option<f64> {
        let returns = self.returns(interval);
        let key = MetricKey::new(Metric::StdDev, interval);
        let value = self
            .lock_metrics()
            .get_or_compute(key, || MetricValue::Scalar(sample_std_dev(&returns)));

        match value {
            MetricValue::Scalar(value) => value,
            MetricValue::Series(_) => None,
        }
    }

    pub fn invalidate_metrics(&self) {
        self.lock_metrics().invalidate();
    }

    pub fn cached_metrics(&self) -> usize {
        self.lock_metrics().len()
    }

    fn write_fetched_at(&self, at: UtcDateTime) {
        self.state
            .write()
            .expect("stock series lock is not poisoned")
            .fetched_at = Some(at);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SeriesState> {
        self.state.read().expect("stock series lock is not poisoned")
    }

    fn lock_metrics(&self) -> MutexGuard<'_, MetricCache> {
        self.metrics
            .lock()
            .expect("stock metric cache lock is not poisoned")
    }
}

impl Debug for Stock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("Stock")
            .field("symbol", &self.symbol)
            .field("company", &self.company().map(|c| c.company_name.as_str()))
            .field("points", &state.series.len())
            .field("fetched_at", &state.fetched_at)
            .field("source", &self.source.as_ref().map(|source| source.name()))
            .finish()
    }
}

impl Display for Stock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let latest = self.read_state().series.latest().map(|point| point.close);
        writeln!(f, "[Stock]")?;
        writeln!(f, "      Symbol: {}", self.symbol)?;
        match self.company() {
            Some(company) => writeln!(f, "     Company: {}", company.company_name)?,
            None => writeln!(f, "     Company: n/a")?,
        }
        write!(f, "  Live Price: {}", format::currency(latest.unwrap_or(0.0)))
    }
}
