//! Market-data provider contract.
//!
//! A [`PriceSource`] returns daily OHLCV history and, optionally, company
//! metadata for one symbol per call. Implementations must be `Send + Sync`
//! so a single instance can serve the bulk downloader's worker pool.

use std::fmt::{Display, Formatter};

use time::Date;

use crate::domain::{Company, Interval, Period, PricePoint, Symbol, UtcDateTime};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    NotFound,
    Internal,
}

/// Structured error returned by price and universe sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// How fetched points combine with what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Discard stored history for the symbol.
    #[default]
    Replace,
    /// Merge into stored history by date.
    Append,
}

/// History request for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: Symbol,
    pub start: Option<Date>,
    pub end: Option<Date>,
    pub period: Option<Period>,
    pub interval: Interval,
    pub mode: FetchMode,
    pub include_metadata: bool,
}

impl FetchRequest {
    /// Entire available history, replacing anything stored.
    pub fn full(symbol: Symbol) -> Self {
        Self {
            symbol,
            start: None,
            end: None,
            period: Some(Period::Max),
            interval: Interval::OneDay,
            mode: FetchMode::Replace,
            include_metadata: false,
        }
    }

    /// History from `start` onward, merged into what is stored.
    pub fn since(symbol: Symbol, start: Date) -> Self {
        Self {
            symbol,
            start: Some(start),
            end: None,
            period: None,
            interval: Interval::OneDay,
            mode: FetchMode::Append,
            include_metadata: false,
        }
    }

    pub fn with_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = include_metadata;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_end(mut self, end: Date) -> Self {
        self.end = Some(end);
        self
    }

    /// Check the date window against today's UTC date.
    pub fn validate(self) -> Result<Self, SourceError> {
        self.validate_as_of(UtcDateTime::now().date())
    }

    /// Require a start date or a period, default a missing end to `today`
    /// when a start is given, and reject `start > end`.
    pub fn validate_as_of(mut self, today: Date) -> Result<Self, SourceError> {
        if self.start.is_none() && self.period.is_none() {
            return Err(SourceError::invalid_request(format!(
                "history request for {} needs a start date or a period",
                self.symbol
            )));
        }

        if let Some(start) = self.start {
            let end = *self.end.get_or_insert(today);
            if start > end {
                return Err(SourceError::invalid_request(format!(
                    "history request for {}: start {start} is after end {end}",
                    self.symbol
                )));
            }
        }

        Ok(self)
    }
}

/// Provider response: optional metadata plus points ordered by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceFetch {
    pub metadata: Option<Company>,
    pub series: Vec<PricePoint>,
}

/// Market-data provider contract.
pub trait PriceSource: Send + Sync {
    /// Short identifier recorded alongside stored history.
    fn name(&self) -> &'static str;

    fn fetch(&self, request: &FetchRequest) -> Result<PriceFetch, SourceError>;
}
