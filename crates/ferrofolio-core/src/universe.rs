//! Sources of index constituent lists.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http_client::{HttpClient, HttpRequest};
use crate::price_source::SourceError;
use crate::store::PortfolioStore;

/// Identifier of the S&P 500 index.
pub const SP500: &str = "SP500";

/// Public CSV listing of the current S&P 500 constituents.
pub const DEFAULT_SP500_CSV_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";

/// Lists the raw (un-normalized) ticker symbols making up an index.
pub trait UniverseSource: Send + Sync {
    fn list_constituents(&self, index: &str) -> Result<Vec<String>, SourceError>;
}

/// Fixed in-memory constituent lists.
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    indexes: HashMap<String, Vec<String>>,
}

impl StaticUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index<I, S>(mut self, index: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes
            .insert(index.into(), symbols.into_iter().map(Into::into).collect());
        self
    }
}

impl UniverseSource for StaticUniverse {
    fn list_constituents(&self, index: &str) -> Result<Vec<String>, SourceError> {
        self.indexes
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::not_found(format!("unknown index '{index}'")))
    }
}

/// Downloads a constituents CSV and reads its `Symbol` column.
pub struct CsvUniverse {
    http_client: Arc<dyn HttpClient>,
    urls: HashMap<String, String>,
    timeout_ms: u64,
}

impl CsvUniverse {
    /// Universe knowing only [`SP500`] at [`DEFAULT_SP500_CSV_URL`].
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            urls: HashMap::from([(SP500.to_string(), DEFAULT_SP500_CSV_URL.to_string())]),
            timeout_ms: 10_000,
        }
    }

    pub fn with_index(mut self, index: impl Into<String>, url: impl Into<String>) -> Self {
        self.urls.insert(index.into(), url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl UniverseSource for CsvUniverse {
    fn list_constituents(&self, index: &str) -> Result<Vec<String>, SourceError> {
        let url = self
            .urls
            .get(index)
            .ok_or_else(|| SourceError::not_found(format!("no constituents URL for '{index}'")))?;

        let request = HttpRequest::get(url.as_str()).with_timeout_ms(self.timeout_ms);
        let response = self.http_client.execute(request).map_err(|error| {
            SourceError::unavailable(format!("constituents download failed: {}", error.message()))
        })?;
        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "constituents download returned status {}",
                response.status
            )));
        }

        let symbols = symbol_column(&response.body)?;
        log::info!("downloaded {} constituents for {index}", symbols.len());
        Ok(symbols)
    }
}

/// Constituents previously saved in the store under the index name.
pub struct StoreUniverse {
    store: Arc<dyn PortfolioStore>,
}

impl StoreUniverse {
    pub fn new(store: Arc<dyn PortfolioStore>) -> Self {
        Self { store }
    }
}

impl UniverseSource for StoreUniverse {
    fn list_constituents(&self, index: &str) -> Result<Vec<String>, SourceError> {
        let symbols = self
            .store
            .get_constituents(index)
            .map_err(|error| SourceError::unavailable(error.to_string()))?;
        if symbols.is_empty() {
            return Err(SourceError::not_found(format!(
                "no stored constituents for '{index}'"
            )));
        }
        Ok(symbols)
    }
}

fn symbol_column(body: &str) -> Result<Vec<String>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    let column = reader
        .headers()
        .map_err(|error| SourceError::internal(format!("unreadable constituents CSV: {error}")))?
        .iter()
        .position(|name| name.eq_ignore_ascii_case("symbol"))
        .ok_or_else(|| SourceError::internal("constituents CSV has no Symbol column"))?;

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|error| SourceError::internal(format!("malformed constituents CSV: {error}")))?;
        if let Some(symbol) = record.get(column).filter(|symbol| !symbol.is_empty()) {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}
