use std::sync::Arc;

use serde::Deserialize;
use time::Date;

use crate::circuit_breaker::CircuitBreaker;
use crate::domain::{Company, PricePoint, Symbol, UtcDateTime};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::price_source::{FetchRequest, PriceFetch, PriceSource, SourceError, SourceErrorKind};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const SUMMARY_MODULES: &str = "assetProfile,price,defaultKeyStatistics,esgScores";

/// Yahoo Finance chart and quoteSummary client.
///
/// Daily history comes from the v8 chart endpoint; company metadata from
/// v10 quoteSummary. Yahoo sometimes demands a session cookie plus crumb;
/// [`YahooAdapter::from_env`] picks them up from `YAHOO_COOKIE` and
/// `YAHOO_CRUMB`.
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    crumb: Option<String>,
    circuit_breaker: Arc<CircuitBreaker>,
    timeout_ms: u64,
    base_url: String,
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            auth: HttpAuth::None,
            crumb: None,
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            timeout_ms: 10_000,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Adapter authenticated from `YAHOO_COOKIE` and `YAHOO_CRUMB` when set.
    pub fn from_env(http_client: Arc<dyn HttpClient>) -> Self {
        let mut adapter = Self::new(http_client);
        if let Ok(cookie) = std::env::var("YAHOO_COOKIE") {
            if !cookie.trim().is_empty() {
                adapter.auth = HttpAuth::Cookie(cookie);
            }
        }
        adapter.crumb = std::env::var("YAHOO_CRUMB")
            .ok()
            .filter(|crumb| !crumb.trim().is_empty());
        adapter
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_crumb(mut self, crumb: impl Into<String>) -> Self {
        self.crumb = Some(crumb.into());
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn chart_url(&self, request: &FetchRequest) -> String {
        let mut url = format!(
            "{}/v8/finance/chart/{}?interval={}",
            self.base_url,
            urlencoding::encode(request.symbol.as_str()),
            request.interval.as_str()
        );

        match (request.start, request.period) {
            (Some(start), _) => {
                let end = request.end.unwrap_or_else(|| UtcDateTime::now().date());
                url.push_str(&format!(
                    "&period1={}&period2={}",
                    UtcDateTime::start_of(start).unix_timestamp(),
                    UtcDateTime::start_of(exclusive_end(end)).unix_timestamp()
                ));
            }
            (None, Some(period)) => url.push_str(&format!("&range={}", period.as_str())),
            (None, None) => {}
        }

        self.append_crumb(url)
    }

    fn summary_url(&self, symbol: &Symbol) -> String {
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules={}",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            SUMMARY_MODULES
        );
        self.append_crumb(url)
    }

    fn append_crumb(&self, mut url: String) -> String {
        if let Some(crumb) = &self.crumb {
            url.push_str("&crumb=");
            url.push_str(&urlencoding::encode(crumb));
        }
        url
    }

    /// Issue a GET and map its outcome onto the circuit breaker and
    /// [`SourceError`] kinds.
    fn get(&self, url: &str) -> Result<String, SourceError> {
        if let Err(remaining) = self.circuit_breaker.try_acquire() {
            return Err(SourceError::unavailable(format!(
                "yahoo circuit breaker is open for another {}s",
                remaining.as_secs()
            )));
        }

        let request = HttpRequest::get(url)
            .with_header("referer", "https://finance.yahoo.com/")
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms);

        let response = self.http_client.execute(request).map_err(|error| {
            self.circuit_breaker.record_failure();
            SourceError::unavailable(format!("yahoo transport error: {}", error.message()))
        })?;

        match response.status {
            status if (200..300).contains(&status) => {
                self.circuit_breaker.record_success();
                Ok(response.body)
            }
            404 => {
                self.circuit_breaker.record_success();
                Err(SourceError::not_found(format!("yahoo has no data at {url}")))
            }
            429 => {
                self.circuit_breaker.record_failure();
                Err(SourceError::rate_limited("yahoo returned status 429"))
            }
            status => {
                self.circuit_breaker.record_failure();
                Err(SourceError::unavailable(format!(
                    "yahoo returned status {status}"
                )))
            }
        }
    }

    fn fetch_series(&self, request: &FetchRequest) -> Result<Vec<PricePoint>, SourceError> {
        let body = self.get(&self.chart_url(request))?;
        parse_chart(&request.symbol, &body)
    }

    fn fetch_company(&self, symbol: &Symbol) -> Result<Option<Company>, SourceError> {
        match self.get(&self.summary_url(symbol)) {
            Ok(body) => parse_summary(symbol, &body),
            Err(error) if error.kind() == SourceErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl PriceSource for YahooAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<PriceFetch, SourceError> {
        let request = request.clone().validate()?;

        let metadata = if request.include_metadata {
            self.fetch_company(&request.symbol)?
        } else {
            None
        };
        let series = self.fetch_series(&request)?;

        log::debug!(
            "yahoo returned {} points for {}",
            series.len(),
            request.symbol
        );
        Ok(PriceFetch { metadata, series })
    }
}

/// Chart `period2` is exclusive, so a window ending on `end` stops at the
/// following midnight.
fn exclusive_end(end: Date) -> Date {
    end.next_day().unwrap_or(end)
}

fn parse_chart(symbol: &Symbol, body: &str) -> Result<Vec<PricePoint>, SourceError> {
    let response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(error) = response.chart.error {
        return Err(api_error("chart", symbol, error));
    }

    let Some(result) = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
    else {
        return Ok(Vec::new());
    };

    let gmt_offset = result.meta.and_then(|meta| meta.gmtoffset).unwrap_or(0);
    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, ts_value) in timestamps.into_iter().enumerate() {
        // Only bars with every OHLC value present are kept.
        let (Some(Some(open)), Some(Some(high)), Some(Some(low)), Some(Some(close))) = (
            quote.open.get(i),
            quote.high.get(i),
            quote.low.get(i),
            quote.close.get(i),
        ) else {
            continue;
        };

        let date = UtcDateTime::from_unix_timestamp(ts_value + gmt_offset)
            .map_err(|e| SourceError::internal(format!("invalid chart timestamp: {e}")))?
            .date();
        let volume = quote
            .volume
            .get(i)
            .copied()
            .flatten()
            .and_then(|volume| u64::try_from(volume).ok());

        match PricePoint::new(date, *open, *high, *low, *close, volume) {
            Ok(point) => points.push(point),
            Err(error) => log::debug!("skipping {symbol} bar on {date}: {error}"),
        }
    }

    Ok(points)
}

/// Company metadata from a quoteSummary body. A result without a display
/// name counts as no metadata.
fn parse_summary(symbol: &Symbol, body: &str) -> Result<Option<Company>, SourceError> {
    let response: YahooQuoteSummaryResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo quoteSummary: {e}")))?;

    if let Some(error) = response.quote_summary.error {
        let error = api_error("quoteSummary", symbol, error);
        return match error.kind() {
            SourceErrorKind::NotFound => Ok(None),
            _ => Err(error),
        };
    }

    let Some(result) = response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
    else {
        return Ok(None);
    };

    let price = result.price.unwrap_or_default();
    let Some(company_name) = price
        .long_name
        .or(price.short_name)
        .filter(|name| !name.trim().is_empty())
    else {
        return Ok(None);
    };
    let profile = result.asset_profile.unwrap_or_default();

    Ok(Some(Company {
        symbol: symbol.clone(),
        company_name,
        sector: profile.sector.unwrap_or_default(),
        industry: profile.industry.unwrap_or_default(),
        business_summary: profile.long_business_summary.unwrap_or_default(),
        country: profile.country.unwrap_or_default(),
        employee_count: profile.full_time_employees,
        market_cap: price.market_cap.and_then(|value| value.to_option()),
        float_shares: result
            .default_key_statistics
            .and_then(|stats| stats.float_shares)
            .and_then(|value| value.to_option()),
        is_esg_populated: Some(result.esg_scores.is_some()),
    }))
}

fn api_error(endpoint: &str, symbol: &Symbol, error: YahooApiError) -> SourceError {
    let message = format!(
        "yahoo {endpoint} error for {symbol}: {} {}",
        error.code.as_deref().unwrap_or("unknown"),
        error.description.as_deref().unwrap_or_default()
    );
    match error.code.as_deref() {
        Some("Not Found") => SourceError::not_found(message),
        _ => SourceError::unavailable(message),
    }
}

#[derive(Debug, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: Option<YahooChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: YahooQuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<YahooQuoteSummaryResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryResult {
    #[serde(rename = "assetProfile", default)]
    asset_profile: Option<YahooAssetProfile>,
    #[serde(default)]
    price: Option<YahooPriceData>,
    #[serde(rename = "defaultKeyStatistics", default)]
    default_key_statistics: Option<YahooKeyStatistics>,
    #[serde(rename = "esgScores", default)]
    esg_scores: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooAssetProfile {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(rename = "longBusinessSummary", default)]
    long_business_summary: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(rename = "fullTimeEmployees", default)]
    full_time_employees: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooPriceData {
    #[serde(rename = "longName", default)]
    long_name: Option<String>,
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
    #[serde(rename = "marketCap", default)]
    market_cap: Option<YahooRawValue>,
}

#[derive(Debug, Deserialize)]
struct YahooKeyStatistics {
    #[serde(rename = "floatShares", default)]
    float_shares: Option<YahooRawValue>,
}

/// Numeric field wrapped as `{"raw": .., "fmt": ..}`.
#[derive(Debug, Deserialize)]
struct YahooRawValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl YahooRawValue {
    fn to_option(&self) -> Option<f64> {
        self.raw.filter(|value| value.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::http_client::{HttpError, HttpResponse};
    use std::sync::Mutex;
    use std::time::Duration;
    use time::macros::date;

    const CHART_BODY: &str = r#"{"chart":{"result":[{"meta":{"symbol":"AAPL","gmtoffset":-18000},
        "timestamp":[1709217000,1709303400,1709562600],
        "indicators":{"quote":[{"open":[179.55,179.9,null],"high":[182.57,180.53,176.9],
        "low":[179.53,177.38,173.79],"close":[180.75,179.66,175.1],
        "volume":[136682600,73488000,81510100]}]}}],"error":null}}"#;

    const SUMMARY_BODY: &str = r#"{"quoteSummary":{"result":[{
        "assetProfile":{"sector":"Technology","industry":"Consumer Electronics",
            "longBusinessSummary":"Apple Inc. designs smartphones.","country":"United States",
            "fullTimeEmployees":161000},
        "price":{"longName":"Apple Inc.","shortName":"Apple","marketCap":{"raw":2.8e12,"fmt":"2.8T"}},
        "defaultKeyStatistics":{"floatShares":{"raw":15300000000}},
        "esgScores":{"totalEsg":{"raw":17.2}}}],"error":null}}"#;

    /// Answers by the first route whose fragment appears in the URL.
    struct RecordingHttpClient {
        routes: Vec<(&'static str, Result<HttpResponse, HttpError>)>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn new(routes: Vec<(&'static str, Result<HttpResponse, HttpError>)>) -> Self {
            Self {
                routes,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let response = self
                .routes
                .iter()
                .find(|(fragment, _)| request.url.contains(fragment))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| Ok(HttpResponse::with_status(404, "")));
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            response
        }
    }

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").expect("valid symbol")
    }

    #[test]
    fn chart_skips_incomplete_bars_and_uses_exchange_dates() {
        let client = Arc::new(RecordingHttpClient::new(vec![(
            "/v8/finance/chart/",
            Ok(HttpResponse::ok(CHART_BODY)),
        )]));
        let adapter = YahooAdapter::new(client.clone());

        let fetched = adapter
            .fetch(&FetchRequest::full(aapl()))
            .expect("chart parses");

        assert!(fetched.metadata.is_none());
        let dates: Vec<Date> = fetched.series.iter().map(|point| point.date).collect();
        assert_eq!(dates, vec![date!(2024 - 02 - 29), date!(2024 - 03 - 01)]);
        assert_eq!(fetched.series[0].close, 180.75);
        assert_eq!(fetched.series[1].volume, Some(73_488_000));

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.contains("range=max"));
        assert!(requests[0].url.contains("interval=1d"));
    }

    #[test]
    fn dated_request_sends_unix_window_with_exclusive_end_and_crumb() {
        let client = Arc::new(RecordingHttpClient::new(vec![(
            "/v8/finance/chart/",
            Ok(HttpResponse::ok(CHART_BODY)),
        )]));
        let adapter = YahooAdapter::new(client.clone())
            .with_auth(HttpAuth::Cookie(String::from("B=session")))
            .with_crumb("a/b");

        let request =
            FetchRequest::since(aapl(), date!(2024 - 02 - 29)).with_end(date!(2024 - 03 - 01));
        adapter.fetch(&request).expect("chart parses");

        let requests = client.recorded_requests();
        let url = &requests[0].url;
        assert!(url.contains("period1=1709164800"));
        assert!(url.contains("period2=1709337600"));
        assert!(url.contains("crumb=a%2Fb"));
        assert_eq!(
            requests[0].headers.get("cookie").map(String::as_str),
            Some("B=session")
        );
    }

    #[test]
    fn metadata_maps_profile_price_and_statistics() {
        let client = Arc::new(RecordingHttpClient::new(vec![
            ("/v10/finance/quoteSummary/", Ok(HttpResponse::ok(SUMMARY_BODY))),
            ("/v8/finance/chart/", Ok(HttpResponse::ok(CHART_BODY))),
        ]));
        let adapter = YahooAdapter::new(client);

        let fetched = adapter
            .fetch(&FetchRequest::full(aapl()).with_metadata(true))
            .expect("fetch succeeds");
        let company = fetched.metadata.expect("metadata present");

        assert_eq!(company.company_name, "Apple Inc.");
        assert_eq!(company.sector, "Technology");
        assert_eq!(company.industry, "Consumer Electronics");
        assert_eq!(company.employee_count, Some(161_000));
        assert_eq!(company.market_cap, Some(2.8e12));
        assert_eq!(company.float_shares, Some(15_300_000_000.0));
        assert_eq!(company.is_esg_populated, Some(true));
        assert_eq!(fetched.series.len(), 2);
    }

    #[test]
    fn metadata_without_display_name_is_missing() {
        let body = r#"{"quoteSummary":{"result":[{"assetProfile":{"sector":"Technology"},
            "price":{}}],"error":null}}"#;

        let company = parse_summary(&aapl(), body).expect("body parses");
        assert!(company.is_none());
    }

    #[test]
    fn unknown_symbol_and_throttling_map_to_source_kinds() {
        let not_found = r#"{"chart":{"result":null,"error":{"code":"Not Found",
            "description":"No data found, symbol may be delisted"}}}"#;
        let error = parse_chart(&aapl(), not_found).expect_err("api error");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);

        let client = Arc::new(RecordingHttpClient::new(vec![(
            "/v8/finance/chart/",
            Ok(HttpResponse::with_status(429, "Too Many Requests")),
        )]));
        let error = YahooAdapter::new(client)
            .fetch(&FetchRequest::full(aapl()))
            .expect_err("throttled");
        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert!(error.retryable());
    }

    #[test]
    fn circuit_breaker_opens_after_repeated_transport_failures() {
        let client = Arc::new(RecordingHttpClient::new(vec![(
            "/v8/finance/chart/",
            Err(HttpError::new("upstream timeout")),
        )]));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(60),
        }));
        let adapter = YahooAdapter::new(client.clone()).with_circuit_breaker(breaker);
        let request = FetchRequest::full(aapl());

        for _ in 0..2 {
            let error = adapter.fetch(&request).expect_err("call should fail");
            assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        }

        let error = adapter.fetch(&request).expect_err("breaker should block request");
        assert!(error.message().contains("circuit breaker is open"));
        assert_eq!(client.recorded_requests().len(), 2);
    }
}
