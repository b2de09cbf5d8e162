//! Yahoo Finance chart source.
//!
//! Fetches daily OHLCV rows from Yahoo's v8 chart API. One request per call;
//! retries and fallback live in the fetcher.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.
//! The CSV source is the fallback when Yahoo is unavailable.

use super::provider::{FetchError, QuoteSource, QuoteValue, RawQuote};
use crate::config::HttpSettings;
use chrono::NaiveDate;
use serde::Deserialize;

pub const DEFAULT_CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance chart source.
pub struct YahooChartSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooChartSource {
    pub fn new(http: &HttpSettings) -> Result<Self, FetchError> {
        Self::with_base_url(http, DEFAULT_CHART_URL)
    }

    /// Point the source at a different chart endpoint (mirrors, test servers).
    pub fn with_base_url(http: &HttpSettings, base_url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            client: http.client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the chart API URL for a ticker and date range.
    fn chart_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end.and_time(chrono::NaiveTime::MIN).and_utc().timestamp() + 86_399;
        format!(
            "{}/{ticker}?period1={start_ts}&period2={end_ts}&interval=1d&includeAdjustedClose=true",
            self.base_url
        )
    }
}

/// Parse the chart API response into raw rows.
fn parse_response(ticker: &str, resp: ChartResponse) -> Result<Vec<RawQuote>, FetchError> {
    let result = resp.chart.result.ok_or_else(|| {
        if let Some(err) = resp.chart.error {
            if err.code == "Not Found" {
                FetchError::SymbolNotFound {
                    symbol: ticker.to_string(),
                }
            } else {
                FetchError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
        } else {
            FetchError::ResponseFormatChanged("empty result with no error".into())
        }
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::ResponseFormatChanged("result array is empty".into()))?;

    let timestamps = data.timestamp.ok_or_else(|| FetchError::EmptyPayload {
        symbol: ticker.to_string(),
    })?;

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::ResponseFormatChanged("no quote data".into()))?;

    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let mut rows = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.naive_utc().date())
            .ok_or_else(|| FetchError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;

        rows.push(RawQuote {
            date,
            open: cell(&quote.open, i),
            high: cell(&quote.high, i),
            low: cell(&quote.low, i),
            close: cell(&quote.close, i),
            volume: cell(&quote.volume, i),
            adj_close: adj_closes
                .as_deref()
                .map_or(QuoteValue::Missing, |col| cell(col, i)),
        });
    }

    if rows.is_empty() {
        return Err(FetchError::EmptyPayload {
            symbol: ticker.to_string(),
        });
    }

    Ok(rows)
}

fn cell(col: &[Option<f64>], i: usize) -> QuoteValue {
    QuoteValue::from(col.get(i).copied().flatten())
}

impl QuoteSource for YahooChartSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawQuote>, FetchError> {
        let url = self.chart_url(ticker, start, end);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                symbol: ticker.to_string(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            FetchError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
        })?;

        parse_response(ticker, chart)
    }
}
