//! Quote source trait, raw quote rows, and structured fetch errors.
//!
//! The QuoteSource trait abstracts over historical-quote endpoints (Yahoo chart
//! JSON, textual CSV endpoints) so the fetcher can fall back between them and
//! tests can substitute an in-memory source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One cell of a raw quote row, before numeric coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuoteValue {
    Number(f64),
    Text(String),
    Missing,
}

impl QuoteValue {
    /// Build a cell from a CSV field. Blank fields are `Missing`; everything
    /// else is kept as text and coerced later.
    pub fn from_field(field: &str) -> Self {
        let field = field.trim();
        if field.is_empty() {
            Self::Missing
        } else {
            Self::Text(field.to_string())
        }
    }

    /// Coerce to a finite number. Non-numeric text, NaN and infinities are `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v).filter(|v| v.is_finite()),
            Self::Text(s) => crate::data::normalize::parse_price(s).ok(),
            Self::Missing => None,
        }
    }
}

impl From<Option<f64>> for QuoteValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::Missing, Self::Number)
    }
}

impl From<f64> for QuoteValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

/// Raw daily OHLCV row from a quote source. Ephemeral: consumed by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    pub date: NaiveDate,
    pub open: QuoteValue,
    pub high: QuoteValue,
    pub low: QuoteValue,
    pub close: QuoteValue,
    pub volume: QuoteValue,
    pub adj_close: QuoteValue,
}

impl RawQuote {
    /// A row where every price field carries the same value. Mostly for tests
    /// and synthetic sources.
    pub fn flat(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            open: price.into(),
            high: price.into(),
            low: price.into(),
            close: price.into(),
            volume: QuoteValue::Missing,
            adj_close: price.into(),
        }
    }

    pub fn field(&self, field: PriceField) -> &QuoteValue {
        match field {
            PriceField::Open => &self.open,
            PriceField::High => &self.high,
            PriceField::Low => &self.low,
            PriceField::Close => &self.close,
            PriceField::AdjClose => &self.adj_close,
        }
    }
}

/// Which column of a raw row is "the price" for the active source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    #[default]
    AdjClose,
}

/// Structured errors from a single quote request. Absorbed by the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} for {symbol}")]
    HttpStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("empty payload for {symbol}")]
    EmptyPayload { symbol: String },

    #[error("fetch error: {0}")]
    Other(String),
}

/// A historical-quote endpoint.
///
/// Implementations return every row the endpoint produced for the range,
/// unfiltered. An empty payload must be reported as an error, never `Ok(vec![])`.
pub trait QuoteSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch daily rows for a ticker over an inclusive date range.
    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawQuote>, FetchError>;
}

/// Progress callback for multi-ticker panel builds.
pub trait FetchProgress: Send {
    /// Called when starting to fetch a ticker.
    fn on_start(&self, ticker: &str, index: usize, total: usize);

    /// Called once a ticker is either joined into the panel or skipped.
    fn on_complete(&self, ticker: &str, index: usize, total: usize, joined: bool);

    /// Called when the build loop finishes.
    fn on_batch_complete(&self, joined: usize, considered: usize);
}

/// Simple progress reporter that prints to stdout.
pub struct StdoutProgress;

impl FetchProgress for StdoutProgress {
    fn on_start(&self, ticker: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {ticker}...", index + 1, total);
    }

    fn on_complete(&self, ticker: &str, _index: usize, _total: usize, joined: bool) {
        if joined {
            println!("  OK: {ticker}");
        } else {
            println!("  SKIP: {ticker} (no usable data)");
        }
    }

    fn on_batch_complete(&self, joined: usize, considered: usize) {
        println!("\nPanel complete: {joined}/{considered} tickers joined");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_value_coercion() {
        assert_eq!(QuoteValue::Number(1.5).as_f64(), Some(1.5));
        assert_eq!(QuoteValue::Number(f64::NAN).as_f64(), None);
        assert_eq!(QuoteValue::Number(f64::INFINITY).as_f64(), None);
        assert_eq!(QuoteValue::Text("12.25".into()).as_f64(), Some(12.25));
        assert_eq!(QuoteValue::Text("-".into()).as_f64(), None);
        assert_eq!(QuoteValue::Missing.as_f64(), None);
    }

    #[test]
    fn blank_csv_field_is_missing() {
        assert_eq!(QuoteValue::from_field("  "), QuoteValue::Missing);
        assert_eq!(QuoteValue::from_field("3.0"), QuoteValue::Text("3.0".into()));
    }

    #[test]
    fn field_selection() {
        let date = NaiveDate::from_ymd_opt(2016, 1, 4).unwrap();
        let mut q = RawQuote::flat(date, 10.0);
        q.close = QuoteValue::Number(11.0);
        assert_eq!(q.field(PriceField::Close).as_f64(), Some(11.0));
        assert_eq!(q.field(PriceField::Open).as_f64(), Some(10.0));
    }
}
