//! Per-ticker fetch with source fallback.
//!
//! The fetcher never fails: every `FetchError` is logged and absorbed, and
//! the caller sees either rows or `Fetched::Empty`. "No data" and "request
//! failed" are intentionally indistinguishable here.

use super::provider::{FetchError, QuoteSource, RawQuote};
use chrono::NaiveDate;
use std::time::Duration;

/// Tokens that stand for a missing ticker in a holdings listing.
pub const MISSING_TICKER_TOKENS: &[&str] = &["nan", "null", "none", "n/a"];

/// True for the sentinel placeholder a holdings listing uses for "no symbol".
pub fn is_missing_ticker(ticker: &str) -> bool {
    let t = ticker.trim();
    t.is_empty()
        || MISSING_TICKER_TOKENS
            .iter()
            .any(|tok| t.eq_ignore_ascii_case(tok))
}

/// Outcome of fetching one ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Quotes(Vec<RawQuote>),
    Empty,
}

impl Fetched {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Quotes(rows) => rows.is_empty(),
            Self::Empty => true,
        }
    }

    /// Flatten to rows; `Empty` becomes an empty vector.
    pub fn into_quotes(self) -> Vec<RawQuote> {
        match self {
            Self::Quotes(rows) => rows,
            Self::Empty => Vec::new(),
        }
    }
}

/// Fetches one ticker's history, trying each source in order.
pub struct TickerSeriesFetcher {
    sources: Vec<Box<dyn QuoteSource>>,
    max_retries: u32,
    base_delay: Duration,
}

impl TickerSeriesFetcher {
    pub fn new(sources: Vec<Box<dyn QuoteSource>>) -> Self {
        Self {
            sources,
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Retry each source up to `max_retries` extra times with exponential backoff.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch rows for `ticker`. The sentinel token returns `Empty` without
    /// touching any source.
    pub fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Fetched {
        if is_missing_ticker(ticker) {
            return Fetched::Empty;
        }

        for source in &self.sources {
            match self.fetch_with_retry(source.as_ref(), ticker, start, end) {
                Ok(rows) if !rows.is_empty() => return Fetched::Quotes(rows),
                Ok(_) => {
                    tracing::debug!(ticker, source = source.name(), "source returned no rows");
                }
                Err(e) => {
                    tracing::debug!(ticker, source = source.name(), error = %e, "fetch failed");
                }
            }
        }
        Fetched::Empty
    }

    fn fetch_with_retry(
        &self,
        source: &dyn QuoteSource,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawQuote>, FetchError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            match source.fetch(ticker, start, end) {
                Ok(rows) => return Ok(rows),
                // An unknown symbol will not appear on retry.
                Err(e @ FetchError::SymbolNotFound { .. }) => return Err(e),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Other("max retries exceeded".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        fail_times: usize,
        rows: Vec<RawQuote>,
    }

    impl QuoteSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch(
            &self,
            ticker: &str,
            _: NaiveDate,
            _: NaiveDate,
        ) -> Result<Vec<RawQuote>, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(FetchError::NetworkUnreachable(format!("{ticker} down")));
            }
            if self.rows.is_empty() {
                return Err(FetchError::EmptyPayload {
                    symbol: ticker.into(),
                });
            }
            Ok(self.rows.clone())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 1, 4).unwrap()
    }

    fn source(calls: &Arc<AtomicUsize>, fail_times: usize, rows: usize) -> Box<dyn QuoteSource> {
        Box::new(CountingSource {
            calls: Arc::clone(calls),
            fail_times,
            rows: (0..rows).map(|_| RawQuote::flat(day(), 1.0)).collect(),
        })
    }

    #[test]
    fn sentinel_short_circuits_without_calling_sources() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = TickerSeriesFetcher::new(vec![source(&calls, 0, 1)]);
        for token in ["nan", "NaN", "", "  ", "None"] {
            assert_eq!(fetcher.fetch(token, day(), day()), Fetched::Empty);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failure_is_absorbed_as_empty() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = TickerSeriesFetcher::new(vec![source(&calls, usize::MAX, 1)]);
        let got = fetcher.fetch("ABC", day(), day());
        assert!(got.is_empty());
        assert!(got.into_quotes().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry by default");
    }

    #[test]
    fn falls_back_to_next_source() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let fetcher =
            TickerSeriesFetcher::new(vec![source(&first, 0, 0), source(&second, 0, 3)]);
        let got = fetcher.fetch("XOM", day(), day());
        assert_eq!(got.into_quotes().len(), 3);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = TickerSeriesFetcher::new(vec![source(&calls, 2, 1)])
            .with_retries(2, Duration::from_millis(1));
        assert!(!fetcher.fetch("ABC", day(), day()).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn sentinel_detection() {
        assert!(is_missing_ticker("nan"));
        assert!(is_missing_ticker(" NULL "));
        assert!(!is_missing_ticker("NANO"));
        assert!(!is_missing_ticker("AAPL"));
    }
}
