//! Quote acquisition and per-ticker normalization.

pub mod csv_source;
pub mod fetch;
pub mod normalize;
pub mod provider;
pub mod yahoo;

pub use csv_source::CsvQuoteSource;
pub use fetch::{is_missing_ticker, Fetched, TickerSeriesFetcher};
pub use normalize::{NormalizedSeries, SeriesNormalizer, TickerSeries};
pub use provider::{
    FetchError, FetchProgress, PriceField, QuoteSource, QuoteValue, RawQuote, StdoutProgress,
};
pub use yahoo::YahooChartSource;
