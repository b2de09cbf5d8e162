//! SectorCorr Core — quote acquisition, series normalization, panel alignment, correlation.
//!
//! Pipeline, leaf first:
//! - Quote sources (Yahoo chart JSON, exchange-qualified CSV) behind `QuoteSource`
//! - Per-ticker fetch with source fallback; failures collapse to "empty"
//! - Normalization to a canonical price series and its percent-change series
//! - Accumulating left join of many tickers into a price and a percent-change panel
//! - Pairwise-complete Pearson correlation, full matrix and rolling

pub mod config;
pub mod correlation;
pub mod data;
pub mod date;
pub mod holdings;
pub mod panel;

pub use config::{AnalysisConfig, ConfigError};
pub use correlation::{correlate, rolling_correlate, CorrelationMatrix, RollingCorrelation};
pub use date::{DateLiteral, ValidationError, YearRange};
pub use holdings::{HoldingsError, HoldingsSource, HtmlTableHoldings, StaticHoldings};
pub use panel::{BuildOptions, Panel, PanelAligner, PanelBuild, PanelError, PanelPair};
