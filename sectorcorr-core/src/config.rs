//! Analysis configuration.
//!
//! Everything the pipeline needs is passed in as an `AnalysisConfig` value:
//! date range, panel options, which quote source to use, HTTP settings and
//! the ETF watchlists. Stored as TOML; every field has a default so a config
//! file only needs to name what it changes.

use crate::data::csv_source::DEFAULT_CSV_URL_TEMPLATE;
use crate::data::fetch::TickerSeriesFetcher;
use crate::data::provider::{FetchError, PriceField, QuoteSource};
use crate::data::yahoo::{YahooChartSource, DEFAULT_CHART_URL};
use crate::data::CsvQuoteSource;
use crate::date::{parse_range, DateLiteral, ValidationError, YearRange};
use crate::holdings::DEFAULT_HOLDINGS_URL_TEMPLATE;
use crate::panel::BuildOptions;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("build quote source: {0}")]
    Source(#[from] FetchError),
}

/// Which quote endpoint family to fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Yahoo,
    Csv,
}

/// HTTP client settings shared by every network source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Retries per source after the first attempt. `0` means one request only.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
            max_retries: 0,
            retry_base_delay_ms: 500,
        }
    }
}

impl HttpSettings {
    /// Build a blocking client with the configured timeout and user agent.
    pub fn client(&self) -> Result<reqwest::blocking::Client, FetchError> {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Quote source selection and endpoint locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// Overrides the source's own price column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_field: Option<PriceField>,
    pub chart_url: String,
    pub csv_url_template: String,
    /// Exchange listings tried in order by the CSV source.
    pub exchanges: Vec<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Yahoo,
            price_field: None,
            chart_url: DEFAULT_CHART_URL.into(),
            csv_url_template: DEFAULT_CSV_URL_TEMPLATE.into(),
            exchanges: vec!["NASDAQ".into(), "NYSE".into()],
        }
    }
}

/// ETF watchlists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Watchlists {
    pub sector: Vec<String>,
    pub broad: Vec<String>,
}

impl Default for Watchlists {
    fn default() -> Self {
        let list = |s: &[&str]| -> Vec<String> { s.iter().map(|t| t.to_string()).collect() };
        Self {
            sector: list(&[
                "IBB", "IYW", "IYH", "IYF", "ITA", "IGF", "IXJ", "IYE", "ITB", "IGE", "IYG",
                "IYJ", "IHI", "IYM", "IHE", "IYZ", "IYR",
            ]),
            broad: list(&["SPY", "DIA", "QQQ", "GLD"]),
        }
    }
}

/// Complete configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// The index ETF to analyze.
    pub etf: String,
    pub start_date: String,
    pub end_date: String,
    pub years: YearRange,
    /// Maximum number of holdings considered, failed ones included.
    pub nstocks: usize,
    /// Fetch the ETF itself and put it first in the panel.
    pub include_index: bool,
    /// Window length for rolling correlation.
    pub rolling_window: usize,
    pub holdings_url_template: String,
    pub source: SourceSettings,
    pub http: HttpSettings,
    pub watchlists: Watchlists,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            etf: "IYR".into(),
            start_date: "Jan 1 1990".into(),
            end_date: "Dec 1 2016".into(),
            years: YearRange::default(),
            nstocks: 30,
            include_index: true,
            rolling_window: 60,
            holdings_url_template: DEFAULT_HOLDINGS_URL_TEMPLATE.into(),
            source: SourceSettings::default(),
            http: HttpSettings::default(),
            watchlists: Watchlists::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string and validate it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check field ranges and that the date literals parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.etf.trim().is_empty() {
            return Err(ConfigError::Invalid("etf must not be empty".into()));
        }
        if self.nstocks == 0 {
            return Err(ConfigError::Invalid("nstocks must be at least 1".into()));
        }
        if self.rolling_window < 2 {
            return Err(ConfigError::Invalid("rolling_window must be at least 2".into()));
        }
        if self.years.min > self.years.max {
            return Err(ConfigError::Invalid(format!(
                "year range {}..={} is empty",
                self.years.min, self.years.max
            )));
        }
        if NaiveDate::from_ymd_opt(self.years.min, 1, 1).is_none()
            || NaiveDate::from_ymd_opt(self.years.max, 12, 31).is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "year range {}..={} is outside the supported calendar",
                self.years.min, self.years.max
            )));
        }
        if self.source.kind == SourceKind::Csv && self.source.exchanges.is_empty() {
            return Err(ConfigError::Invalid(
                "csv source needs at least one exchange".into(),
            ));
        }
        self.date_range()?;
        Ok(())
    }

    /// The parsed start and end literals.
    pub fn date_range(&self) -> Result<(DateLiteral, DateLiteral), ValidationError> {
        parse_range(&self.start_date, &self.end_date, &self.years)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            nstocks: self.nstocks,
            include_index: self.include_index,
        }
    }

    /// Construct the quote sources named by `source.kind`, in fallback order.
    pub fn quote_sources(&self) -> Result<Vec<Box<dyn QuoteSource>>, ConfigError> {
        let sources: Vec<Box<dyn QuoteSource>> = match self.source.kind {
            SourceKind::Yahoo => vec![Box::new(YahooChartSource::with_base_url(
                &self.http,
                &self.source.chart_url,
            )?) as Box<dyn QuoteSource>],
            SourceKind::Csv => self
                .source
                .exchanges
                .iter()
                .map(|ex| {
                    CsvQuoteSource::new(&self.http, &self.source.csv_url_template, Some(ex))
                        .map(|s| Box::new(s) as Box<dyn QuoteSource>)
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(sources)
    }

    /// A fetcher over the configured sources.
    pub fn fetcher(&self) -> Result<TickerSeriesFetcher, ConfigError> {
        Ok(TickerSeriesFetcher::new(self.quote_sources()?)
            .with_retries(self.http.max_retries, self.http.retry_base_delay()))
    }

    /// Price column for the normalizer: explicit override, else the source default.
    pub fn price_field(&self) -> PriceField {
        self.source.price_field.unwrap_or(match self.source.kind {
            SourceKind::Yahoo => PriceField::AdjClose,
            SourceKind::Csv => PriceField::Close,
        })
    }
}
