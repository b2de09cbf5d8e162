//! ETF holdings lookup.
//!
//! A holdings source turns an ETF symbol into its constituent tickers, in
//! listing order. Blank or missing symbol cells are kept as the `"nan"`
//! placeholder so the panel builder still counts them against `nstocks`.

use crate::config::HttpSettings;
use crate::data::provider::FetchError;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use thiserror::Error;

/// Listing page for an ETF; `{etf}` is replaced with the symbol.
pub const DEFAULT_HOLDINGS_URL_TEMPLATE: &str = "http://etfdailynews.com/etf/{etf}";

/// Placeholder written for a holdings row without a symbol.
pub const MISSING_SYMBOL: &str = "nan";

#[derive(Debug, Error)]
pub enum HoldingsError {
    #[error("no holdings known for {0}")]
    UnknownEtf(String),

    #[error("holdings page for {etf} has no table with a Symbol column")]
    NoSymbolTable { etf: String },

    #[error("fetch holdings page: {0}")]
    Fetch(#[from] FetchError),
}

/// Anything that can list an ETF's constituents.
pub trait HoldingsSource {
    fn holdings(&self, etf: &str) -> Result<Vec<String>, HoldingsError>;
}

/// Fixed holdings lists, keyed by ETF symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticHoldings {
    lists: HashMap<String, Vec<String>>,
}

impl StaticHoldings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, etf: &str, tickers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.insert(etf, tickers);
        self
    }

    pub fn insert(&mut self, etf: &str, tickers: impl IntoIterator<Item = impl Into<String>>) {
        self.lists.insert(
            etf.to_ascii_uppercase(),
            tickers.into_iter().map(Into::into).collect(),
        );
    }
}

impl HoldingsSource for StaticHoldings {
    fn holdings(&self, etf: &str) -> Result<Vec<String>, HoldingsError> {
        self.lists
            .get(&etf.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| HoldingsError::UnknownEtf(etf.to_string()))
    }
}

/// Scrapes the holdings table from an HTML listing page.
pub struct HtmlTableHoldings {
    client: reqwest::blocking::Client,
    url_template: String,
}

impl HtmlTableHoldings {
    pub fn new(http: &HttpSettings, url_template: &str) -> Result<Self, HoldingsError> {
        Ok(Self {
            client: http.client()?,
            url_template: url_template.to_string(),
        })
    }

    pub fn url(&self, etf: &str) -> String {
        self.url_template.replace("{etf}", etf)
    }
}

impl HoldingsSource for HtmlTableHoldings {
    fn holdings(&self, etf: &str) -> Result<Vec<String>, HoldingsError> {
        let url = self.url(etf);
        tracing::debug!(etf, url = %url, "fetching holdings page");

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                symbol: etf.to_string(),
            }
            .into());
        }

        let body = resp
            .text()
            .map_err(|e| FetchError::ResponseFormatChanged(e.to_string()))?;

        parse_holdings_html(&body).ok_or_else(|| HoldingsError::NoSymbolTable {
            etf: etf.to_string(),
        })
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Symbol column of the first table whose header row has a "Symbol" cell.
///
/// `None` if no table qualifies. Blank cells become [`MISSING_SYMBOL`].
pub fn parse_holdings_html(html: &str) -> Option<Vec<String>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let tr_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    for table in document.select(&table_sel) {
        let mut rows = table.select(&tr_sel);
        let Some(column) = rows.find_map(|tr| {
            tr.select(&cell_sel)
                .position(|c| cell_text(c).eq_ignore_ascii_case("symbol"))
        }) else {
            continue;
        };

        // Short rows and blank cells keep their slot as a placeholder.
        let symbols = rows
            .map(|tr| {
                tr.select(&cell_sel)
                    .nth(column)
                    .map(cell_text)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| MISSING_SYMBOL.to_string())
            })
            .collect();
        return Some(symbols);
    }
    None
}
