//! Historical-quotes CSV source.
//!
//! Endpoints of this family take an exchange-qualified symbol and textual dates
//! (`Jan+1%2C+1990`) and answer with a `Date,Open,High,Low,Close,Volume` table,
//! newest row first. Cells are kept as text; coercion happens in the normalizer.
//!
//! Request dates arrive as `NaiveDate`, so a literal such as `Feb 30 2000` has
//! already been clamped by `DateLiteral::to_naive_date` and goes out as
//! `Feb+29%2C+2000`.

use super::provider::{FetchError, QuoteSource, QuoteValue, RawQuote};
use crate::config::HttpSettings;
use crate::date::DateLiteral;
use chrono::NaiveDate;

pub const DEFAULT_CSV_URL_TEMPLATE: &str =
    "https://www.google.com/finance/historical?q={symbol}&startdate={start}&enddate={end}&output=csv";

const DATE_FORMATS: &[&str] = &["%d-%b-%y", "%Y-%m-%d", "%b %d %Y", "%m/%d/%Y"];

/// CSV quote source bound to one exchange listing.
pub struct CsvQuoteSource {
    client: reqwest::blocking::Client,
    url_template: String,
    exchange: Option<String>,
    name: String,
}

impl CsvQuoteSource {
    /// `url_template` may contain `{symbol}`, `{start}` and `{end}` placeholders.
    pub fn new(
        http: &HttpSettings,
        url_template: &str,
        exchange: Option<&str>,
    ) -> Result<Self, FetchError> {
        let name = match exchange {
            Some(ex) => format!("csv:{ex}"),
            None => "csv".to_string(),
        };
        Ok(Self {
            client: http.client()?,
            url_template: url_template.to_string(),
            exchange: exchange.map(str::to_string),
            name,
        })
    }

    /// Request URL. Dates are the clamped calendar dates, never impossible days.
    fn url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        let symbol = match &self.exchange {
            Some(ex) => format!("{ex}%3A{ticker}"),
            None => ticker.to_string(),
        };
        self.url_template
            .replace("{symbol}", &symbol)
            .replace("{start}", &DateLiteral::from(start).url_form())
            .replace("{end}", &DateLiteral::from(end).url_form())
    }
}

impl QuoteSource for CsvQuoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawQuote>, FetchError> {
        let resp = self
            .client
            .get(self.url(ticker, start, end))
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                symbol: ticker.to_string(),
            });
        }

        let body = resp
            .text()
            .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;
        parse_csv(ticker, &body)
    }
}

/// Column positions resolved from the header row.
#[derive(Debug, Default)]
struct Columns {
    date: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    volume: Option<usize>,
    adj_close: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Self {
        let mut cols = Self::default();
        for (i, name) in header.iter().enumerate() {
            let key: String = name
                .trim_start_matches('\u{feff}')
                .trim()
                .to_ascii_lowercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            let slot = match key.as_str() {
                "date" => &mut cols.date,
                "open" => &mut cols.open,
                "high" => &mut cols.high,
                "low" => &mut cols.low,
                "close" => &mut cols.close,
                "volume" | "vol" => &mut cols.volume,
                "adjclose" => &mut cols.adj_close,
                _ => continue,
            };
            slot.get_or_insert(i);
        }
        cols
    }
}

fn parse_date(field: &str) -> Option<NaiveDate> {
    let field = field.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(field, fmt).ok())
}

/// Parse a CSV body into raw rows. Rows whose date cannot be parsed are dropped.
pub fn parse_csv(ticker: &str, body: &str) -> Result<Vec<RawQuote>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| FetchError::ResponseFormatChanged(format!("{ticker}: bad CSV header: {e}")))?
        .clone();
    let cols = Columns::from_header(&header);
    let date_col = cols.date.ok_or_else(|| {
        FetchError::ResponseFormatChanged(format!("{ticker}: CSV has no Date column"))
    })?;

    let cell = |record: &csv::StringRecord, col: Option<usize>| {
        col.and_then(|i| record.get(i))
            .map_or(QuoteValue::Missing, QuoteValue::from_field)
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            FetchError::ResponseFormatChanged(format!("{ticker}: unreadable CSV row: {e}"))
        })?;
        let Some(date) = record.get(date_col).and_then(parse_date) else {
            continue;
        };
        rows.push(RawQuote {
            date,
            open: cell(&record, cols.open),
            high: cell(&record, cols.high),
            low: cell(&record, cols.low),
            close: cell(&record, cols.close),
            volume: cell(&record, cols.volume),
            adj_close: cell(&record, cols.adj_close),
        });
    }

    if rows.is_empty() {
        return Err(FetchError::EmptyPayload {
            symbol: ticker.to_string(),
        });
    }
    Ok(rows)
}
