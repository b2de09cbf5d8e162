//! Series normalization: raw quote rows → canonical price and percent-change series.
//!
//! A canonical series holds finite values only, one per date, dates strictly
//! ascending. The empty series doubles as the "no data" sentinel.

use super::provider::{PriceField, RawQuote};
use crate::date::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date-indexed single-column series for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSeries {
    pub ticker: String,
    points: Vec<(NaiveDate, f64)>,
}

impl TickerSeries {
    /// The empty sentinel for a ticker with no usable data.
    pub fn empty(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            points: Vec::new(),
        }
    }

    /// Build a canonical series from arbitrary points: non-finite values are
    /// dropped, points sorted by date, and the first of any duplicate date kept.
    pub fn from_points(ticker: &str, points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut points: Vec<(NaiveDate, f64)> =
            points.into_iter().filter(|(_, v)| v.is_finite()).collect();
        // Stable sort keeps input order among equal dates, so dedup keeps the first.
        points.sort_by_key(|(d, _)| *d);
        points.dedup_by_key(|(d, _)| *d);
        Self {
            ticker: ticker.to_string(),
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn first(&self) -> Option<(NaiveDate, f64)> {
        self.points.first().copied()
    }

    /// Value on a date, if present.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|i| self.points[i].1)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|(d, _)| *d)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, v)| *v)
    }
}

/// Price series plus the percent-change series derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub price: TickerSeries,
    pub percent_change: TickerSeries,
}

impl NormalizedSeries {
    pub fn empty(ticker: &str) -> Self {
        Self {
            price: TickerSeries::empty(ticker),
            percent_change: TickerSeries::empty(ticker),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.price.ticker
    }

    /// True when either half is unusable for the panel.
    pub fn is_empty(&self) -> bool {
        self.price.is_empty() || self.percent_change.is_empty()
    }
}

/// Converts raw rows into canonical series using one configured price column.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesNormalizer {
    pub field: PriceField,
}

impl SeriesNormalizer {
    pub fn new(field: PriceField) -> Self {
        Self { field }
    }

    /// Normalize raw rows for one ticker.
    ///
    /// Empty input, or input where no row carries a usable price, yields the
    /// empty pair. A zero first price yields a valid price series with an empty
    /// percent-change series.
    pub fn normalize(&self, raw: &[RawQuote], ticker: &str) -> NormalizedSeries {
        if raw.is_empty() {
            return NormalizedSeries::empty(ticker);
        }

        let price = TickerSeries::from_points(
            ticker,
            raw.iter()
                .filter_map(|q| q.field(self.field).as_f64().map(|v| (q.date, v))),
        );
        if price.is_empty() {
            return NormalizedSeries::empty(ticker);
        }

        let percent_change = percent_change(&price);
        NormalizedSeries {
            price,
            percent_change,
        }
    }
}

/// Re-canonicalize an existing series. Idempotent on canonical input.
pub fn normalize_series(series: &TickerSeries) -> TickerSeries {
    TickerSeries::from_points(&series.ticker, series.points.iter().copied())
}

/// Percent deviation of every value from the earliest value.
///
/// Empty if the series is empty, its first value is zero, or any derived
/// value overflows.
pub fn percent_change(price: &TickerSeries) -> TickerSeries {
    let Some((_, base)) = price.first() else {
        return TickerSeries::empty(&price.ticker);
    };
    if base == 0.0 {
        return TickerSeries::empty(&price.ticker);
    }

    let points: Vec<(NaiveDate, f64)> = price
        .points
        .iter()
        .map(|&(d, p)| (d, (p - base) / base * 100.0))
        .collect();
    if points.iter().any(|(_, v)| !v.is_finite()) {
        return TickerSeries::empty(&price.ticker);
    }

    TickerSeries {
        ticker: price.ticker.clone(),
        points,
    }
}

/// Strict numeric coercion for a price cell.
pub fn parse_price(field: &str) -> Result<f64, ValidationError> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::NotNumeric(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::QuoteValue;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 3, day).unwrap()
    }

    fn quote(day: u32, close: QuoteValue) -> RawQuote {
        let mut q = RawQuote::flat(d(day), 1.0);
        q.close = close;
        q
    }

    #[test]
    fn empty_input_gives_empty_pair() {
        let n = SeriesNormalizer::new(PriceField::Close).normalize(&[], "ABC");
        assert!(n.price.is_empty());
        assert!(n.percent_change.is_empty());
        assert_eq!(n.ticker(), "ABC");
    }

    #[test]
    fn sorts_descending_input_and_drops_bad_cells() {
        let raw = vec![
            quote(4, QuoteValue::Text("12.0".into())),
            quote(3, QuoteValue::Text("-".into())),
            quote(2, QuoteValue::Missing),
            quote(1, QuoteValue::Number(10.0)),
        ];
        let n = SeriesNormalizer::new(PriceField::Close).normalize(&raw, "ABC");

        assert_eq!(n.price.points(), &[(d(1), 10.0), (d(4), 12.0)]);
        assert_eq!(n.percent_change.points(), &[(d(1), 0.0), (d(4), 20.0)]);
    }

    #[test]
    fn all_rows_unusable_gives_empty_pair() {
        let raw = vec![quote(1, QuoteValue::Missing), quote(2, QuoteValue::Number(f64::NAN))];
        let n = SeriesNormalizer::new(PriceField::Close).normalize(&raw, "ABC");
        assert!(n.is_empty());
        assert!(n.price.is_empty());
    }

    #[test]
    fn zero_first_price_empties_percent_change_only() {
        let raw = vec![quote(1, QuoteValue::Number(0.0)), quote(2, QuoteValue::Number(5.0))];
        let n = SeriesNormalizer::new(PriceField::Close).normalize(&raw, "ABC");
        assert_eq!(n.price.len(), 2);
        assert!(n.percent_change.is_empty());
        assert!(n.is_empty());
    }

    #[test]
    fn overflowing_percent_change_is_empty() {
        let raw = vec![
            quote(1, QuoteValue::Text("1.0".into())),
            quote(2, QuoteValue::Text("1e307".into())),
            quote(3, QuoteValue::Text("2.0".into())),
        ];
        let n = SeriesNormalizer::new(PriceField::Close).normalize(&raw, "ABC");
        assert_eq!(n.price.len(), 3);
        assert!(n.percent_change.is_empty());
        assert!(n.is_empty());
    }

    #[test]
    fn tiny_base_stays_finite() {
        let s = TickerSeries::from_points("ABC", vec![(d(1), 1e-300), (d(2), 1.0), (d(3), 2.0)]);
        let pc = percent_change(&s);
        assert_eq!(pc.len(), 3);
        assert!(pc.values().all(f64::is_finite));
    }

    #[test]
    fn duplicate_dates_keep_first_occurrence() {
        let s = TickerSeries::from_points("ABC", vec![(d(2), 1.0), (d(1), 3.0), (d(2), 2.0)]);
        assert_eq!(s.points(), &[(d(1), 3.0), (d(2), 1.0)]);
    }

    #[test]
    fn uses_configured_field() {
        let mut q = RawQuote::flat(d(1), 7.0);
        q.adj_close = QuoteValue::Number(6.5);
        let n = SeriesNormalizer::new(PriceField::AdjClose).normalize(&[q.clone()], "ABC");
        assert_eq!(n.price.get(d(1)), Some(6.5));
        let n = SeriesNormalizer::new(PriceField::Open).normalize(&[q], "ABC");
        assert_eq!(n.price.get(d(1)), Some(7.0));
    }

    #[test]
    fn renormalizing_is_identity() {
        let s = TickerSeries::from_points("ABC", vec![(d(3), 1.0), (d(1), 2.0)]);
        assert_eq!(normalize_series(&s), s);
    }

    #[test]
    fn parse_price_rejects_non_numeric() {
        assert_eq!(parse_price(" 3.25 "), Ok(3.25));
        assert!(matches!(parse_price("N/A"), Err(ValidationError::NotNumeric(_))));
        assert!(parse_price("NaN").is_err());
        assert!(parse_price("inf").is_err());
    }
}
