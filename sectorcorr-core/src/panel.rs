//! Panel alignment: per-ticker series joined onto one shared date axis.
//!
//! Join policy is an accumulating left join. The first series that makes it
//! into the panel fixes the date axis; every later ticker contributes only
//! the axis dates it has, and axis dates it lacks become `None`. Dates that
//! exist only in a later ticker are dropped. A sparse first ticker therefore
//! truncates everything after it.

use crate::data::fetch::{is_missing_ticker, TickerSeriesFetcher};
use crate::data::normalize::{NormalizedSeries, SeriesNormalizer, TickerSeries};
use crate::data::provider::FetchProgress;
use crate::date::{parse_range, ValidationError, YearRange};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Days from 0001-01-01 to 1970-01-01, for polars `Date` encoding.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("no holdings passed to panel builder")]
    EmptyHoldings,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One ticker's column, aligned to the panel's date axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelColumn {
    pub ticker: String,
    pub values: Vec<Option<f64>>,
}

/// A table of aligned per-ticker series sharing one ascending date axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    columns: Vec<PanelColumn>,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no ticker has been joined.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows on the date axis.
    pub fn height(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[PanelColumn] {
        &self.columns
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.ticker.as_str()).collect()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.columns.iter().any(|c| c.ticker == ticker)
    }

    pub fn column(&self, ticker: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.ticker == ticker)
            .map(|c| c.values.as_slice())
    }

    /// The present cells of one column as a canonical series.
    pub fn series(&self, ticker: &str) -> Option<TickerSeries> {
        let values = self.column(ticker)?;
        Some(TickerSeries::from_points(
            ticker,
            self.dates
                .iter()
                .zip(values)
                .filter_map(|(d, v)| v.map(|v| (*d, v))),
        ))
    }

    /// Cells of row `i` in column order.
    pub fn row(&self, i: usize) -> Option<Vec<Option<f64>>> {
        (i < self.dates.len()).then(|| self.columns.iter().map(|c| c.values[i]).collect())
    }

    /// Join a series into the panel. An empty panel is seeded by the series;
    /// otherwise the series is left-joined onto the existing axis. Returns
    /// false (panel untouched) for an empty series or a ticker already present.
    pub fn join(&mut self, series: &TickerSeries) -> bool {
        if series.is_empty() || self.contains(&series.ticker) {
            return false;
        }

        if self.is_empty() {
            self.dates = series.dates().collect();
            self.columns.push(PanelColumn {
                ticker: series.ticker.clone(),
                values: series.values().map(Some).collect(),
            });
            return true;
        }

        let values = self.dates.iter().map(|d| series.get(*d)).collect();
        self.columns.push(PanelColumn {
            ticker: series.ticker.clone(),
            values,
        });
        true
    }

    /// Convert to a polars DataFrame: a `date` column plus one `Float64`
    /// column per ticker, nulls where a ticker has no value.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let days: Vec<i32> = self
            .dates
            .iter()
            .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
            .collect();

        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(Column::new("date".into(), days).cast(&DataType::Date)?);
        for col in &self.columns {
            columns.push(Column::new(col.ticker.as_str().into(), col.values.clone()));
        }
        DataFrame::new(columns)
    }
}

/// The price panel and the percent-change panel, always built in lockstep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelPair {
    pub price: Panel,
    pub percent_change: Panel,
}

impl PanelPair {
    pub fn is_empty(&self) -> bool {
        self.percent_change.is_empty()
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.percent_change.tickers()
    }

    /// Accumulate one ticker, seeding the panels if nothing has been joined yet.
    pub fn accumulate(&mut self, series: &NormalizedSeries) -> bool {
        let is_first = self.is_empty();
        let pair = std::mem::take(self);
        let (pair, joined) = accumulate(pair, series, is_first);
        *self = pair;
        joined
    }
}

/// Fold one ticker's normalized series into the panels.
///
/// The sentinel ticker and series with an empty price or percent-change half
/// are skipped. With `is_first` the series replaces the panels outright and
/// defines the date axis. Returns the panels and whether the ticker was joined.
pub fn accumulate(
    mut panels: PanelPair,
    series: &NormalizedSeries,
    is_first: bool,
) -> (PanelPair, bool) {
    if is_missing_ticker(series.ticker()) || series.is_empty() {
        return (panels, false);
    }

    if is_first {
        panels = PanelPair::default();
    } else if panels.percent_change.contains(series.ticker()) {
        return (panels, false);
    }

    let joined = panels.price.join(&series.price);
    if joined {
        panels.percent_change.join(&series.percent_change);
    }
    (panels, joined)
}

/// Options for one panel build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Maximum number of holdings considered, counting failures.
    pub nstocks: usize,
    /// Fetch the index itself first.
    pub include_index: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            nstocks: 30,
            include_index: true,
        }
    }
}

/// Result of a panel build.
#[derive(Debug, Clone, Default)]
pub struct PanelBuild {
    pub panels: PanelPair,
    /// Tickers considered, in order (index first when included).
    pub considered: Vec<String>,
    /// Tickers that yielded no usable data.
    pub skipped: Vec<String>,
}

/// Drives fetch → normalize → accumulate over an index and its holdings.
pub struct PanelAligner<'a> {
    fetcher: &'a TickerSeriesFetcher,
    normalizer: SeriesNormalizer,
    start: NaiveDate,
    end: NaiveDate,
    progress: Option<&'a dyn FetchProgress>,
}

impl<'a> PanelAligner<'a> {
    pub fn new(
        fetcher: &'a TickerSeriesFetcher,
        normalizer: SeriesNormalizer,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            fetcher,
            normalizer,
            start,
            end,
            progress: None,
        }
    }

    /// Build from textual date literals such as `"Jan 1 1990"`.
    pub fn from_literals(
        fetcher: &'a TickerSeriesFetcher,
        normalizer: SeriesNormalizer,
        start: &str,
        end: &str,
        years: &YearRange,
    ) -> Result<Self, PanelError> {
        let (start, end) = parse_range(start, end, years)?;
        Ok(Self::new(
            fetcher,
            normalizer,
            start.to_naive_date(),
            end.to_naive_date(),
        ))
    }

    pub fn with_progress(mut self, progress: &'a dyn FetchProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fetch and normalize one ticker. Failures come back as the empty pair.
    pub fn fetch_series(&self, ticker: &str) -> NormalizedSeries {
        if is_missing_ticker(ticker) {
            tracing::debug!("skipping missing-ticker placeholder");
            return NormalizedSeries::empty(ticker);
        }
        let raw = self.fetcher.fetch(ticker, self.start, self.end).into_quotes();
        if raw.is_empty() {
            tracing::warn!(ticker, "ticker could not be found in any quote source");
        }
        self.normalizer.normalize(&raw, ticker)
    }

    /// Build both panels for `index` and up to `opts.nstocks` of its holdings.
    ///
    /// Fails only when `holdings` is empty. Tickers that fail to fetch are
    /// skipped, so the result may have fewer columns than requested, or none.
    pub fn build(
        &self,
        index: &str,
        holdings: &[String],
        opts: &BuildOptions,
    ) -> Result<PanelBuild, PanelError> {
        if holdings.is_empty() {
            return Err(PanelError::EmptyHoldings);
        }

        let mut tickers: Vec<&str> = Vec::with_capacity(opts.nstocks + 1);
        if opts.include_index {
            tickers.push(index);
        }
        tickers.extend(holdings.iter().take(opts.nstocks).map(String::as_str));

        let total = tickers.len();
        let mut build = PanelBuild::default();

        for (i, ticker) in tickers.into_iter().enumerate() {
            if let Some(p) = self.progress {
                p.on_start(ticker, i, total);
            }

            let series = self.fetch_series(ticker);
            let joined = build.panels.accumulate(&series);
            if !joined {
                build.skipped.push(ticker.to_string());
            }
            build.considered.push(ticker.to_string());

            if let Some(p) = self.progress {
                p.on_complete(ticker, i, total, joined);
            }
        }

        if let Some(p) = self.progress {
            p.on_batch_complete(build.panels.price.width(), build.considered.len());
        }
        tracing::info!(
            index,
            columns = build.panels.price.width(),
            rows = build.panels.price.height(),
            skipped = build.skipped.len(),
            "panel built"
        );

        Ok(build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 6, day).unwrap()
    }

    fn normalized(ticker: &str, points: &[(u32, f64)]) -> NormalizedSeries {
        let price = TickerSeries::from_points(ticker, points.iter().map(|&(day, p)| (d(day), p)));
        let percent_change = crate::data::normalize::percent_change(&price);
        NormalizedSeries {
            price,
            percent_change,
        }
    }

    #[test]
    fn first_series_seeds_axis() {
        let mut pair = PanelPair::default();
        assert!(pair.accumulate(&normalized("AAA", &[(1, 10.0), (2, 11.0), (3, 12.0)])));
        assert_eq!(pair.price.dates(), &[d(1), d(2), d(3)]);
        assert_eq!(pair.price.column("AAA").unwrap(), &[Some(10.0), Some(11.0), Some(12.0)]);
        assert_eq!(pair.percent_change.column("AAA").unwrap()[0], Some(0.0));
    }

    #[test]
    fn later_series_left_join_onto_axis() {
        let mut pair = PanelPair::default();
        pair.accumulate(&normalized("AAA", &[(1, 10.0), (2, 11.0), (3, 12.0)]));
        pair.accumulate(&normalized("BBB", &[(2, 20.0), (3, 21.0), (4, 22.0)]));

        assert_eq!(pair.price.height(), 3, "date only in BBB must not be inserted");
        assert_eq!(pair.price.column("BBB").unwrap(), &[None, Some(20.0), Some(21.0)]);
        assert_eq!(pair.price.tickers(), vec!["AAA", "BBB"]);
    }

    #[test]
    fn sparse_first_ticker_truncates_later_history() {
        let mut pair = PanelPair::default();
        pair.accumulate(&normalized("NEW", &[(10, 5.0), (11, 5.5)]));
        pair.accumulate(&normalized(
            "OLD",
            &(1..=11).map(|day| (day, 100.0 + day as f64)).collect::<Vec<_>>(),
        ));

        assert_eq!(pair.price.dates(), &[d(10), d(11)]);
        assert_eq!(pair.price.column("OLD").unwrap(), &[Some(110.0), Some(111.0)]);
        // Percent change of OLD is relative to its own first date, not the axis start.
        let pc = pair.percent_change.column("OLD").unwrap();
        assert!((pc[0].unwrap() - 9.0 / 101.0 * 100.0).abs() < 1e-12);
    }

    #[test]
    fn empty_and_sentinel_series_are_skipped() {
        let mut pair = PanelPair::default();
        pair.accumulate(&normalized("AAA", &[(1, 10.0)]));
        let before = pair.clone();

        assert!(!pair.accumulate(&NormalizedSeries::empty("BAD")));
        assert!(!pair.accumulate(&normalized("nan", &[(1, 1.0)])));
        assert!(!pair.accumulate(&normalized("ZERO", &[(1, 0.0), (2, 1.0)])));
        assert_eq!(pair, before);
    }

    #[test]
    fn duplicate_ticker_not_joined_twice() {
        let mut pair = PanelPair::default();
        pair.accumulate(&normalized("AAA", &[(1, 10.0)]));
        assert!(!pair.accumulate(&normalized("AAA", &[(1, 10.0)])));
        assert_eq!(pair.price.width(), 1);
    }

    #[test]
    fn accumulate_with_is_first_replaces_panels() {
        let (pair, _) = accumulate(PanelPair::default(), &normalized("AAA", &[(1, 1.0)]), true);
        let (pair, joined) = accumulate(pair, &normalized("BBB", &[(2, 2.0), (3, 3.0)]), true);
        assert!(joined);
        assert_eq!(pair.price.tickers(), vec!["BBB"]);
        assert_eq!(pair.price.height(), 2);
    }

    #[test]
    fn series_roundtrips_present_cells() {
        let mut pair = PanelPair::default();
        pair.accumulate(&normalized("AAA", &[(1, 10.0), (2, 11.0)]));
        pair.accumulate(&normalized("BBB", &[(2, 20.0)]));
        let s = pair.price.series("BBB").unwrap();
        assert_eq!(s.points(), &[(d(2), 20.0)]);
        assert_eq!(pair.price.row(0).unwrap(), vec![Some(10.0), None]);
        assert!(pair.price.row(5).is_none());
    }

    #[test]
    fn dataframe_handoff() {
        let mut pair = PanelPair::default();
        pair.accumulate(&normalized("AAA", &[(1, 10.0), (2, 11.0)]));
        pair.accumulate(&normalized("BBB", &[(2, 20.0)]));

        let df = pair.price.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        let bbb = df.column("BBB").unwrap().f64().unwrap();
        assert_eq!(bbb.get(0), None);
        assert_eq!(bbb.get(1), Some(20.0));
    }

    #[test]
    fn empty_panel_dataframe_has_only_date() {
        let df = Panel::new().to_dataframe().unwrap();
        assert_eq!(df.width(), 1);
        assert_eq!(df.height(), 0);
    }
}
