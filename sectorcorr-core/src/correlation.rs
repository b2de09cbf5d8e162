//! Correlation over the percent-change panel.
//!
//! Pure functions: panel in, matrix out. Each pair uses only the rows where
//! both columns are present (pairwise-complete observations). A pair with
//! fewer than two joint rows, or zero variance on those rows, has no value.

use crate::data::normalize::TickerSeries;
use crate::panel::Panel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Square, symmetric correlation matrix in panel column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    tickers: Vec<String>,
    /// Row-major N×N grid; empty for a degenerate matrix.
    values: Vec<Vec<Option<f64>>>,
}

/// One off-diagonal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub a: String,
    pub b: String,
    pub value: f64,
}

impl CorrelationMatrix {
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Fewer than two columns: there are no pairs to compare.
    pub fn is_degenerate(&self) -> bool {
        self.tickers.len() < 2
    }

    fn index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let (i, j) = (self.index(a)?, self.index(b)?);
        self.values.get(i)?.get(j).copied().flatten()
    }

    pub fn row(&self, ticker: &str) -> Option<&[Option<f64>]> {
        let i = self.index(ticker)?;
        self.values.get(i).map(Vec::as_slice)
    }

    /// Upper-triangle entries that have a value, strongest first.
    pub fn pairs(&self) -> Vec<CorrelationPair> {
        let mut pairs = Vec::new();
        for (i, row) in self.values.iter().enumerate() {
            for (j, v) in row.iter().enumerate().skip(i + 1) {
                if let Some(value) = v {
                    pairs.push(CorrelationPair {
                        a: self.tickers[i].clone(),
                        b: self.tickers[j].clone(),
                        value: *value,
                    });
                }
            }
        }
        pairs.sort_by(|x, y| y.value.total_cmp(&x.value));
        pairs
    }

    /// The other ticker with the highest correlation to `ticker`.
    pub fn most_correlated_with(&self, ticker: &str) -> Option<(&str, f64)> {
        let i = self.index(ticker)?;
        self.values
            .get(i)?
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter_map(|(j, v)| v.map(|v| (self.tickers[j].as_str(), v)))
            .max_by(|x, y| x.1.total_cmp(&y.1))
    }
}

/// Deviations from the mean, scaled so the largest has magnitude 1.
///
/// Pearson is scale-invariant, so scaling keeps sums of squares in range for
/// any finite input. `None` for non-finite input or zero spread.
fn scaled_deviations(v: &[f64]) -> Option<Vec<f64>> {
    let peak = v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    if !peak.is_finite() || peak == 0.0 {
        return None;
    }

    let scaled: Vec<f64> = v.iter().map(|x| x / peak).collect();
    let mean = scaled.iter().sum::<f64>() / scaled.len() as f64;
    let dev: Vec<f64> = scaled.iter().map(|x| x - mean).collect();

    let spread = dev.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
    if spread == 0.0 {
        return None;
    }
    Some(dev.into_iter().map(|d| d / spread).collect())
}

/// Pearson correlation of two equal-length samples.
///
/// `None` for fewer than two observations, zero variance in either sample,
/// or non-finite input.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let dx = scaled_deviations(x)?;
    let dy = scaled_deviations(y)?;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in dx.iter().zip(&dy) {
        cov += a * b;
        var_x += a * a;
        var_y += b * b;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Pearson over rows where both columns are present.
pub fn pairwise_complete(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let (x, y): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    pearson(&x, &y)
}

/// Full pairwise-complete correlation matrix of a panel.
pub fn correlate(panel: &Panel) -> CorrelationMatrix {
    let tickers: Vec<String> = panel.tickers().into_iter().map(String::from).collect();
    if tickers.len() < 2 {
        return CorrelationMatrix {
            tickers,
            values: Vec::new(),
        };
    }

    let cols = panel.columns();
    let n = cols.len();
    let mut values = vec![vec![None; n]; n];

    for i in 0..n {
        // Diagonal is exactly 1 whenever the column has any variance.
        values[i][i] = pairwise_complete(&cols[i].values, &cols[i].values).map(|_| 1.0);
        for j in (i + 1)..n {
            let r = pairwise_complete(&cols[i].values, &cols[j].values);
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    CorrelationMatrix { tickers, values }
}

/// One output of a rolling correlation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint {
    /// Last date of the window.
    pub date: NaiveDate,
    /// `None` when the window has zero variance in either series.
    pub value: Option<f64>,
}

/// Forward-only rolling correlation between two series on their shared dates.
///
/// Each point is recomputed from its trailing window; nothing is emitted
/// until `window` shared observations exist.
#[derive(Debug, Clone)]
pub struct RollingCorrelation {
    dates: Vec<NaiveDate>,
    a: Vec<f64>,
    b: Vec<f64>,
    window: usize,
    next: usize,
}

impl RollingCorrelation {
    pub fn new(a: &TickerSeries, b: &TickerSeries, window: usize) -> Self {
        let (pa, pb) = (a.points(), b.points());
        let (mut i, mut j) = (0, 0);
        let mut dates = Vec::new();
        let mut xa = Vec::new();
        let mut xb = Vec::new();

        while i < pa.len() && j < pb.len() {
            match pa[i].0.cmp(&pb[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    dates.push(pa[i].0);
                    xa.push(pa[i].1);
                    xb.push(pb[j].1);
                    i += 1;
                    j += 1;
                }
            }
        }

        Self {
            dates,
            a: xa,
            b: xb,
            window,
            next: 0,
        }
    }

    /// Number of shared dates between the two series.
    pub fn shared_len(&self) -> usize {
        self.dates.len()
    }

    fn remaining(&self) -> usize {
        if self.window < 2 {
            return 0;
        }
        (self.dates.len() + 1)
            .saturating_sub(self.window)
            .saturating_sub(self.next)
    }
}

impl Iterator for RollingCorrelation {
    type Item = RollingPoint;

    fn next(&mut self) -> Option<RollingPoint> {
        if self.remaining() == 0 {
            return None;
        }
        let lo = self.next;
        let hi = lo + self.window;
        self.next += 1;
        Some(RollingPoint {
            date: self.dates[hi - 1],
            value: pearson(&self.a[lo..hi], &self.b[lo..hi]),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for RollingCorrelation {}

/// Rolling correlation between two panel columns. `None` if either is unknown.
pub fn rolling_correlate(
    panel: &Panel,
    a: &str,
    b: &str,
    window: usize,
) -> Option<RollingCorrelation> {
    Some(RollingCorrelation::new(
        &panel.series(a)?,
        &panel.series(b)?,
        window,
    ))
}
