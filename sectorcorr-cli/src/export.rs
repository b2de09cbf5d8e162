//! Artifact export — panels, correlation matrix and run summary as CSV/JSON.
//!
//! Missing panel cells are written as empty CSV fields.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sectorcorr_core::correlation::{CorrelationMatrix, CorrelationPair, RollingPoint};
use sectorcorr_core::panel::Panel;
use serde::{Deserialize, Serialize};

/// Machine-readable description of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub etf: String,
    pub start: String,
    pub end: String,
    pub source: String,
    /// Tickers considered, in fetch order.
    pub considered: Vec<String>,
    /// Tickers that made it into the panel.
    pub joined: Vec<String>,
    pub skipped: Vec<String>,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub top_pairs: Vec<CorrelationPair>,
}

fn cell(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// One row per panel date: `date,<ticker>...`.
pub fn export_panel_csv(panel: &Panel) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["date".to_string()];
    header.extend(panel.tickers().into_iter().map(String::from));
    wtr.write_record(&header)?;

    for (i, date) in panel.dates().iter().enumerate() {
        let mut record = vec![date.to_string()];
        record.extend(panel.columns().iter().map(|c| cell(c.values[i])));
        wtr.write_record(&record)?;
    }

    finish(wtr)
}

/// Square matrix with tickers as both header row and first column.
pub fn export_correlation_csv(matrix: &CorrelationMatrix) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec![String::new()];
    header.extend(matrix.tickers().iter().cloned());
    wtr.write_record(&header)?;

    for a in matrix.tickers() {
        let mut record = vec![a.clone()];
        record.extend(matrix.tickers().iter().map(|b| cell(matrix.get(a, b))));
        wtr.write_record(&record)?;
    }

    finish(wtr)
}

pub fn export_rolling_csv(points: &[RollingPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "correlation"])?;
    for p in points {
        wtr.write_record([p.date.to_string(), cell(p.value)])?;
    }
    finish(wtr)
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_summary_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize run summary to JSON")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Everything one run produces.
pub struct Artifacts<'a> {
    pub price: &'a Panel,
    pub percent_change: &'a Panel,
    pub correlation: &'a CorrelationMatrix,
    /// Pair and points of an optional rolling correlation.
    pub rolling: Option<(&'a str, &'a str, &'a [RollingPoint])>,
    pub summary: &'a RunSummary,
}

/// Write the artifact set into `output_dir`, creating it if needed.
///
/// Files: `prices.csv`, `percent_change.csv`, `correlation.csv`,
/// `summary.json`, and `rolling_<a>_<b>.csv` when a rolling pair is given.
pub fn save_artifacts(artifacts: &Artifacts<'_>, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let write = |name: &str, body: String| -> Result<()> {
        let path = output_dir.join(name);
        std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
    };

    write("prices.csv", export_panel_csv(artifacts.price)?)?;
    write("percent_change.csv", export_panel_csv(artifacts.percent_change)?)?;
    write("correlation.csv", export_correlation_csv(artifacts.correlation)?)?;
    if let Some((a, b, points)) = artifacts.rolling {
        write(&format!("rolling_{a}_{b}.csv"), export_rolling_csv(points)?)?;
    }
    write("summary.json", export_summary_json(artifacts.summary)?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sectorcorr_core::correlation::correlate;
    use sectorcorr_core::data::{NormalizedSeries, TickerSeries};
    use sectorcorr_core::panel::PanelPair;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 1, day).unwrap()
    }

    fn pair() -> PanelPair {
        let mut pair = PanelPair::default();
        for (t, pts) in [
            ("AAA", vec![(d(4), 10.0), (d(5), 11.0), (d(6), 12.0)]),
            ("BBB", vec![(d(4), 20.0), (d(6), 18.0)]),
        ] {
            let s = TickerSeries::from_points(t, pts);
            pair.accumulate(&NormalizedSeries {
                price: s.clone(),
                percent_change: s,
            });
        }
        pair
    }

    fn summary() -> RunSummary {
        RunSummary {
            etf: "IYR".into(),
            start: "Jan 1 2016".into(),
            end: "Dec 1 2016".into(),
            source: "yahoo_finance".into(),
            considered: vec!["AAA".into(), "BBB".into(), "nan".into()],
            joined: vec!["AAA".into(), "BBB".into()],
            skipped: vec!["nan".into()],
            rows: 3,
            first_date: Some(d(4)),
            last_date: Some(d(6)),
            top_pairs: vec![],
        }
    }

    #[test]
    fn panel_csv_leaves_missing_cells_blank() {
        let csv = export_panel_csv(&pair().price).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,AAA,BBB");
        assert_eq!(lines[1], "2016-01-04,10.000000,20.000000");
        assert_eq!(lines[2], "2016-01-05,11.000000,");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn correlation_csv_is_square() {
        let m = correlate(&pair().percent_change);
        let csv = export_correlation_csv(&m).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], ",AAA,BBB");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("AAA,1.000000,"));
    }

    #[test]
    fn empty_panel_exports_header_only() {
        let csv = export_panel_csv(&Panel::new()).unwrap();
        assert_eq!(csv.trim(), "date");
    }

    #[test]
    fn summary_json_roundtrip() {
        let json = export_summary_json(&summary()).unwrap();
        let back: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary());
    }

    #[test]
    fn save_artifacts_writes_all_files() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("run");
        let pair = pair();
        let m = correlate(&pair.percent_change);
        let points = [RollingPoint {
            date: d(6),
            value: Some(-1.0),
        }];
        let s = summary();

        save_artifacts(
            &Artifacts {
                price: &pair.price,
                percent_change: &pair.percent_change,
                correlation: &m,
                rolling: Some(("AAA", "BBB", &points)),
                summary: &s,
            },
            &out,
        )
        .unwrap();

        for name in [
            "prices.csv",
            "percent_change.csv",
            "correlation.csv",
            "rolling_AAA_BBB.csv",
            "summary.json",
        ] {
            assert!(out.join(name).exists(), "missing {name}");
        }
        let rolling = std::fs::read_to_string(out.join("rolling_AAA_BBB.csv")).unwrap();
        assert_eq!(rolling.lines().nth(1), Some("2016-01-06,-1.000000"));
    }
}
