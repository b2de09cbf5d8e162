//! SectorCorr CLI — ETF holdings correlation commands.
//!
//! Commands:
//! - `analyze` — fetch an ETF and its holdings, align them, and correlate
//! - `watchlists` — print the configured sector and broad ETF watchlists
//! - `default-config` — print the default configuration as TOML

mod export;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sectorcorr_core::config::{AnalysisConfig, SourceKind};
use sectorcorr_core::correlation::{correlate, rolling_correlate, CorrelationMatrix, RollingPoint};
use sectorcorr_core::data::{SeriesNormalizer, StdoutProgress};
use sectorcorr_core::holdings::{HoldingsSource, HtmlTableHoldings};
use sectorcorr_core::panel::{PanelAligner, PanelBuild};
use std::path::PathBuf;

use crate::export::{save_artifacts, Artifacts, RunSummary};

#[derive(Parser)]
#[command(
    name = "sectorcorr",
    about = "SectorCorr CLI — price correlation between an ETF and its holdings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Yahoo,
    Csv,
}

impl From<SourceArg> for SourceKind {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Yahoo => SourceKind::Yahoo,
            SourceArg::Csv => SourceKind::Csv,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build price and percent-change panels for an ETF and correlate them.
    Analyze {
        /// Path to a TOML config file. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// ETF symbol (e.g., IYR).
        #[arg(long)]
        etf: Option<String>,

        /// Comma-separated holdings. Scraped from the holdings page when omitted.
        #[arg(long, value_delimiter = ',')]
        holdings: Option<Vec<String>>,

        /// Maximum number of holdings to consider.
        #[arg(long)]
        nstocks: Option<usize>,

        /// Leave the ETF itself out of the panel.
        #[arg(long, default_value_t = false)]
        no_index: bool,

        /// Start date literal (e.g., "Jan 1 1990").
        #[arg(long)]
        start: Option<String>,

        /// End date literal (e.g., "Dec 1 2016").
        #[arg(long)]
        end: Option<String>,

        /// Quote source.
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Rolling correlation for a pair of tickers, e.g. SPG,EQIX.
        #[arg(long)]
        rolling: Option<String>,

        /// Rolling window length in observations.
        #[arg(long)]
        window: Option<usize>,

        /// Number of top correlated pairs to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Directory for CSV/JSON artifacts.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the sector and broad ETF watchlists.
    Watchlists {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            config,
            etf,
            holdings,
            nstocks,
            no_index,
            start,
            end,
            source,
            rolling,
            window,
            top,
            out,
        } => {
            let mut cfg = load_config(config)?;
            if let Some(etf) = etf {
                cfg.etf = etf;
            }
            if let Some(n) = nstocks {
                cfg.nstocks = n;
            }
            if no_index {
                cfg.include_index = false;
            }
            if let Some(s) = start {
                cfg.start_date = s;
            }
            if let Some(e) = end {
                cfg.end_date = e;
            }
            if let Some(s) = source {
                cfg.source.kind = s.into();
            }
            if let Some(w) = window {
                cfg.rolling_window = w;
            }
            cfg.validate()?;

            let rolling = rolling.as_deref().map(parse_pair).transpose()?;
            run_analyze(&cfg, holdings, rolling, top, out)
        }
        Commands::Watchlists { config } => {
            let cfg = load_config(config)?;
            println!("Sector: {}", cfg.watchlists.sector.join(" "));
            println!("Broad:  {}", cfg.watchlists.broad.join(" "));
            Ok(())
        }
        Commands::DefaultConfig => {
            print!("{}", AnalysisConfig::default().to_toml()?);
            Ok(())
        }
    }
}

// Logs go to stderr so stdout stays clean for reports.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init()
}

fn load_config(path: Option<PathBuf>) -> Result<AnalysisConfig> {
    match path {
        Some(p) => AnalysisConfig::from_file(&p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn parse_pair(s: &str) -> Result<(String, String)> {
    match s.split_once(',') {
        Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            Ok((a.trim().to_string(), b.trim().to_string()))
        }
        _ => bail!("--rolling expects two tickers separated by a comma, got '{s}'"),
    }
}

fn run_analyze(
    cfg: &AnalysisConfig,
    holdings: Option<Vec<String>>,
    rolling: Option<(String, String)>,
    top: usize,
    out: Option<PathBuf>,
) -> Result<()> {
    let (start, end) = cfg.date_range()?;

    let holdings = match holdings {
        Some(list) => list,
        None => HtmlTableHoldings::new(&cfg.http, &cfg.holdings_url_template)?
            .holdings(&cfg.etf)
            .with_context(|| format!("failed to load holdings for {}", cfg.etf))?,
    };

    let fetcher = cfg.fetcher()?;
    let progress = StdoutProgress;
    let aligner = PanelAligner::new(
        &fetcher,
        SeriesNormalizer::new(cfg.price_field()),
        start.to_naive_date(),
        end.to_naive_date(),
    )
    .with_progress(&progress);

    let build = aligner.build(&cfg.etf, &holdings, &cfg.build_options())?;
    let matrix = correlate(&build.panels.percent_change);

    let rolling_points: Option<(String, String, Vec<RollingPoint>)> = match rolling {
        Some((a, b)) => {
            let Some(iter) =
                rolling_correlate(&build.panels.percent_change, &a, &b, cfg.rolling_window)
            else {
                bail!("rolling pair {a},{b} is not in the panel");
            };
            let points = iter.collect();
            Some((a, b, points))
        }
        None => None,
    };

    let summary = RunSummary {
        etf: cfg.etf.clone(),
        start: start.to_string(),
        end: end.to_string(),
        source: fetcher.source_names().join(","),
        considered: build.considered.clone(),
        joined: build
            .panels
            .tickers()
            .into_iter()
            .map(String::from)
            .collect(),
        skipped: build.skipped.clone(),
        rows: build.panels.price.height(),
        first_date: build.panels.price.dates().first().copied(),
        last_date: build.panels.price.dates().last().copied(),
        top_pairs: matrix.pairs().into_iter().take(top).collect(),
    };

    print_summary(&summary, &build);
    if build.panels.is_empty() {
        tracing::warn!(etf = %cfg.etf, "no usable price data; nothing to correlate");
    } else if matrix.is_degenerate() {
        println!("Only one series joined; correlation needs at least two.");
    } else {
        print_matrix(&matrix);
        print_top_pairs(&summary);
    }
    if let Some((a, b, points)) = &rolling_points {
        print_rolling(a, b, cfg.rolling_window, points);
    }

    if let Some(dir) = out {
        save_artifacts(
            &Artifacts {
                price: &build.panels.price,
                percent_change: &build.panels.percent_change,
                correlation: &matrix,
                rolling: rolling_points
                    .as_ref()
                    .map(|(a, b, p)| (a.as_str(), b.as_str(), p.as_slice())),
                summary: &summary,
            },
            &dir,
        )?;
        println!("Artifacts saved to: {}", dir.display());
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, build: &PanelBuild) {
    println!();
    println!("=== {} ===", summary.etf);
    println!("Period:      {} to {}", summary.start, summary.end);
    println!("Source:      {}", summary.source);
    println!(
        "Tickers:     {} joined / {} considered",
        summary.joined.len(),
        summary.considered.len()
    );
    if !build.skipped.is_empty() {
        println!("Skipped:     {}", build.skipped.join(" "));
    }
    match (summary.first_date, summary.last_date) {
        (Some(first), Some(last)) => {
            println!("Rows:        {} ({first} to {last})", summary.rows)
        }
        _ => println!("Rows:        0"),
    }
    println!();
}

fn print_matrix(matrix: &CorrelationMatrix) {
    let tickers = matrix.tickers();
    print!("{:<8}", "");
    for t in tickers {
        print!("{t:>8}");
    }
    println!();
    for a in tickers {
        print!("{a:<8}");
        for b in tickers {
            match matrix.get(a, b) {
                Some(v) => print!("{v:>8.2}"),
                None => print!("{:>8}", "-"),
            }
        }
        println!();
    }
    println!();
}

fn print_top_pairs(summary: &RunSummary) {
    println!("--- Top pairs ---");
    for p in &summary.top_pairs {
        println!("{:<8} {:<8} {:>7.3}", p.a, p.b, p.value);
    }
    println!();
}

fn print_rolling(a: &str, b: &str, window: usize, points: &[RollingPoint]) {
    let valid: Vec<f64> = points.iter().filter_map(|p| p.value).collect();
    println!("--- Rolling {a}/{b} (window {window}) ---");
    if valid.is_empty() {
        println!("Not enough shared observations.");
        return;
    }
    let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
    let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    println!("Points:      {}", points.len());
    println!("Mean:        {mean:.3}");
    println!("Range:       {min:.3} to {max:.3}");
    if let Some(last) = points.last() {
        match last.value {
            Some(v) => println!("Latest:      {v:.3} ({})", last.date),
            None => println!("Latest:      - ({})", last.date),
        }
    }
    println!();
}
