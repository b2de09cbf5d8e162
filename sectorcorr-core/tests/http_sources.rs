//! Quote and holdings sources against a local HTTP server.

use chrono::NaiveDate;
use mockito::Matcher;
use sectorcorr_core::config::HttpSettings;
use sectorcorr_core::data::{
    CsvQuoteSource, FetchError, QuoteSource, QuoteValue, TickerSeriesFetcher, YahooChartSource,
};
use sectorcorr_core::holdings::{HoldingsSource, HtmlTableHoldings};

const CHART_BODY: &str = r#"{"chart":{"result":[{
    "timestamp":[1451916000,1452002400,1452088800],
    "indicators":{
        "quote":[{"open":[200.0,201.0,199.0],"high":[202.0,203.0,200.0],
                  "low":[199.0,200.0,197.0],"close":[201.0,202.0,198.0],
                  "volume":[1000,1100,900]}],
        "adjclose":[{"adjclose":[190.0,191.0,null]}]}}],
    "error":null}}"#;

const CSV_BODY: &str = "Date,Open,High,Low,Close,Volume\n\
    6-Jan-16,80.0,81.0,79.0,80.5,100\n\
    5-Jan-16,79.0,80.0,78.0,79.5,100\n\
    4-Jan-16,78.0,79.0,77.0,78.5,100\n";

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, day).unwrap()
}

fn csv_template(server: &mockito::ServerGuard) -> String {
    format!(
        "{}/historical?q={{symbol}}&startdate={{start}}&enddate={{end}}&output=csv",
        server.url()
    )
}

#[test]
fn yahoo_source_parses_chart_payload() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/v8/finance/chart/SPY")
        .match_query(Matcher::UrlEncoded("interval".into(), "1d".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(CHART_BODY)
        .create();

    let base = format!("{}/v8/finance/chart", server.url());
    let source = YahooChartSource::with_base_url(&HttpSettings::default(), &base).unwrap();
    let rows = source.fetch("SPY", jan(4), jan(6)).unwrap();

    mock.assert();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].date, jan(4));
    assert_eq!(rows[0].adj_close, QuoteValue::Number(190.0));
    assert_eq!(rows[2].adj_close, QuoteValue::Missing);
    assert_eq!(rows[2].close, QuoteValue::Number(198.0));
}

#[test]
fn yahoo_404_is_symbol_not_found() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/v8/finance/chart/ZZZZ")
        .match_query(Matcher::Any)
        .with_status(404)
        .create();

    let base = format!("{}/v8/finance/chart", server.url());
    let source = YahooChartSource::with_base_url(&HttpSettings::default(), &base).unwrap();
    let err = source.fetch("ZZZZ", jan(4), jan(6)).unwrap_err();
    assert!(matches!(err, FetchError::SymbolNotFound { .. }));
}

#[test]
fn csv_source_qualifies_symbol_with_exchange() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/historical")
        .match_query(Matcher::UrlEncoded("q".into(), "NYSE:XOM".into()))
        .with_status(200)
        .with_body(CSV_BODY)
        .create();

    let settings = HttpSettings::default();
    let source = CsvQuoteSource::new(&settings, &csv_template(&server), Some("NYSE")).unwrap();
    let rows = source.fetch("XOM", jan(4), jan(6)).unwrap();

    mock.assert();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].date, jan(6));
    assert_eq!(rows[2].close.as_f64(), Some(78.5));
}

#[test]
fn fetcher_falls_back_across_exchanges() {
    let mut server = mockito::Server::new();
    let nasdaq = server
        .mock("GET", "/historical")
        .match_query(Matcher::UrlEncoded("q".into(), "NASDAQ:XOM".into()))
        .with_status(400)
        .create();
    let nyse = server
        .mock("GET", "/historical")
        .match_query(Matcher::UrlEncoded("q".into(), "NYSE:XOM".into()))
        .with_status(200)
        .with_body(CSV_BODY)
        .create();

    let http = HttpSettings::default();
    let template = csv_template(&server);
    let fetcher = TickerSeriesFetcher::new(vec![
        Box::new(CsvQuoteSource::new(&http, &template, Some("NASDAQ")).unwrap())
            as Box<dyn QuoteSource>,
        Box::new(CsvQuoteSource::new(&http, &template, Some("NYSE")).unwrap()),
    ]);

    let got = fetcher.fetch("XOM", jan(4), jan(6));
    nasdaq.assert();
    nyse.assert();
    assert_eq!(got.into_quotes().len(), 3);
}

#[test]
fn fetcher_absorbs_server_error() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/v8/finance/chart/SPY")
        .match_query(Matcher::Any)
        .with_status(500)
        .create();

    let base = format!("{}/v8/finance/chart", server.url());
    let source = YahooChartSource::with_base_url(&HttpSettings::default(), &base).unwrap();
    let fetcher = TickerSeriesFetcher::new(vec![Box::new(source) as Box<dyn QuoteSource>]);

    assert!(fetcher.fetch("SPY", jan(4), jan(6)).is_empty());
    mock.assert();
}

#[test]
fn html_holdings_page_is_scraped() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/etf/IYR")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(
            "<html><body><table><tr><th>Symbol</th><th>Name</th></tr>\
             <tr><td>SPG</td><td>Simon</td></tr>\
             <tr><td>AMT</td><td>American Tower</td></tr></table></body></html>",
        )
        .create();

    let template = format!("{}/etf/{{etf}}", server.url());
    let source = HtmlTableHoldings::new(&HttpSettings::default(), &template).unwrap();
    assert_eq!(source.holdings("IYR").unwrap(), vec!["SPG", "AMT"]);
}
