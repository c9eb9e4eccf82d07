// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : ticker_sync — ticker data synchronization controller in Rust
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Keeps one instrument's fundamentals and price history in sync with
          the analysis backend: debounced symbol input, sequence-gated
          fetches, periodic refresh, and a subscribable view state.
=============================================================================
*/
use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use url::Url;

use crate::domain::Symbol;
use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:5003";
pub const DEFAULT_TICKER: &str = "AAPL";
pub const DEFAULT_FETCH_LIMIT: u32 = 80;

/// Process-level settings (read once at startup)
#[derive(Clone, Debug)]
pub struct Args {
    pub api_url: Url,
    pub initial_symbol: Symbol,
    pub fetch_limit: u32,
    pub request_timeout: Duration,

    // files/metrics
    pub metrics_port: Option<u16>,
    pub record_file: Option<String>,
}

/// Controller timing + projection sizes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub settle: Duration,
    pub debounce_enabled: bool,
    pub poll: Duration,
    pub table_rows: usize,
    pub chart_rows: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(1000),
            debounce_enabled: true,
            poll: Duration::from_millis(300_000),
            table_rows: 20,
            chart_rows: 20,
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::ApiUrl {
        value: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::ApiScheme(other.to_string())),
    }
}

/// Builds both config blocks from an arbitrary key lookup.
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<(Args, SyncConfig), ConfigError> {
    // API_URL, or the frontend-style VITE_API_URL
    let raw_url = lookup("API_URL")
        .or_else(|| lookup("VITE_API_URL"))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api_url = parse_api_url(&raw_url)?;

    let initial_symbol = Symbol::normalize(&lookup("TICKER").unwrap_or_else(|| DEFAULT_TICKER.to_string()));

    let args = Args {
        api_url,
        initial_symbol,
        fetch_limit: parse_or(&lookup, "FETCH_LIMIT", DEFAULT_FETCH_LIMIT),
        request_timeout: Duration::from_millis(parse_or(&lookup, "REQUEST_TIMEOUT_MS", 10_000)),
        metrics_port: lookup("METRICS_PORT").and_then(|s| s.trim().parse().ok()),
        record_file: lookup("RECORD_FILE").filter(|s| !s.trim().is_empty()),
    };

    let d = SyncConfig::default();
    let sync = SyncConfig {
        settle: Duration::from_millis(parse_or(&lookup, "SETTLE_MS", d.settle.as_millis() as u64)),
        debounce_enabled: lookup("DEBOUNCE_ENABLED")
            .and_then(|s| parse_flag(&s))
            .unwrap_or(d.debounce_enabled),
        // a zero period would make tokio's interval panic
        poll: Duration::from_millis(parse_or(&lookup, "POLL_MS", d.poll.as_millis() as u64).max(1)),
        table_rows: parse_or(&lookup, "TABLE_ROWS", d.table_rows),
        chart_rows: parse_or(&lookup, "CHART_ROWS", d.chart_rows),
    };

    Ok((args, sync))
}

pub fn load() -> Result<(Args, SyncConfig), ConfigError> {
    // .env is optional
    let _ = dotenv();
    load_from(|k| env::var(k).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let (args, sync) = load_from(lookup(&[])).unwrap();
        assert_eq!(args.api_url.as_str(), "http://localhost:5003/");
        assert_eq!(args.initial_symbol.as_str(), "AAPL");
        assert_eq!(args.fetch_limit, 80);
        assert_eq!(args.metrics_port, None);
        assert_eq!(args.record_file, None);
        assert_eq!(sync, SyncConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let (args, sync) = load_from(lookup(&[
            ("VITE_API_URL", "https://api.example.com/base"),
            ("TICKER", " msft "),
            ("SETTLE_MS", "250"),
            ("DEBOUNCE_ENABLED", "off"),
            ("POLL_MS", "60000"),
            ("TABLE_ROWS", "10"),
            ("CHART_ROWS", "80"),
            ("METRICS_PORT", "9899"),
        ]))
        .unwrap();
        assert_eq!(args.api_url.host_str(), Some("api.example.com"));
        assert_eq!(args.initial_symbol.as_str(), "MSFT");
        assert_eq!(args.metrics_port, Some(9899));
        assert_eq!(sync.settle, Duration::from_millis(250));
        assert!(!sync.debounce_enabled);
        assert_eq!(sync.poll, Duration::from_secs(60));
        assert_eq!((sync.table_rows, sync.chart_rows), (10, 80));
    }

    #[test]
    fn api_url_wins_over_vite_fallback() {
        let (args, _) = load_from(lookup(&[
            ("API_URL", "http://backend:5003"),
            ("VITE_API_URL", "http://other:1"),
        ]))
        .unwrap();
        assert_eq!(args.api_url.host_str(), Some("backend"));
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let (_, sync) = load_from(lookup(&[("SETTLE_MS", "soon"), ("DEBOUNCE_ENABLED", "maybe")])).unwrap();
        assert_eq!(sync.settle, Duration::from_millis(1000));
        assert!(sync.debounce_enabled);
    }

    #[test]
    fn bad_api_url_is_an_error() {
        assert!(matches!(
            load_from(lookup(&[("API_URL", "not a url")])),
            Err(ConfigError::ApiUrl { .. })
        ));
        assert!(matches!(
            load_from(lookup(&[("API_URL", "ftp://files.example.com")])),
            Err(ConfigError::ApiScheme(_))
        ));
    }
}
