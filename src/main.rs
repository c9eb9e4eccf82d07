// ===============================
// src/main.rs
// ===============================
/*
 # run against a local analysis backend, type tickers on stdin
 API_URL=http://localhost:5003 RUST_LOG=ticker_sync=debug cargo run

 # metrics
 METRICS_PORT=9898 cargo run
 curl -s localhost:9898/metrics | egrep '^(fetch_completions_total|fetch_errors_total)'
*/
/*
=============================================================================
Project : ticker_sync — ticker data synchronization controller in Rust
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Keeps one instrument's fundamentals and price history in sync with
          the analysis backend: debounced symbol input, sequence-gated
          fetches, periodic refresh, and a subscribable view state.
=============================================================================
*/
mod config;
mod console;
mod controller;
mod debounce;
mod dispatcher;
mod domain;
mod error;
mod metrics;
mod poller;
mod projection;
mod recorder;
mod source;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::controller::Controller;
use crate::domain::Event;
use crate::source::HttpSource;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Config ----
    let (args, sync_cfg) = match config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "config");
            std::process::exit(2);
        }
    };
    info!(
        api_url = %args.api_url,
        symbol = %args.initial_symbol,
        limit = args.fetch_limit,
        settle_ms = sync_cfg.settle.as_millis() as u64,
        debounce = sync_cfg.debounce_enabled,
        poll_ms = sync_cfg.poll.as_millis() as u64,
        table_rows = sync_cfg.table_rows,
        chart_rows = sync_cfg.chart_rows,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = args.metrics_port {
        if let Err(e) = metrics::serve_metrics(port) {
            error!(?e, port, "metrics server not started");
        }
    }

    // ---- Recorder (optional) ----
    let (rec_tx, rec_task) = match args.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(1024);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    };

    // ---- Backend source ----
    let source = match HttpSource::new(args.api_url.clone(), args.fetch_limit, args.request_timeout) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(%e, "http client");
            std::process::exit(1);
        }
    };

    // ---- Controller + console ----
    let mut handle = Controller::spawn(&sync_cfg, args.initial_symbol.clone(), source, rec_tx);
    tokio::spawn(console::render(handle.subscribe(), sync_cfg.clone()));

    let stdin_closed = tokio::select! {
        _ = console::read_input(&handle) => true,
        _ = tokio::signal::ctrl_c() => false,
    };
    if stdin_closed {
        info!("no more input, still polling (ctrl-c to quit)");
        let _ = tokio::signal::ctrl_c().await;
    }

    handle.dispose().await;
    let last = handle.state();
    info!(
        symbol = %last.committed_symbol,
        last_accepted = last.last_accepted_sequence,
        has_data = last.snapshot.is_some(),
        "shutdown"
    );
    // controller dropped its sender; let the journal flush
    if let Some(task) = rec_task {
        let _ = task.await;
    }
}
