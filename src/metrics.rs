// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Input / commit --------
pub static RAW_INPUTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("raw_inputs_total", "raw symbol values received").unwrap());

pub static COMMITS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("commits_total", "symbols committed by the debounce gate").unwrap());

// -------- Fetch lifecycle --------
pub static FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fetches_dispatched_total", "fetches dispatched (label: trigger)"),
        &["trigger"],
    )
    .unwrap()
});

pub static COMPLETIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fetch_completions_total", "fetch completions (label: outcome)"),
        &["outcome"],
    )
    .unwrap()
});

pub static FETCH_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fetch_errors_total", "failed fetches by kind, superseded ones included"),
        &["kind"],
    )
    .unwrap()
});

pub static IN_FLIGHT: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("fetches_in_flight", "fetches awaiting a response").unwrap());

pub static FETCH_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("fetch_latency_ms", "backend round trip (ms)")
            .buckets(vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0]),
    )
    .unwrap()
});

pub static LAST_ACCEPTED_SEQ: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("last_accepted_sequence", "sequence of the last accepted outcome").unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(RAW_INPUTS.clone())),
        REGISTRY.register(Box::new(COMMITS.clone())),
        REGISTRY.register(Box::new(FETCHES.clone())),
        REGISTRY.register(Box::new(COMPLETIONS.clone())),
        REGISTRY.register(Box::new(FETCH_ERRORS.clone())),
        REGISTRY.register(Box::new(IN_FLIGHT.clone())),
        REGISTRY.register(Box::new(FETCH_LATENCY_MS.clone())),
        REGISTRY.register(Box::new(LAST_ACCEPTED_SEQ.clone())),
    ] {
        if let Err(e) = m {
            error!(?e, "metric registration failed");
        }
    }
}

/// Text exposition of the controller's fetch counters and latency.
fn encode_metrics() -> Vec<u8> {
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&REGISTRY.gather(), &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

fn respond(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

// scrape endpoint only; anything other than GET /metrics is a 404
fn handle_client(mut stream: TcpStream) {
    let mut req = [0u8; 1024];
    let n = stream.read(&mut req).unwrap_or(0);
    let line = String::from_utf8_lossy(&req[..n]);
    let mut parts = line.lines().next().unwrap_or_default().split_whitespace();

    let rsp = match (parts.next(), parts.next()) {
        (Some("GET"), Some("/metrics")) => {
            respond("200 OK", "text/plain; version=0.0.4; charset=utf-8", &encode_metrics())
        }
        _ => respond("404 Not Found", "text/plain", b"not found\n"),
    };
    let _ = stream.write_all(&rsp);
    let _ = stream.flush();
}

/// Serves `/metrics` from a plain OS thread so the runtime stays free.
pub fn serve_metrics(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    info!(%addr, "metrics listening");
    thread::spawn(move || {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
    Ok(())
}
