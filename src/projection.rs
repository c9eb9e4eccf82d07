// ===============================
// src/projection.rs
// ===============================
//
// Pure views over SyncState for the render layer.
//
use crate::domain::{DataSnapshot, FundamentalValue, PricePoint, SyncState, Timestamp};

/// Shown wherever an optional value is absent.
pub const PLACEHOLDER: &str = "—";

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma20: String,
    pub rsi: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub timestamp: Timestamp,
    pub close: f64,
    pub sma20: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationMode {
    /// First load, nothing to show yet.
    Loading,
    Error(String),
    Empty,
    /// `refreshing` = a fetch is in flight while the previous snapshot stays visible.
    Ready { refreshing: bool },
}

fn tail(points: &[PricePoint], n: usize) -> &[PricePoint] {
    &points[points.len().saturating_sub(n)..]
}

fn cell(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Last `k` bars in original order.
pub fn table_rows(snapshot: &DataSnapshot, k: usize) -> Vec<TableRow> {
    tail(&snapshot.price_data, k)
        .iter()
        .map(|p| TableRow {
            timestamp: p.timestamp.clone(),
            open: p.open,
            high: p.high,
            low: p.low,
            close: p.close,
            volume: p.volume,
            sma20: cell(p.sma20),
            rsi: cell(p.rsi),
        })
        .collect()
}

/// Last `m` bars as (timestamp, close, sma20) for plotting.
pub fn chart_series(snapshot: &DataSnapshot, m: usize) -> Vec<ChartPoint> {
    tail(&snapshot.price_data, m)
        .iter()
        .map(|p| ChartPoint { timestamp: p.timestamp.clone(), close: p.close, sma20: p.sma20 })
        .collect()
}

pub fn fundamentals_entries(snapshot: &DataSnapshot) -> Vec<(String, FundamentalValue)> {
    snapshot.fundamentals.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Loading only wins while no snapshot exists, so a background refresh
/// never blanks data that is already on screen.
pub fn presentation_mode(state: &SyncState) -> PresentationMode {
    if state.loading && state.snapshot.is_none() {
        return PresentationMode::Loading;
    }
    if let Some(e) = &state.error {
        return PresentationMode::Error(e.message.clone());
    }
    if state.committed_symbol.is_empty() {
        return PresentationMode::Empty;
    }
    match &state.snapshot {
        Some(_) => PresentationMode::Ready { refreshing: state.loading },
        None => PresentationMode::Empty,
    }
}
