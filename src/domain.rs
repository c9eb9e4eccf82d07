// ===============================
// src/domain.rs
// ===============================
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Instrument symbol. Always trimmed + uppercase; empty is a valid input state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn normalize(raw: &str) -> Self { Symbol(raw.trim().to_uppercase()) }
    pub fn empty() -> Self { Symbol(String::new()) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Bar timestamp as delivered by the backend: epoch number or preformatted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Epoch(i64),
    Text(String),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Epoch(n) => write!(f, "{n}"),
            Timestamp::Text(s) => f.write_str(s),
        }
    }
}

// Backend column names first, short names accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: Timestamp,
    #[serde(rename = "open_price", alias = "open")]
    pub open: f64,
    #[serde(rename = "high_price", alias = "high")]
    pub high: f64,
    #[serde(rename = "low_price", alias = "low")]
    pub low: f64,
    #[serde(rename = "close_price", alias = "close")]
    pub close: f64,
    pub volume: f64,
    /// Absent for the first 19 bars of a series.
    #[serde(rename = "SM20", alias = "sma20", default)]
    pub sma20: Option<f64>,
    #[serde(rename = "RSI", alias = "rsi", default)]
    pub rsi: Option<f64>,
}

/// Display value of one fundamentals metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FundamentalValue {
    Number(f64),
    Text(String),
    Missing,
}

impl fmt::Display for FundamentalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundamentalValue::Number(n) => write!(f, "{n}"),
            FundamentalValue::Text(s) => f.write_str(s),
            FundamentalValue::Missing => f.write_str(crate::projection::PLACEHOLDER),
        }
    }
}

/// Backend-defined keys, insertion order kept for display.
pub type FundamentalsMap = IndexMap<String, FundamentalValue>;

/// One fetch result; replaced as a whole, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub fundamentals: FundamentalsMap,
    pub price_data: Vec<PricePoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: Symbol,
    pub sequence: u64,
}

/// What caused a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger { Commit, Poll }

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self { Trigger::Commit => "commit", Trigger::Poll => "poll" }
    }
}

/// Render-facing error; the message is the same for every kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub committed_symbol: Symbol,
    pub snapshot: Option<Arc<DataSnapshot>>,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
    pub last_accepted_sequence: u64,
}

impl SyncState {
    pub fn new(initial: Symbol) -> Self {
        Self { committed_symbol: initial, ..Default::default() }
    }
}

// Journal entries (recorder)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome { Accepted, Failed, Superseded }

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Failed => "failed",
            Outcome::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Commit { ts_ns: i128, symbol: Symbol },
    Dispatch { ts_ns: i128, seq: u64, symbol: Symbol, trigger: Trigger },
    Resolved { ts_ns: i128, seq: u64, outcome: Outcome, error: Option<ErrorKind> },
}
