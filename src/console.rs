// ===============================
// src/console.rs
// ===============================
//
// Terminal stand-in for the dashboard:
// - read_input : every stdin line is one raw symbol value
// - render     : redraws fundamentals + price table on each state change
//
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::controller::ControllerHandle;
use crate::domain::SyncState;
use crate::projection::{
    chart_series, fundamentals_entries, presentation_mode, table_rows, PresentationMode, PLACEHOLDER,
};

pub async fn read_input(handle: &ControllerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if handle.set_raw_symbol(&line).is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("stdin closed");
                break;
            }
            Err(e) => {
                warn!(?e, "stdin read failed");
                break;
            }
        }
    }
}

/// Text for one state. Kept separate from printing so it can be checked.
pub fn render_frame(state: &SyncState, cfg: &SyncConfig) -> String {
    let mut out = String::new();
    let sym = &state.committed_symbol;
    let mode = presentation_mode(state);

    match &mode {
        PresentationMode::Loading => out.push_str(&format!("[{sym}] Loading...\n")),
        PresentationMode::Error(msg) => {
            let detail = state.error.as_ref().map(|e| e.detail.as_str()).unwrap_or_default();
            out.push_str(&format!("[{sym}] {msg} ({detail})\n"));
        }
        PresentationMode::Empty => out.push_str("Enter a ticker to view stock data.\n"),
        PresentationMode::Ready { refreshing } => {
            out.push_str(&format!("[{sym}]{}\n", if *refreshing { " refreshing..." } else { "" }));
        }
    }

    let PresentationMode::Ready { .. } = mode else {
        return out;
    };
    let Some(snap) = state.snapshot.as_deref() else {
        return out;
    };

    out.push_str(&format!("Fundamentals ({})\n", snap.ticker.as_deref().unwrap_or(sym.as_str())));
    for (k, v) in fundamentals_entries(snap) {
        out.push_str(&format!("  {k:<16} {v}\n"));
    }

    if snap.price_data.is_empty() {
        out.push_str("No price data available\n");
        return out;
    }

    let series = chart_series(snap, cfg.chart_rows);
    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        let sma = last.sma20.map(|v| v.to_string()).unwrap_or_else(|| PLACEHOLDER.to_string());
        out.push_str(&format!(
            "Close {} ({}) -> {} ({}), SMA20 {}, {} bars\n",
            first.close,
            first.timestamp,
            last.close,
            last.timestamp,
            sma,
            series.len()
        ));
    }

    out.push_str(&format!("Price Data (last {} rows)\n", cfg.table_rows));
    out.push_str(&format!(
        "  {:<30} {:>10} {:>10} {:>10} {:>10} {:>12} {:>10} {:>8}\n",
        "Timestamp", "Open", "High", "Low", "Close", "Volume", "SM20", "RSI"
    ));
    for r in table_rows(snap, cfg.table_rows) {
        out.push_str(&format!(
            "  {:<30} {:>10} {:>10} {:>10} {:>10} {:>12} {:>10} {:>8}\n",
            r.timestamp.to_string(),
            r.open,
            r.high,
            r.low,
            r.close,
            r.volume,
            r.sma20,
            r.rsi
        ));
    }
    out
}

pub async fn render(mut rx: watch::Receiver<SyncState>, cfg: SyncConfig) {
    loop {
        let frame = render_frame(&rx.borrow_and_update(), &cfg);
        println!("{frame}");
        if rx.changed().await.is_err() {
            break;
        }
    }
}
