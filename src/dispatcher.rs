// ===============================
// src/dispatcher.rs
// ===============================
//
// Sequence gating for fetch results.
//
// Every dispatch takes the next number from a per-controller counter. A
// completion only lands in SyncState when its number is above
// `last_accepted_sequence`; a failure additionally has to be the most recent
// dispatch. Accepted outcomes (success or failure) advance
// `last_accepted_sequence`, so an older completion arriving late can never
// overwrite a newer one. `loading` stays true while the newest dispatch has
// no accepted outcome yet.
//
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{DataSnapshot, FetchRequest, Outcome, Symbol, SyncState};
use crate::error::FetchError;

#[derive(Debug)]
pub struct Dispatcher {
    state: SyncState,
    latest_dispatched: u64,
}

impl Dispatcher {
    pub fn new(initial: Symbol) -> Self {
        Self { state: SyncState::new(initial), latest_dispatched: 0 }
    }

    pub fn state(&self) -> &SyncState { &self.state }

    /// Records a committed symbol. Returns false when it equals the current one.
    pub fn commit(&mut self, symbol: Symbol) -> bool {
        if symbol == self.state.committed_symbol {
            return false;
        }
        if symbol.is_empty() {
            // empty input is the Empty mode, not an error
            self.state.error = None;
        }
        self.state.committed_symbol = symbol;
        true
    }

    /// Starts a fetch for `symbol`. Empty symbols are a no-op.
    pub fn dispatch(&mut self, symbol: &Symbol) -> Option<FetchRequest> {
        if symbol.is_empty() {
            return None;
        }
        self.latest_dispatched += 1;
        self.state.loading = true;
        self.state.error = None;
        Some(FetchRequest { symbol: symbol.clone(), sequence: self.latest_dispatched })
    }

    /// Applies one completion and reports what happened to it.
    pub fn complete(&mut self, seq: u64, result: Result<DataSnapshot, FetchError>) -> Outcome {
        if seq <= self.state.last_accepted_sequence {
            debug!(seq, accepted = self.state.last_accepted_sequence, "stale completion discarded");
            return Outcome::Superseded;
        }
        match result {
            Ok(snapshot) => {
                self.state.snapshot = Some(Arc::new(snapshot));
                self.state.error = None;
                self.state.last_accepted_sequence = seq;
                self.state.loading = self.latest_dispatched > seq;
                Outcome::Accepted
            }
            Err(e) if seq == self.latest_dispatched => {
                warn!(seq, kind = e.kind().as_str(), err = %e, "fetch failed");
                self.state.error = Some(e.to_info());
                self.state.snapshot = None;
                self.state.last_accepted_sequence = seq;
                self.state.loading = false;
                Outcome::Failed
            }
            Err(e) => {
                debug!(seq, latest = self.latest_dispatched, err = %e, "failure of superseded fetch ignored");
                Outcome::Superseded
            }
        }
    }
}
