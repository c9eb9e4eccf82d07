// ===============================
// src/debounce.rs
// ===============================
//
// Debounce gate for raw symbol input.
// - offer(): every raw value (re)arms a single settle deadline; the previous
//   pending value is simply replaced, so there is never more than one timer.
// - fire(): called by the owner's event loop once the deadline elapses and
//   yields the last offered value exactly once.
// - With the gate disabled, offer() commits immediately and nothing is armed.
//
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::Symbol;

#[derive(Debug)]
pub struct DebounceGate {
    settle: Duration,
    enabled: bool,
    pending: Option<(Symbol, Instant)>,
}

impl DebounceGate {
    pub fn new(settle: Duration, enabled: bool) -> Self {
        Self { settle, enabled, pending: None }
    }

    /// Returns `Some` when the value commits right away (gate disabled).
    pub fn offer(&mut self, value: Symbol, now: Instant) -> Option<Symbol> {
        if !self.enabled {
            return Some(value);
        }
        self.pending = Some((value, now + self.settle));
        None
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    pub fn is_armed(&self) -> bool { self.pending.is_some() }

    /// Takes the pending value if its deadline has passed.
    pub fn fire(&mut self, now: Instant) -> Option<Symbol> {
        match &self.pending {
            Some((_, at)) if *at <= now => self.pending.take().map(|(v, _)| v),
            _ => None,
        }
    }

    pub fn cancel(&mut self) { self.pending = None; }
}
