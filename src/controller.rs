// ===============================
// src/controller.rs
// ===============================
//
// Single event-loop task that owns SyncState.
//
//   raw input --> DebounceGate --commit--> Dispatcher --spawn--> SnapshotSource
//                                             ^                       |
//   PollScheduler ---------------tick---------+                       |
//   completions <-----------------------------------------------------+
//
// Fetches run as their own tasks and report back over a channel, so every
// SyncState mutation happens on this loop, one at a time. Each mutation is
// published through a watch channel for the render layer.
//
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::debounce::DebounceGate;
use crate::dispatcher::Dispatcher;
use crate::domain::{DataSnapshot, Event, Outcome, Symbol, SyncState, Trigger};
use crate::error::{ControllerError, FetchError};
use crate::metrics::{
    COMMITS, COMPLETIONS, FETCHES, FETCH_ERRORS, FETCH_LATENCY_MS, IN_FLIGHT, LAST_ACCEPTED_SEQ, RAW_INPUTS,
};
use crate::poller::PollScheduler;
use crate::source::SnapshotSource;

fn now_ns() -> i128 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}

#[derive(Debug)]
struct Completion {
    seq: u64,
    result: Result<DataSnapshot, FetchError>,
    elapsed: Duration,
}

/// Render-layer side of a running controller.
#[derive(Debug)]
pub struct ControllerHandle {
    raw_tx: mpsc::UnboundedSender<String>,
    state_rx: watch::Receiver<SyncState>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Feeds one raw input value (normalized by the controller).
    pub fn set_raw_symbol(&self, text: &str) -> Result<(), ControllerError> {
        self.raw_tx.send(text.to_string()).map_err(|_| ControllerError::Disposed)
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> { self.state_rx.clone() }

    /// Latest published state.
    pub fn state(&self) -> SyncState { self.state_rx.borrow().clone() }

    /// Cancels both timers and stops the loop. Fetches still in flight finish
    /// into a closed channel and are dropped.
    pub async fn dispose(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub struct Controller<S: SnapshotSource> {
    source: Arc<S>,
    dispatcher: Dispatcher,
    gate: DebounceGate,
    poller: PollScheduler,
    state_tx: watch::Sender<SyncState>,
    done_tx: mpsc::UnboundedSender<Completion>,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl<S: SnapshotSource> Controller<S> {
    /// Starts the loop on the current runtime with `initial` already committed.
    pub fn spawn(
        cfg: &SyncConfig,
        initial: Symbol,
        source: Arc<S>,
        rec_tx: Option<mpsc::Sender<Event>>,
    ) -> ControllerHandle {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SyncState::new(initial.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctl = Controller {
            source,
            dispatcher: Dispatcher::new(initial),
            gate: DebounceGate::new(cfg.settle, cfg.debounce_enabled),
            poller: PollScheduler::new(cfg.poll),
            state_tx,
            done_tx,
            rec_tx,
        };
        let task = tokio::spawn(ctl.run(raw_rx, done_rx, shutdown_rx));

        ControllerHandle { raw_tx, state_rx, shutdown_tx, task: Some(task) }
    }

    async fn run(
        mut self,
        mut raw_rx: mpsc::UnboundedReceiver<String>,
        mut done_rx: mpsc::UnboundedReceiver<Completion>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        // the initial symbol counts as committed
        let initial = self.dispatcher.state().committed_symbol.clone();
        if !initial.is_empty() {
            info!(symbol = %initial, "initial commit");
            COMMITS.inc();
            self.record_commit(&initial);
            self.fetch(&initial, Trigger::Commit);
            self.poller.start(Instant::now());
            self.publish();
        }

        loop {
            let armed = self.gate.is_armed();
            let deadline = self.gate.deadline().unwrap_or_else(Instant::now);
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,

                Some(done) = done_rx.recv() => self.on_completion(done),

                raw = raw_rx.recv() => match raw {
                    Some(text) => self.on_raw(&text),
                    None => break,
                },

                _ = sleep_until(deadline), if armed => {
                    if let Some(sym) = self.gate.fire(Instant::now()) {
                        self.on_commit(sym);
                    }
                }

                _ = self.poller.tick() => self.on_poll(),
            }
        }

        self.gate.cancel();
        self.poller.stop();
        info!(
            last_accepted = self.dispatcher.state().last_accepted_sequence,
            "controller disposed"
        );
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.dispatcher.state().clone());
    }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(ev);
        }
    }

    fn record_commit(&self, sym: &Symbol) {
        self.record(Event::Commit { ts_ns: now_ns(), symbol: sym.clone() });
    }

    fn on_raw(&mut self, text: &str) {
        RAW_INPUTS.inc();
        let sym = Symbol::normalize(text);
        if let Some(sym) = self.gate.offer(sym, Instant::now()) {
            self.on_commit(sym);
        }
    }

    fn on_commit(&mut self, sym: Symbol) {
        COMMITS.inc();
        if !self.dispatcher.commit(sym.clone()) {
            debug!(symbol = %sym, "commit unchanged, no refetch");
            return;
        }
        info!(symbol = %sym, "committed");
        self.record_commit(&sym);

        if !sym.is_empty() {
            self.fetch(&sym, Trigger::Commit);
            if !self.poller.is_running() {
                info!("poll scheduler started");
                self.poller.start(Instant::now());
            }
        }
        self.publish();
    }

    fn on_poll(&mut self) {
        let sym = self.dispatcher.state().committed_symbol.clone();
        if sym.is_empty() {
            return;
        }
        debug!(symbol = %sym, "poll tick");
        self.fetch(&sym, Trigger::Poll);
        self.publish();
    }

    fn fetch(&mut self, sym: &Symbol, trigger: Trigger) {
        let Some(req) = self.dispatcher.dispatch(sym) else {
            return;
        };
        FETCHES.with_label_values(&[trigger.as_str()]).inc();
        debug!(symbol = %sym, seq = req.sequence, trigger = trigger.as_str(), "dispatch");
        self.record(Event::Dispatch {
            ts_ns: now_ns(),
            seq: req.sequence,
            symbol: sym.clone(),
            trigger,
        });

        let source = Arc::clone(&self.source);
        let done_tx = self.done_tx.clone();
        IN_FLIGHT.inc();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = source.fetch(&req).await;
            IN_FLIGHT.dec();
            // closed after dispose; nothing left to update
            let _ = done_tx.send(Completion { seq: req.sequence, result, elapsed: started.elapsed() });
        });
    }

    fn on_completion(&mut self, done: Completion) {
        FETCH_LATENCY_MS.observe(done.elapsed.as_secs_f64() * 1000.0);
        let kind = done.result.as_ref().err().map(|e| e.kind());
        if let Some(k) = kind {
            FETCH_ERRORS.with_label_values(&[k.as_str()]).inc();
        }

        let outcome = self.dispatcher.complete(done.seq, done.result);
        COMPLETIONS.with_label_values(&[outcome.as_str()]).inc();
        self.record(Event::Resolved { ts_ns: now_ns(), seq: done.seq, outcome, error: kind });

        if outcome != Outcome::Superseded {
            let st = self.dispatcher.state();
            LAST_ACCEPTED_SEQ.set(st.last_accepted_sequence as i64);
            debug!(seq = done.seq, outcome = outcome.as_str(), loading = st.loading, "applied");
            self.publish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FundamentalValue, FundamentalsMap, FetchRequest};
    use crate::error::ErrorKind;
    use crate::projection::{presentation_mode, PresentationMode};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration { Duration::from_millis(n) }

    fn snap(tag: &str) -> DataSnapshot {
        let mut fundamentals = FundamentalsMap::new();
        fundamentals.insert("tag".into(), FundamentalValue::Text(tag.into()));
        DataSnapshot { ticker: None, fundamentals, price_data: Vec::new() }
    }

    fn tag_of(st: &SyncState) -> Option<String> {
        st.snapshot.as_ref().map(|s| s.fundamentals["tag"].to_string())
    }

    /// Answers requests in call order from a fixed script, each after its own delay.
    struct Scripted {
        plan: Mutex<VecDeque<(Duration, Result<DataSnapshot, FetchError>)>>,
        calls: Mutex<Vec<FetchRequest>>,
    }

    impl Scripted {
        fn new(plan: Vec<(Duration, Result<DataSnapshot, FetchError>)>) -> Arc<Self> {
            Arc::new(Self { plan: Mutex::new(plan.into()), calls: Mutex::default() })
        }

        fn symbols(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|r| r.symbol.to_string()).collect()
        }
    }

    impl SnapshotSource for Scripted {
        async fn fetch(&self, req: &FetchRequest) -> Result<DataSnapshot, FetchError> {
            self.calls.lock().unwrap().push(req.clone());
            let next = self.plan.lock().unwrap().pop_front();
            let (delay, result) = next.unwrap_or_else(|| (Duration::ZERO, Ok(snap("default"))));
            sleep(delay).await;
            result
        }
    }

    fn cfg(debounce_enabled: bool, poll_ms: u64) -> SyncConfig {
        SyncConfig {
            settle: ms(1000),
            debounce_enabled,
            poll: ms(poll_ms),
            ..SyncConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_older_fetch_cannot_overwrite_newer_symbol() {
        // AAPL resolves at t=500 (seq 1), MSFT committed at t=100 resolves at t=200 (seq 2)
        let src = Scripted::new(vec![(ms(500), Ok(snap("S1"))), (ms(100), Ok(snap("S2")))]);
        let mut h = Controller::spawn(&cfg(false, 300_000), Symbol::normalize("AAPL"), src.clone(), None);

        sleep(ms(100)).await;
        h.set_raw_symbol("msft").unwrap();

        sleep(ms(200)).await; // t=300
        let st = h.state();
        assert_eq!(tag_of(&st).as_deref(), Some("S2"));
        assert!(!st.loading);

        sleep(ms(300)).await; // t=600
        let st = h.state();
        assert_eq!(tag_of(&st).as_deref(), Some("S2"));
        assert_eq!(st.committed_symbol.as_str(), "MSFT");
        assert_eq!(st.last_accepted_sequence, 2);
        assert_eq!(src.symbols(), ["AAPL", "MSFT"]);

        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn typing_burst_commits_once_after_settle() {
        let src = Scripted::new(vec![(ms(0), Ok(snap("S1")))]);
        let mut h = Controller::spawn(&cfg(true, 300_000), Symbol::empty(), src.clone(), None);

        for (i, text) in ["A", "AA", "AAP", "AAPL"].iter().enumerate() {
            if i > 0 {
                sleep(ms(200)).await;
            }
            h.set_raw_symbol(text).unwrap();
        }

        // t=600 last keystroke; nothing until t=1600
        sleep(ms(999)).await;
        assert!(src.symbols().is_empty());
        assert!(h.state().committed_symbol.is_empty());

        sleep(ms(2)).await;
        assert_eq!(src.symbols(), ["AAPL"]);
        let st = h.state();
        assert_eq!(st.committed_symbol.as_str(), "AAPL");
        assert_eq!(tag_of(&st).as_deref(), Some("S1"));

        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_debounce_commits_every_keystroke() {
        let src = Scripted::new(vec![]);
        let mut h = Controller::spawn(&cfg(false, 300_000), Symbol::empty(), src.clone(), None);

        for text in ["m", "ms", "msf"] {
            h.set_raw_symbol(text).unwrap();
            sleep(ms(1)).await;
        }
        assert_eq!(src.symbols(), ["M", "MS", "MSF"]);
        assert_eq!(h.state().committed_symbol.as_str(), "MSF");
        assert_eq!(h.state().last_accepted_sequence, 3);

        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn http_error_then_poll_recovers() {
        let src = Scripted::new(vec![
            (ms(0), Err(FetchError::Http { status: 500, detail: "Internal Server Error".into() })),
            (ms(0), Ok(snap("S2"))),
        ]);
        let mut h = Controller::spawn(&cfg(true, 1000), Symbol::normalize("AAPL"), src.clone(), None);

        sleep(ms(10)).await;
        let st = h.state();
        assert_eq!(st.error.as_ref().map(|e| e.kind), Some(ErrorKind::Http));
        assert!(st.snapshot.is_none());
        assert!(!st.loading);
        assert!(matches!(presentation_mode(&st), PresentationMode::Error(_)));

        sleep(ms(1000)).await; // poll tick at t=1000
        let st = h.state();
        assert!(st.error.is_none());
        assert_eq!(tag_of(&st).as_deref(), Some("S2"));
        assert_eq!(presentation_mode(&st), PresentationMode::Ready { refreshing: false });
        assert_eq!(src.symbols(), ["AAPL", "AAPL"]);

        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_cadence_ignores_symbol_changes() {
        let src = Scripted::new(vec![]);
        let mut h = Controller::spawn(&cfg(false, 1000), Symbol::normalize("AAPL"), src.clone(), None);

        sleep(ms(400)).await;
        h.set_raw_symbol("MSFT").unwrap();
        sleep(ms(601)).await; // t=1001
        assert_eq!(src.symbols(), ["AAPL", "MSFT", "MSFT"]);

        let seqs: Vec<u64> = src.calls.lock().unwrap().iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, [1, 2, 3]);

        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn same_symbol_commit_does_not_refetch() {
        let src = Scripted::new(vec![]);
        let mut h = Controller::spawn(&cfg(false, 300_000), Symbol::normalize("AAPL"), src.clone(), None);
        sleep(ms(1)).await;
        h.set_raw_symbol(" aapl").unwrap();
        sleep(ms(1)).await;
        assert_eq!(src.symbols(), ["AAPL"]);
        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_never_fetches_or_loads() {
        let src = Scripted::new(vec![(ms(0), Ok(snap("S1")))]);
        let mut h = Controller::spawn(&cfg(false, 1000), Symbol::normalize("AAPL"), src.clone(), None);
        sleep(ms(1)).await;

        h.set_raw_symbol("   ").unwrap();
        sleep(ms(5000)).await; // several poll periods
        let st = h.state();
        assert!(st.committed_symbol.is_empty());
        assert!(!st.loading);
        assert!(st.error.is_none());
        assert_eq!(tag_of(&st).as_deref(), Some("S1"));
        assert_eq!(presentation_mode(&st), PresentationMode::Empty);
        assert_eq!(src.symbols(), ["AAPL"]);

        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_load_shows_loading_then_refresh_keeps_data() {
        let src = Scripted::new(vec![(ms(300), Ok(snap("S1"))), (ms(300), Ok(snap("S2")))]);
        let mut h = Controller::spawn(&cfg(true, 1000), Symbol::normalize("AAPL"), src.clone(), None);

        sleep(ms(100)).await;
        assert_eq!(presentation_mode(&h.state()), PresentationMode::Loading);

        sleep(ms(1000)).await; // t=1100: poll fetch in flight
        let st = h.state();
        assert_eq!(presentation_mode(&st), PresentationMode::Ready { refreshing: true });
        assert_eq!(tag_of(&st).as_deref(), Some("S1"));

        sleep(ms(300)).await; // t=1400
        assert_eq!(tag_of(&h.state()).as_deref(), Some("S2"));

        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_updates() {
        let src = Scripted::new(vec![(ms(50), Ok(snap("S1")))]);
        let mut h = Controller::spawn(&cfg(true, 300_000), Symbol::normalize("AAPL"), src.clone(), None);
        let mut rx = h.subscribe();

        loop {
            rx.changed().await.unwrap();
            if rx.borrow().snapshot.is_some() {
                break;
            }
        }
        assert_eq!(tag_of(&rx.borrow()).as_deref(), Some("S1"));
        h.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_timers_and_freezes_state() {
        let src = Scripted::new(vec![(ms(0), Ok(snap("S1"))), (ms(500), Ok(snap("S2")))]);
        let mut h = Controller::spawn(&cfg(true, 1000), Symbol::normalize("AAPL"), src.clone(), None);

        sleep(ms(1100)).await; // poll fetch (500ms) in flight
        h.set_raw_symbol("MSFT").unwrap(); // pending in the gate
        h.dispose().await;
        let frozen = h.state();
        assert!(frozen.loading);

        sleep(ms(10_000)).await;
        assert_eq!(src.symbols(), ["AAPL", "AAPL"]);
        assert_eq!(h.state(), frozen);
        assert_eq!(h.set_raw_symbol("GOOGL"), Err(ControllerError::Disposed));
    }

    #[tokio::test(start_paused = true)]
    async fn journals_commit_dispatch_and_resolution() {
        let src = Scripted::new(vec![(ms(0), Ok(snap("S1")))]);
        let (rec_tx, mut rec_rx) = mpsc::channel(16);
        let mut h = Controller::spawn(&cfg(true, 300_000), Symbol::normalize("AAPL"), src, Some(rec_tx));
        sleep(ms(1)).await;
        h.dispose().await;

        let mut events = Vec::new();
        while let Ok(ev) = rec_rx.try_recv() {
            events.push(ev);
        }
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Event::Commit { symbol, .. } if symbol.as_str() == "AAPL"));
        assert!(matches!(events[1], Event::Dispatch { seq: 1, trigger: Trigger::Commit, .. }));
        assert!(matches!(events[2], Event::Resolved { seq: 1, outcome: Outcome::Accepted, error: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn journal_commits_precede_their_dispatches() {
        let src = Scripted::new(vec![]);
        let (rec_tx, mut rec_rx) = mpsc::channel(16);
        let mut h = Controller::spawn(&cfg(false, 300_000), Symbol::normalize("AAPL"), src, Some(rec_tx));
        sleep(ms(1)).await;
        h.set_raw_symbol("msft").unwrap();
        sleep(ms(1)).await;
        h.dispose().await;

        let mut commits = Vec::new();
        let mut dispatched = Vec::new();
        while let Ok(ev) = rec_rx.try_recv() {
            match ev {
                Event::Commit { symbol, .. } => commits.push(symbol.to_string()),
                Event::Dispatch { symbol, .. } => {
                    assert_eq!(commits.last(), Some(&symbol.to_string()));
                    dispatched.push(symbol.to_string());
                }
                Event::Resolved { .. } => {}
            }
        }
        assert_eq!(commits, ["AAPL", "MSFT"]);
        assert_eq!(dispatched, ["AAPL", "MSFT"]);
    }
}
