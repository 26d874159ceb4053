// ===============================
// src/scheduler.rs (poll loop)
// ===============================
//
// STOPPED -> RUNNING -> STOPPING -> STOPPED
//
// Tiap cycle:
//   1) ambil daftar trader dari registry (perubahan berlaku di cycle berikutnya)
//   2) per trader: fetch -> snapshot -> first poll? seed : diff + emit + update
//   3) tidur sampai batas interval berikutnya, bangun segera kalau ada stop
//
// Error satu trader tidak menghentikan trader lain maupun loop.
//

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::diff::diff;
use crate::domain::{MonitorEvent, SchedulerState, SnapshotSet, TraderRecord};
use crate::fetch::{FetchError, PositionFetcher};
use crate::formatter::format_line;
use crate::metrics::{CYCLE_MS, POLLS, POLL_ERRORS_BY, POSITIONS_OPEN, SCHEDULER_RUNNING, SIGNALS_BY};
use crate::registry::TraderRegistry;
use crate::store::SnapshotStore;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub traders: usize,
    pub signals: usize,
    pub errors: usize,
}

/// Everything one cycle needs; cloned into the background task.
#[derive(Clone)]
struct Poller {
    registry: Arc<TraderRegistry>,
    store: Arc<SnapshotStore>,
    fetcher: Arc<dyn PositionFetcher>,
    events: broadcast::Sender<MonitorEvent>,
}

impl Poller {
    fn publish(&self, ev: MonitorEvent) {
        // tanpa subscriber bukan error
        let _ = self.events.send(ev);
    }

    async fn run_cycle(&self) -> CycleReport {
        let traders = self.registry.list();
        let mut report = CycleReport { traders: traders.len(), ..Default::default() };

        for trader in &traders {
            match AssertUnwindSafe(self.poll_trader(trader)).catch_unwind().await {
                Ok(Ok(n)) => report.signals += n,
                Ok(Err(e)) => {
                    report.errors += 1;
                    self.trader_error(trader, e.to_string());
                }
                Err(_) => {
                    report.errors += 1;
                    self.trader_error(trader, "processing panicked".to_string());
                }
            }
        }
        report
    }

    fn trader_error(&self, trader: &TraderRecord, message: String) {
        POLL_ERRORS_BY.with_label_values(&[trader.code.as_str()]).inc();
        warn!(trader = %trader.code, name = %trader.display_name, %message, "poll failed");
        self.publish(MonitorEvent::Error {
            trader_code: Some(trader.code.clone()),
            message: format!("check {} failed: {}", trader.display_name, message),
        });
    }

    /// Returns the number of signals emitted for this trader.
    async fn poll_trader(&self, trader: &TraderRecord) -> Result<usize, FetchError> {
        let rows = self.fetcher.fetch_positions(&trader.code).await?;
        POLLS.inc();
        let timestamp = Utc::now();
        let current = SnapshotSet::from_raw(&rows);

        POSITIONS_OPEN.with_label_values(&[trader.code.as_str()]).set(current.len() as i64);
        self.publish(MonitorEvent::PositionsRefreshed {
            trader_code: trader.code.clone(),
            positions: current.iter().cloned().collect(),
            timestamp,
        });

        // dihapus selagi fetch berjalan -> jangan hidupkan lagi state-nya
        if !self.registry.contains(&trader.code) {
            return Ok(0);
        }

        if self.store.is_first_poll(&trader.code) {
            let n = current.len();
            self.store.record_first_seen(&trader.code, current);
            self.publish(MonitorEvent::Log(format!("{}: {} positions", trader.display_name, n)));
            return Ok(0);
        }

        let previous = self.store.get_previous(&trader.code);
        let signals = diff(trader, &previous, &current, timestamp);
        let count = signals.len();
        for sig in signals {
            SIGNALS_BY.with_label_values(&[sig.action.as_str()]).inc();
            info!(trader = %sig.trader_code, action = sig.action.as_str(), instrument = %sig.instrument, "{}", format_line(&sig));
            self.publish(MonitorEvent::Signal(sig));
        }
        self.store.update(&trader.code, current);
        Ok(count)
    }
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct PollScheduler {
    poller: Poller,
    // watch so every stop() caller can wait for Stopped, not only the one holding the handle
    state: watch::Sender<SchedulerState>,
    running: Mutex<Option<Running>>,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<TraderRegistry>,
        store: Arc<SnapshotStore>,
        fetcher: Arc<dyn PositionFetcher>,
        event_buffer: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(16));
        let (state, _) = watch::channel(SchedulerState::Stopped);
        Self {
            poller: Poller { registry, store, fetcher, events },
            state,
            running: Mutex::new(None),
        }
    }

    fn running_lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, st: SchedulerState) {
        self.state.send_replace(st);
        SCHEDULER_RUNNING.set(matches!(st, SchedulerState::Running) as i64);
        self.poller.publish(MonitorEvent::SchedulerState(st));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.poller.events.subscribe()
    }

    /// Publish from outside the loop (console, main) onto the same bus.
    pub fn publish(&self, ev: MonitorEvent) {
        self.poller.publish(ev);
    }

    pub fn status(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// One full pass over the registry, on the caller's task.
    pub async fn run_cycle(&self) -> CycleReport {
        self.poller.run_cycle().await
    }

    /// Clear every cached book; all registered traders re-seed on their next poll.
    pub fn resync(&self) {
        let codes: Vec<String> = self.poller.registry.list().into_iter().map(|t| t.code).collect();
        self.poller.store.reset_all(codes.iter().map(String::as_str));
        self.poller.publish(MonitorEvent::Log(format!("resync: {} traders reset to first poll", codes.len())));
    }

    pub fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        let mut running = self.running_lock();
        if running.is_some() || self.status() != SchedulerState::Stopped {
            return Err(SchedulerError::AlreadyRunning);
        }
        let interval = interval.max(MIN_INTERVAL);
        let (stop_tx, stop_rx) = watch::channel(false);
        let poller = self.poller.clone();
        let handle = tokio::spawn(run_loop(poller, interval, stop_rx));
        *running = Some(Running { stop_tx, handle });
        self.set_state(SchedulerState::Running);
        drop(running);

        info!(interval_ms = interval.as_millis() as u64, "scheduler started");
        self.poller.publish(MonitorEvent::Log(format!("monitor started, interval {}s", interval.as_secs_f64())));
        Ok(())
    }

    /// Let the in-flight cycle finish, then wait for the loop to exit.
    /// Every caller returns only once the state is `Stopped`; a no-op when
    /// already stopped.
    pub async fn stop(&self) {
        let taken = {
            let mut running = self.running_lock();
            let taken = running.take();
            if taken.is_some() {
                self.set_state(SchedulerState::Stopping);
            }
            taken
        };
        let Some(Running { stop_tx, handle }) = taken else {
            // another caller owns the shutdown; wait for it to finish
            let mut rx = self.state.subscribe();
            let _ = rx.wait_for(|st| *st == SchedulerState::Stopped).await;
            return;
        };

        let _ = stop_tx.send(true);
        if let Err(e) = handle.await {
            error!(?e, "scheduler task ended abnormally");
        }
        self.set_state(SchedulerState::Stopped);
        info!("scheduler stopped");
        self.poller.publish(MonitorEvent::Log("monitor stopped".to_string()));
    }
}

async fn run_loop(poller: Poller, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow() {
            break;
        }
        let started = Instant::now();
        let report = poller.run_cycle().await;
        CYCLE_MS.observe(started.elapsed().as_secs_f64() * 1000.0);
        debug!(traders = report.traders, signals = report.signals, errors = report.errors, "cycle done");

        tokio::select! {
            _ = tokio::time::sleep_until(started + interval) => {}
            res = stop_rx.changed() => {
                if res.is_err() {
                    break;
                }
            }
        }
    }
}
