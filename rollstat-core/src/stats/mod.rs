use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, Weak},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendError, Sender, TrySendError, bounded};
use serde::Serialize;
use tracing::{Level, span, warn};

use crate::{
    clock::{Clock, SystemClock},
    error::StatsMonitorError,
    stats::state::StatsState,
    window::{WindowOptions, WindowReport},
};

mod state;

pub use state::StatsEvent;

const CHANNEL_CAPACITY: usize = 10000;

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    /// Window bounds of metrics that were not explicitly registered.
    pub default_window: WindowOptions,
    /// How often expired observations are evicted when no events arrive.
    pub sweep_interval: Duration,
    /// Metrics without events for this long are dropped.
    pub idle_metric_timeout: Option<Duration>,
}

#[derive(Debug, Serialize, Clone)]
pub struct StatsReport {
    pub metrics: BTreeMap<String, WindowReport>,
}

/// Registry of named rolling windows. Events are applied on a dedicated
/// thread; all windows live behind a single lock.
pub struct StatsMonitor {
    state: Arc<Mutex<StatsState>>,
    processor: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone)]
pub struct StatsSender(Sender<StatsEvent>);

impl StatsMonitor {
    pub fn new(opts: MonitorOptions) -> Result<(Self, StatsSender), StatsMonitorError> {
        Self::with_clock(opts, Arc::new(SystemClock))
    }

    pub fn with_clock(
        opts: MonitorOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, StatsSender), StatsMonitorError> {
        if opts.sweep_interval.is_zero() {
            return Err(StatsMonitorError::ZeroSweepInterval);
        }
        let state = StatsState::new(opts.default_window, opts.idle_metric_timeout, clock)?;
        let state = Arc::new(Mutex::new(state));
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);

        let processor = {
            let state = Arc::downgrade(&state);
            thread::Builder::new()
                .name("Stats processor".to_string())
                .spawn(move || {
                    let _span = span!(Level::INFO, "Stats processor").entered();
                    run_event_loop(state, receiver, opts.sweep_interval);
                })
                .map_err(StatsMonitorError::ProcessorSpawnFailed)?
        };

        let monitor = Self {
            state,
            processor: Mutex::new(Some(processor)),
        };
        Ok((monitor, StatsSender(sender)))
    }

    pub fn report(&self) -> StatsReport {
        let guard = self.state.lock().unwrap();
        StatsReport {
            metrics: guard.report(),
        }
    }

    /// Evicts expired observations from every window without waiting for
    /// the periodic sweep.
    pub fn evict_expired(&self) {
        self.state.lock().unwrap().evict_expired();
    }

    /// Blocks until every sender is dropped and all queued events are
    /// applied.
    pub fn wait_for_processor(&self) {
        let processor = self.processor.lock().unwrap().take();
        if let Some(processor) = processor
            && processor.join().is_err()
        {
            warn!("Stats processor thread panicked");
        }
    }
}

impl StatsSender {
    /// Never blocks. When the channel is full the event is dropped.
    pub fn send(&self, event: StatsEvent) {
        if let Err(TrySendError::Full(event)) = self.0.try_send(event) {
            warn!(?event, "Stats channel full")
        };
    }

    /// Waits for free space in the channel. Fails only when the processor
    /// is gone.
    pub fn send_blocking(&self, event: StatsEvent) -> Result<(), SendError<StatsEvent>> {
        self.0.send(event)
    }
}

fn run_event_loop(
    state: Weak<Mutex<StatsState>>,
    receiver: Receiver<StatsEvent>,
    sweep_interval: Duration,
) {
    let mut last_sweep = Instant::now();
    loop {
        let timeout = sweep_interval.saturating_sub(last_sweep.elapsed());
        let event = match receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => return,
        };
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut guard = state.lock().unwrap();
        if let Some(event) = event {
            guard.handle_event(event);
        }
        if last_sweep.elapsed() >= sweep_interval {
            guard.evict_expired();
            last_sweep = Instant::now();
        }
    }
}
