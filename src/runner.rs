use std::{
    io::{self, Write},
    process,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rollstat_core::stats::{StatsMonitor, StatsReport};
use signal_hook::{consts, iterator::Signals};
use tracing::{error, info};

use crate::{config::read_config, ingest::ingest, logger::init_logger};

pub fn run() -> anyhow::Result<()> {
    let config = read_config()?;
    init_logger(config.logger.clone()).context("Failed to initialize logger")?;

    info!("Starting rollstat with config:\n{config:#?}");
    let (monitor, sender) = StatsMonitor::new(config.monitor_options())?;
    let monitor = Arc::new(monitor);
    let final_report = Arc::new(FinalReport::new(monitor.clone()));

    let (should_close_sender, should_close_receiver) = crossbeam_channel::bounded(1);
    let reporter = config.report_interval.map(|interval| {
        let monitor = monitor.clone();
        thread::Builder::new()
            .name("Stats reporter".to_string())
            .spawn(move || run_reporter(&monitor, interval, should_close_receiver))
    });
    let reporter = reporter.transpose().context("Failed to spawn reporter thread")?;

    listen_for_termination(final_report.clone())?;

    let summary = ingest(io::stdin().lock(), &sender)?;
    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        "Reached end of input"
    );

    drop(sender);
    monitor.wait_for_processor();
    // Receiver is already gone when periodic reports are disabled.
    let _ = should_close_sender.send(());
    if let Some(reporter) = reporter
        && reporter.join().is_err()
    {
        error!("Stats reporter thread panicked");
    }

    final_report.write_once(&mut io::stdout().lock())?;
    Ok(())
}

/// Last report of the run. Written at most once, whether the run ends with
/// end of input or with a signal.
struct FinalReport {
    monitor: Arc<StatsMonitor>,
    written: Mutex<bool>,
}

impl FinalReport {
    fn new(monitor: Arc<StatsMonitor>) -> Self {
        Self {
            monitor,
            written: Mutex::new(false),
        }
    }

    /// Returns false if the report was already written. The lock is held
    /// while writing, so a concurrent caller waits and then skips.
    fn write_once(&self, out: &mut impl Write) -> anyhow::Result<bool> {
        let mut written = self.written.lock().unwrap();
        if *written {
            return Ok(false);
        }
        self.monitor.evict_expired();
        write_report(out, &self.monitor.report())?;
        *written = true;
        Ok(true)
    }
}

fn run_reporter(monitor: &StatsMonitor, interval: Duration, should_close: Receiver<()>) {
    loop {
        match should_close.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if let Err(err) = write_report(&mut io::stdout().lock(), &monitor.report()) {
                    error!(%err, "Failed to print report");
                    return;
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Prints the final report on SIGINT/SIGTERM so interrupted runs are not
/// lost.
fn listen_for_termination(final_report: Arc<FinalReport>) -> anyhow::Result<()> {
    let mut signals = Signals::new([consts::SIGINT, consts::SIGTERM])
        .context("Failed to register signal handlers")?;
    thread::Builder::new()
        .name("Signal listener".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "Received exit signal. Terminating...");
                if let Err(err) = final_report.write_once(&mut io::stdout().lock()) {
                    error!(%err, "Failed to print report");
                }
                process::exit(0);
            }
        })
        .context("Failed to spawn signal listener thread")?;
    Ok(())
}

fn write_report(out: &mut impl Write, report: &StatsReport) -> anyhow::Result<()> {
    let line = serde_json::to_string(report)?;
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}
