use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, trace, warn};

use crate::{
    clock::Clock,
    error::WindowError,
    window::{RollingWindow, WindowOptions, WindowReport},
};

pub(crate) struct StatsState {
    clock: Arc<dyn Clock>,
    default_window: WindowOptions,
    idle_metric_timeout: Option<Duration>,
    metrics: HashMap<String, (Instant, RollingWindow)>,
}

#[derive(Debug, Clone)]
pub enum StatsEvent {
    Observation {
        metric: String,
        value: f64,
    },
    /// Creates the metric with custom window bounds, replacing any existing
    /// window of the same name.
    RegisterMetric {
        metric: String,
        options: WindowOptions,
    },
    UnregisterMetric {
        metric: String,
    },
}

impl StatsState {
    pub fn new(
        default_window: WindowOptions,
        idle_metric_timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WindowError> {
        // fail early instead of on the first observation
        RollingWindow::with_clock(default_window, clock.clone())?;
        Ok(Self {
            clock,
            default_window,
            idle_metric_timeout,
            metrics: HashMap::new(),
        })
    }

    pub fn handle_event(&mut self, event: StatsEvent) {
        let now = self.clock.now();
        match event {
            StatsEvent::Observation { metric, value } => {
                if !value.is_finite() {
                    warn!(%metric, value, "Dropping non-finite observation");
                    return;
                }
                if !self.metrics.contains_key(&metric) {
                    match RollingWindow::with_clock(self.default_window, self.clock.clone()) {
                        Ok(window) => {
                            debug!(%metric, "Registered metric with default window");
                            self.metrics.insert(metric.clone(), (now, window));
                        }
                        Err(err) => {
                            error!(%err, %metric, "Failed to create window");
                            return;
                        }
                    }
                }
                if let Some((updated_at, window)) = self.metrics.get_mut(&metric) {
                    *updated_at = now;
                    window.add(value);
                }
            }
            StatsEvent::RegisterMetric { metric, options } => {
                match RollingWindow::with_clock(options, self.clock.clone()) {
                    Ok(window) => {
                        debug!(%metric, ?options, "Registered metric");
                        self.metrics.insert(metric, (now, window));
                    }
                    Err(err) => error!(%err, %metric, ?options, "Rejected metric options"),
                }
            }
            StatsEvent::UnregisterMetric { metric } => {
                if self.metrics.remove(&metric).is_none() {
                    warn!(%metric, "Unregistering unknown metric");
                }
            }
        }

        self.drop_idle_metrics(now);
    }

    pub fn evict_expired(&mut self) {
        let now = self.clock.now();
        for (_, window) in self.metrics.values_mut() {
            window.evict_expired();
        }
        self.drop_idle_metrics(now);
        trace!(metrics = self.metrics.len(), "Evicted expired observations");
    }

    pub fn report(&self) -> BTreeMap<String, WindowReport> {
        self.metrics
            .iter()
            .map(|(metric, (_, window))| (metric.clone(), window.report()))
            .collect()
    }

    fn drop_idle_metrics(&mut self, now: Instant) {
        let Some(timeout) = self.idle_metric_timeout else {
            return;
        };
        self.metrics.retain(|metric, (updated_at, _)| {
            let keep = now.saturating_duration_since(*updated_at) <= timeout;
            if !keep {
                debug!(%metric, "Dropping idle metric");
            }
            keep
        });
    }
}
