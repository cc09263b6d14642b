use std::{sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    clock::{Clock, SystemClock},
    error::WindowError,
};

use self::{
    extremum::{ExtremumKind, ExtremumTracker},
    observation_log::ObservationLog,
};

mod extremum;
mod observation_log;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    /// Maximum number of observations kept in the window.
    pub max_size: usize,
    /// Observations older than this are evicted.
    pub duration: Duration,
}

/// Running aggregates over observations bounded by count and age.
///
/// All queries are O(1). Querying an empty window returns `None`.
#[derive(Debug)]
pub struct RollingWindow {
    options: WindowOptions,
    clock: Arc<dyn Clock>,
    log: ObservationLog,
    min: ExtremumTracker,
    max: ExtremumTracker,
    sum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowReport {
    pub count: usize,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub first: Option<f64>,
    pub last: Option<f64>,
    pub mid: Option<f64>,
}

impl RollingWindow {
    pub fn new(options: WindowOptions) -> Result<Self, WindowError> {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        options: WindowOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WindowError> {
        if options.max_size == 0 {
            return Err(WindowError::ZeroMaxSize);
        }
        Ok(Self {
            options,
            clock,
            log: ObservationLog::new(),
            min: ExtremumTracker::new(ExtremumKind::Min),
            max: ExtremumTracker::new(ExtremumKind::Max),
            sum: 0.0,
        })
    }

    pub fn options(&self) -> WindowOptions {
        self.options
    }

    /// Adds a value timestamped with the current time and evicts everything
    /// that no longer fits in the window.
    ///
    /// NaN and infinite values are not supported.
    pub fn add(&mut self, value: f64) {
        self.log.append(value, self.clock.now());
        self.min.push(value);
        self.max.push(value);
        self.sum += value;

        self.evict(true);
    }

    /// Evicts observations older than the window duration without adding
    /// anything.
    pub fn evict_expired(&mut self) {
        self.evict(false);
    }

    fn evict(&mut self, enforce_size: bool) {
        let now = self.clock.now();
        let mut evicted = 0;
        while let Some(oldest) = self.log.oldest() {
            let over_size = enforce_size && self.log.len() > self.options.max_size;
            let age = now.saturating_duration_since(oldest.inserted_at);
            let expired = age > self.options.duration;
            if !over_size && !expired {
                break;
            }
            let Some(oldest) = self.log.evict_oldest() else {
                break;
            };
            self.sum -= oldest.value;
            self.min.evict(oldest.value);
            self.max.evict(oldest.value);
            evicted += 1;
        }

        if self.log.is_empty() {
            // Drop accumulated float error once nothing is left.
            self.sum = 0.0;
        }
        if evicted > 1 {
            tracing::trace!(evicted, remaining = self.log.len(), "Evicted observations");
        }
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.min.current()
    }

    pub fn max(&self) -> Option<f64> {
        self.max.current()
    }

    pub fn avg(&self) -> Option<f64> {
        match self.log.len() {
            0 => None,
            count => Some(self.sum / count as f64),
        }
    }

    /// Value of the oldest observation in the window.
    pub fn first(&self) -> Option<f64> {
        self.log.oldest().map(|observation| observation.value)
    }

    /// Value of the newest observation in the window.
    pub fn last(&self) -> Option<f64> {
        self.log.newest().map(|observation| observation.value)
    }

    /// Midpoint between the oldest and the newest observation. This is
    /// neither the median nor the midpoint of min and max.
    pub fn mid(&self) -> Option<f64> {
        let first = self.first()?;
        let last = self.last()?;
        Some(first + (last - first) / 2.0)
    }

    pub fn report(&self) -> WindowReport {
        WindowReport {
            count: self.count(),
            sum: self.sum(),
            min: self.min(),
            max: self.max(),
            avg: self.avg(),
            first: self.first(),
            last: self.last(),
            mid: self.mid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use crate::clock::ManualClock;

    use super::*;

    const TOLERANCE: f64 = 0.00000000001;

    fn window(max_size: usize, duration: Duration) -> (RollingWindow, ManualClock) {
        let clock = ManualClock::new();
        let window = RollingWindow::with_clock(
            WindowOptions { max_size, duration },
            Arc::new(clock.clone()),
        )
        .unwrap();
        (window, clock)
    }

    fn filled(max_size: usize, values: &[f64]) -> RollingWindow {
        let (mut window, _) = window(max_size, Duration::from_secs(3600));
        for value in values {
            window.add(*value);
        }
        window
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("expected a value");
        assert!(
            (actual - expected).abs() < TOLERANCE,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_empty(window: &RollingWindow) {
        assert_eq!(window.count(), 0);
        assert_eq!(window.sum(), 0.0);
        assert_eq!(window.min(), None);
        assert_eq!(window.max(), None);
        assert_eq!(window.avg(), None);
        assert_eq!(window.first(), None);
        assert_eq!(window.last(), None);
        assert_eq!(window.mid(), None);
    }

    #[test]
    fn zero_max_size_is_rejected() {
        let result = RollingWindow::new(WindowOptions {
            max_size: 0,
            duration: Duration::from_secs(1),
        });
        assert_eq!(result.unwrap_err(), WindowError::ZeroMaxSize);
    }

    #[test]
    fn new_window_is_empty() {
        let (window, _) = window(3, Duration::from_secs(1));
        assert_empty(&window);
    }

    #[test]
    fn min_over_window() {
        let cases: Vec<(&str, Vec<f64>, f64)> = vec![
            ("one value", vec![42.0], 42.0),
            ("first in window", vec![1.0, 2.0, 3.0], 1.0),
            ("middle in window", vec![2.0, 1.0, 3.0], 1.0),
            ("last in window", vec![2.0, 3.0, 1.0], 1.0),
            ("last in window, evict", vec![1.0, 3.0, 4.0, 2.0], 2.0),
            ("first in window, evict same", vec![1.0, 1.0, 4.0, 2.0], 1.0),
            ("first in window, evict", vec![1.0, 2.0, 4.0, 3.0], 2.0),
            ("middle in window, evict", vec![1.0, 3.0, 2.0, 5.0], 2.0),
        ];
        for (name, values, expected) in cases {
            let window = filled(3, &values);
            assert_eq!(window.min(), Some(expected), "{name}");
        }
    }

    #[test]
    fn max_over_window() {
        let cases: Vec<(&str, Vec<f64>, f64)> = vec![
            ("one value", vec![42.0], 42.0),
            ("first in window", vec![3.0, 2.0, 1.0], 3.0),
            ("last in window, evict", vec![4.0, 1.0, 2.0, 3.0], 3.0),
            ("first in window, evict same", vec![4.0, 4.0, 1.0, 2.0], 4.0),
            ("middle in window, evict", vec![5.0, 1.0, 3.0, 2.0], 3.0),
        ];
        for (name, values, expected) in cases {
            let window = filled(3, &values);
            assert_eq!(window.max(), Some(expected), "{name}");
        }
    }

    #[test]
    fn avg_over_window() {
        assert_eq!(filled(3, &[]).avg(), None);
        assert_close(filled(3, &[42.0]).avg(), 42.0);
        assert_close(filled(3, &[1.0, 2.0, 3.0]).avg(), 2.0);
        assert_close(filled(3, &[1.0, 3.0, 4.0, 2.0, 3.0]).avg(), 3.0);
    }

    #[test]
    fn mid_is_between_first_and_last() {
        let window = filled(4, &[10.0, 0.0, 100.0, 20.0]);
        assert_eq!(window.first(), Some(10.0));
        assert_eq!(window.last(), Some(20.0));
        assert_close(window.mid(), 15.0);
        // not the midpoint of min and max
        assert_ne!(window.mid(), Some(50.0));
        assert_close(window.avg(), 32.5);

        let window = filled(4, &[7.0]);
        assert_close(window.mid(), 7.0);
    }

    #[test]
    fn expired_observations_evicted_on_add() {
        let (mut window, clock) = window(6, Duration::from_secs(1));
        window.add(1.0);
        window.add(2.0);
        clock.advance(Duration::from_millis(1001));
        for value in [3.0, 4.0, 5.0, 6.0, 7.0] {
            window.add(value);
        }

        assert_eq!(window.count(), 5);
        assert_eq!(window.min(), Some(3.0));
        assert_close(window.avg(), 5.0);
        assert_eq!(window.max(), Some(7.0));
    }

    #[test]
    fn observation_exactly_at_duration_is_kept() {
        let (mut window, clock) = window(10, Duration::from_secs(1));
        window.add(1.0);
        clock.advance(Duration::from_secs(1));
        window.evict_expired();
        assert_eq!(window.count(), 1);

        clock.advance(Duration::from_nanos(1));
        window.evict_expired();
        assert_empty(&window);
    }

    #[test]
    fn long_idle_gap_purges_everything_on_next_add() {
        let (mut window, clock) = window(100, Duration::from_secs(1));
        for value in 0..50 {
            window.add(value as f64);
        }
        clock.advance(Duration::from_secs(5));
        window.add(-1.0);

        assert_eq!(window.count(), 1);
        assert_eq!(window.min(), Some(-1.0));
        assert_eq!(window.max(), Some(-1.0));
        assert_eq!(window.sum(), -1.0);
    }

    #[test]
    fn evict_expired_drains_window() {
        let (mut window, clock) = window(3, Duration::from_millis(5));
        for value in 1..=7 {
            window.add(value as f64);
        }
        assert_eq!(window.count(), 3);

        clock.advance(Duration::from_millis(100));
        window.evict_expired();
        assert_empty(&window);

        window.add(3.0);
        assert_eq!(window.min(), Some(3.0));
        assert_eq!(window.first(), Some(3.0));
    }

    #[test]
    fn evict_expired_keeps_fresh_observations() {
        let (mut window, clock) = window(10, Duration::from_secs(1));
        window.add(5.0);
        window.add(1.0);
        clock.advance(Duration::from_millis(600));
        window.add(3.0);
        clock.advance(Duration::from_millis(600));
        window.evict_expired();

        assert_eq!(window.count(), 1);
        assert_eq!(window.min(), Some(3.0));
        assert_eq!(window.max(), Some(3.0));
        assert_eq!(window.first(), Some(3.0));
    }

    #[test]
    fn zero_duration_keeps_only_current_instant() {
        let (mut window, clock) = window(10, Duration::ZERO);
        window.add(1.0);
        window.add(2.0);
        assert_eq!(window.count(), 2);

        clock.advance(Duration::from_millis(1));
        window.add(3.0);
        assert_eq!(window.count(), 1);
        assert_eq!(window.first(), Some(3.0));
    }

    #[test]
    fn window_after_random_noise_and_idle_gap() {
        let mut rng = StdRng::seed_from_u64(42);
        let (mut window, clock) = window(3, Duration::from_secs(1));
        for _ in 0..1000 {
            window.add(rng.random::<f64>());
        }
        clock.advance(Duration::from_secs(2));
        for value in [1.0, 2.0, 3.0] {
            window.add(value);
        }

        assert_eq!(window.count(), 3);
        assert_eq!(window.first(), Some(1.0));
        assert_eq!(window.last(), Some(3.0));
        assert_close(window.mid(), 2.0);
        assert_close(window.avg(), 2.0);
        assert_eq!(window.max(), Some(3.0));
        assert_eq!(window.min(), Some(1.0));
        assert_close(Some(window.sum()), 6.0);
    }

    #[test]
    fn queries_are_idempotent() {
        let window = filled(3, &[4.0, 8.0, 1.0, 6.0]);
        let report = window.report();
        assert_eq!(window.report(), report);
        assert_eq!(window.min(), window.min());
        assert_eq!(window.mid(), window.mid());
    }

    #[test]
    fn matches_brute_force_scan() {
        let mut rng = StdRng::seed_from_u64(1234);
        for size in 1..=64usize {
            let (mut window, _) = window(size, Duration::from_secs(60));
            let mut reference = vec![0.0; size];
            for i in 0..500 {
                // coarse values so duplicates show up
                let value = (rng.random::<f64>() * 16.0).floor();
                window.add(value);
                reference[i % size] = value;

                assert!(window.count() <= size);
                if i + 1 >= size {
                    let expected_min = reference.iter().copied().reduce(f64::min);
                    let expected_max = reference.iter().copied().reduce(f64::max);
                    let expected_avg = reference.iter().sum::<f64>() / size as f64;
                    assert_eq!(window.min(), expected_min, "size {size}, step {i}");
                    assert_eq!(window.max(), expected_max, "size {size}, step {i}");
                    assert!((window.avg().unwrap() - expected_avg).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn count_matches_unexpired_observations() {
        let mut rng = StdRng::seed_from_u64(99);
        let (mut window, clock) = window(20, Duration::from_millis(100));
        let mut reference: Vec<(u64, f64)> = Vec::new();
        let mut now_ms = 0u64;

        for _ in 0..2000 {
            let step = rng.random_range(0..30);
            clock.advance(Duration::from_millis(step));
            now_ms += step;
            if rng.random_bool(0.8) {
                let value = rng.random_range(-50..50) as f64;
                window.add(value);
                reference.push((now_ms, value));
            } else {
                window.evict_expired();
            }

            let alive: Vec<f64> = reference
                .iter()
                .filter(|(at, _)| now_ms - at <= 100)
                .map(|(_, value)| *value)
                .collect();
            let alive = &alive[alive.len().saturating_sub(20)..];

            assert!(window.count() <= 20);
            assert_eq!(window.count(), alive.len());
            assert_eq!(window.min(), alive.iter().copied().reduce(f64::min));
            assert_eq!(window.max(), alive.iter().copied().reduce(f64::max));
            assert_eq!(window.first(), alive.first().copied());
            assert_eq!(window.last(), alive.last().copied());
        }
    }

    #[test]
    fn report_serializes_empty_values_as_null() {
        let (window, _) = window(3, Duration::from_secs(1));
        let json = serde_json::to_value(window.report()).unwrap();
        assert_eq!(json["count"], 0);
        assert!(json["min"].is_null());
        assert!(json["mid"].is_null());
    }
}
