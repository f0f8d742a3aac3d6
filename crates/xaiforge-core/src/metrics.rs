//! In-process metrics registry: counters, gauges, timers
//!
//! All updates go through an internal lock so concurrent tasks can record
//! into a shared registry.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Default)]
struct RegistryState {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, f64>,
    timers: BTreeMap<String, Vec<f64>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TimerStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub timers: BTreeMap<String, TimerStats>,
}

#[derive(Default)]
pub struct MetricsRegistry {
    state: Mutex<RegistryState>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_counter(&self, name: &str, amount: u64) {
        let mut state = self.state.lock().expect("metrics lock");
        *state.counters.entry(name.to_string()).or_insert(0) += amount;
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        let mut state = self.state.lock().expect("metrics lock");
        state.gauges.insert(name.to_string(), value);
    }

    pub fn observe_timer(&self, name: &str, duration_s: f64) {
        let mut state = self.state.lock().expect("metrics lock");
        state
            .timers
            .entry(name.to_string())
            .or_default()
            .push(duration_s);
    }

    /// Start a timer that records its elapsed seconds when dropped.
    pub fn start_timer<'a>(&'a self, name: &str) -> TimerGuard<'a> {
        TimerGuard {
            registry: self,
            name: name.to_string(),
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let state = self.state.lock().expect("metrics lock");
        let timers = state
            .timers
            .iter()
            .map(|(name, samples)| {
                let stats = if samples.is_empty() {
                    TimerStats::default()
                } else {
                    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
                    TimerStats {
                        count: samples.len() as u64,
                        min,
                        max,
                        avg,
                    }
                };
                (name.clone(), stats)
            })
            .collect();
        MetricSnapshot {
            counters: state.counters.clone(),
            gauges: state.gauges.clone(),
            timers,
        }
    }

    /// Fold another snapshot's counters and gauges into this registry.
    pub fn merge(&self, snapshot: &MetricSnapshot) {
        for (name, value) in &snapshot.counters {
            self.inc_counter(name, *value);
        }
        for (name, value) in &snapshot.gauges {
            self.set_gauge(name, *value);
        }
    }
}

pub struct TimerGuard<'a> {
    registry: &'a MetricsRegistry,
    name: String,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .observe_timer(&self.name, self.started.elapsed().as_secs_f64());
    }
}
