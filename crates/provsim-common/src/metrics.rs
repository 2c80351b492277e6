//! ---
//! ps_section: "01-core-functionality"
//! ps_subsection: "timing"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Loop jitter sampling and summary reporting."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const DEFAULT_SAMPLE_CAPACITY: usize = 4096;

/// Rolling window of loop jitter samples in nanoseconds.
///
/// The oldest sample is evicted once `capacity` samples are held, so a
/// long-running engine keeps a bounded footprint.
#[derive(Debug)]
pub struct JitterHistogram {
    capacity: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl Default for JitterHistogram {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }
}

impl JitterHistogram {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_SAMPLE_CAPACITY))),
        }
    }

    pub fn record(&self, jitter: Duration) {
        let nanos = jitter.as_secs_f64() * 1_000_000_000.0;
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn summary(&self) -> Option<JitterSummary> {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return None;
        }
        let count = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / count;
        let variance = if samples.len() > 1 {
            samples
                .iter()
                .map(|value| {
                    let delta = value - mean;
                    delta * delta
                })
                .sum::<f64>()
                / (count - 1.0)
        } else {
            0.0
        };
        let max = samples.iter().copied().fold(f64::MIN, f64::max);
        let min = samples.iter().copied().fold(f64::MAX, f64::min);
        Some(JitterSummary {
            mean_ns: mean,
            std_dev_ns: variance.sqrt(),
            max_ns: max,
            min_ns: min,
            samples: samples.len() as u64,
        })
    }

    /// Write the current summary as pretty JSON. Nothing is written when no
    /// samples have been recorded.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(summary) = self.summary() {
            let mut file = File::create(path)?;
            let json = serde_json::to_vec_pretty(&summary).map_err(std::io::Error::other)?;
            file.write_all(&json)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JitterSummary {
    pub mean_ns: f64,
    pub std_dev_ns: f64,
    pub max_ns: f64,
    pub min_ns: f64,
    pub samples: u64,
}

/// Measures the spacing of successive loop ticks against a target period.
#[derive(Debug)]
pub struct LoopTimingReporter {
    target_interval: Duration,
    last_tick: Mutex<Option<Instant>>,
    histogram: JitterHistogram,
}

impl LoopTimingReporter {
    pub fn new(target_interval: Duration) -> Self {
        Self {
            target_interval,
            last_tick: Mutex::new(None),
            histogram: JitterHistogram::default(),
        }
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// Record a tick boundary at `now`. The first call only arms the reporter.
    pub fn record_tick_at(&self, now: Instant) {
        let mut last_tick = self.last_tick.lock();
        if let Some(previous) = *last_tick {
            let actual = now.saturating_duration_since(previous);
            let jitter = if actual > self.target_interval {
                actual - self.target_interval
            } else {
                self.target_interval - actual
            };
            self.histogram.record(jitter);
        }
        *last_tick = Some(now);
    }

    pub fn record_tick(&self) {
        self.record_tick_at(Instant::now());
    }

    pub fn histogram(&self) -> &JitterHistogram {
        &self.histogram
    }
}
