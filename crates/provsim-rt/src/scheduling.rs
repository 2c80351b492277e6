//! ---
//! ps_section: "01-core-functionality"
//! ps_subsection: "scheduling"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Interval limiter and fixed-timestep pacing primitives."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

/// Async rate limiter that keeps a loop on a fixed wall-clock interval.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub async fn tick(&mut self) -> tokio::time::Instant {
        self.interval.tick().await
    }
}

/// Result of pacing one fixed-timestep iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The work finished inside its budget; the loop slept for `remaining`.
    OnTime { elapsed: Duration, remaining: Duration },
    /// The work used the whole budget or more; the loop did not sleep.
    Overrun { elapsed: Duration, budget: Duration },
}

impl TickOutcome {
    pub fn is_overrun(&self) -> bool {
        matches!(self, TickOutcome::Overrun { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            TickOutcome::OnTime { elapsed, .. } | TickOutcome::Overrun { elapsed, .. } => *elapsed,
        }
    }
}

/// Blocking pacer for a dedicated loop thread.
///
/// Each iteration is measured from its own start, so a late iteration does
/// not shorten the next one.
#[derive(Debug, Clone, Copy)]
pub struct TickPacer {
    timestep: Duration,
}

impl TickPacer {
    pub fn new(timestep: Duration) -> Self {
        Self { timestep }
    }

    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    /// Classify an iteration that took `elapsed` without sleeping.
    pub fn classify(&self, elapsed: Duration) -> TickOutcome {
        match self.timestep.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => TickOutcome::OnTime { elapsed, remaining },
            _ => TickOutcome::Overrun {
                elapsed,
                budget: self.timestep,
            },
        }
    }

    /// Sleep for whatever is left of the timestep since `started`.
    pub fn pace(&self, started: Instant) -> TickOutcome {
        let outcome = self.classify(started.elapsed());
        if let TickOutcome::OnTime { remaining, .. } = outcome {
            std::thread::sleep(remaining);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_short_iteration_as_on_time() {
        let pacer = TickPacer::new(Duration::from_millis(100));
        assert_eq!(
            pacer.classify(Duration::from_millis(30)),
            TickOutcome::OnTime {
                elapsed: Duration::from_millis(30),
                remaining: Duration::from_millis(70),
            }
        );
    }

    #[test]
    fn exhausted_budget_is_an_overrun() {
        let pacer = TickPacer::new(Duration::from_millis(100));
        assert!(pacer.classify(Duration::from_millis(100)).is_overrun());
        assert!(pacer.classify(Duration::from_millis(250)).is_overrun());
    }

    #[test]
    fn pace_sleeps_out_the_remainder() {
        let pacer = TickPacer::new(Duration::from_millis(20));
        let started = Instant::now();
        let outcome = pacer.pace(started);
        assert!(!outcome.is_overrun());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_ticks_on_period() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let first = limiter.tick().await;
        let second = limiter.tick().await;
        assert_eq!(second - first, Duration::from_secs(1));
        assert_eq!(limiter.period(), Duration::from_secs(1));
    }
}
