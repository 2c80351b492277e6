//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "03-engine"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Fixed-timestep simulation engine and lifecycle state machine."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use provsim_common::metrics::LoopTimingReporter;
use provsim_metrics::EngineMetrics;
use provsim_rt::{TickOutcome, TickPacer};
use tracing::{debug, error, info, warn};

use crate::error::{panic_reason, LoadError, SimError};
use crate::state::{Direction, Kind, ProcessState, Value};

/// A process model advanced by the engine.
///
/// `advance` must be deterministic for a given input state and must not
/// block: it runs on the engine's real-time thread.
pub trait Simulation: Send {
    fn name(&self) -> &str;

    fn timestep(&self) -> Duration;

    /// Fully populated initial inputs and outputs.
    fn initial_state(&self) -> ProcessState;

    /// Compute new outputs from the current inputs.
    fn advance(&mut self, state: &mut ProcessState);
}

/// What the provider bridge requires from a running simulation.
pub trait SimulationContract: Send + Sync {
    fn current_state(&self) -> ProcessState;

    fn get_parameter(&self, tag: &str, direction: Direction, kind: Kind) -> Result<Value, SimError>;

    fn set_parameter(
        &self,
        tag: &str,
        direction: Direction,
        kind: Kind,
        value: Value,
    ) -> Result<(), SimError>;

    /// Run the real-time loop on the calling thread until [`stop`](Self::stop).
    fn run(&self) -> Result<(), SimError>;

    fn stop(&self);

    fn status(&self) -> EngineStatus;
}

/// Engine lifecycle. Transitions only move forward; `Faulted` is reached
/// instead of `Stopped` when the model fails during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Created,
    Running,
    Stopped,
    Faulted,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Created => f.write_str("created"),
            EngineStatus::Running => f.write_str("running"),
            EngineStatus::Stopped => f.write_str("stopped"),
            EngineStatus::Faulted => f.write_str("faulted"),
        }
    }
}

/// Counters maintained by the real-time loop.
#[derive(Debug, Default)]
pub struct EngineStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
}

impl EngineStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Owns a model and its [`ProcessState`] and advances them in real time.
pub struct SimulationEngine {
    name: String,
    timestep: Duration,
    model: Mutex<Box<dyn Simulation>>,
    state: Mutex<ProcessState>,
    status: Mutex<EngineStatus>,
    stop_requested: AtomicBool,
    stats: EngineStats,
    timing: LoopTimingReporter,
    metrics: Option<EngineMetrics>,
}

impl fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("name", &self.name)
            .field("timestep", &self.timestep)
            .field("status", &self.status())
            .field("stats", &self.stats)
            .finish()
    }
}

impl SimulationEngine {
    /// Build an engine around `model`, populating and validating its state.
    pub fn new(model: Box<dyn Simulation>) -> Result<Self, LoadError> {
        let name = model.name().to_owned();
        let timestep = model.timestep();
        if timestep.is_zero() {
            return Err(LoadError::InvalidTimestep);
        }

        let state = model.initial_state();
        state.validate()?;

        debug!(model = %name, timestep_ms = timestep.as_millis() as u64, tags = state.len(), "simulation model initialised");
        Ok(Self {
            name,
            timestep,
            model: Mutex::new(model),
            state: Mutex::new(state),
            status: Mutex::new(EngineStatus::Created),
            stop_requested: AtomicBool::new(false),
            stats: EngineStats::default(),
            timing: LoopTimingReporter::new(timestep),
            metrics: None,
        })
    }

    /// Replace the model's own timestep.
    pub fn with_timestep(mut self, timestep: Duration) -> Result<Self, LoadError> {
        if timestep.is_zero() {
            return Err(LoadError::InvalidTimestep);
        }
        self.timestep = timestep;
        self.timing = LoopTimingReporter::new(timestep);
        Ok(self)
    }

    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn timing(&self) -> &LoopTimingReporter {
        &self.timing
    }

    /// Advance the model by one step.
    ///
    /// A step that panics or leaves a non-finite analog value is reported as
    /// [`SimError::ModelFault`] and the state is put back as it was before
    /// the step. Catching the panic needs `panic = "unwind"`.
    pub fn advance(&self) -> Result<(), SimError> {
        let mut model = self.model.lock();
        let mut state = self.state.lock();
        let before = state.clone();
        let stepped = panic::catch_unwind(AssertUnwindSafe(|| model.advance(&mut state)));
        let reason = match stepped {
            Err(payload) => Some(panic_reason(payload.as_ref())),
            Ok(()) => state
                .first_non_finite()
                .map(|(direction, tag)| format!("step left a non-finite value in {direction} tag '{tag}'")),
        };
        match reason {
            None => Ok(()),
            Some(reason) => {
                *state = before;
                Err(SimError::ModelFault {
                    model: self.name.clone(),
                    reason,
                })
            }
        }
    }

    /// Move to `Running` and run the loop on a dedicated thread.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, SimError> {
        self.transition(EngineStatus::Created, EngineStatus::Running)?;
        let engine = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("provsim-sim-{}", self.name))
            .spawn(move || engine.run_loop());
        match spawned {
            Ok(handle) => Ok(handle),
            Err(err) => {
                *self.status.lock() = EngineStatus::Stopped;
                Err(SimError::Spawn(err))
            }
        }
    }

    fn transition(&self, from: EngineStatus, to: EngineStatus) -> Result<(), SimError> {
        let mut status = self.status.lock();
        if *status != from {
            return Err(SimError::InvalidTransition { from: *status, to });
        }
        *status = to;
        Ok(())
    }

    fn run_loop(&self) {
        let pacer = TickPacer::new(self.timestep);
        info!(model = %self.name, timestep_ms = self.timestep.as_millis() as u64, "simulation loop started");

        while !self.stop_requested.load(Ordering::Acquire) {
            let started = Instant::now();
            self.timing.record_tick_at(started);
            if let Err(err) = self.advance() {
                self.fault(&err);
                break;
            }
            let outcome = pacer.pace(started);
            self.record_tick(outcome);
        }

        let summary = self.timing.histogram().summary();
        info!(
            model = %self.name,
            ticks = self.stats.ticks(),
            overruns = self.stats.overruns(),
            mean_jitter_ns = summary.as_ref().map(|s| s.mean_ns),
            "simulation loop stopped"
        );
    }

    /// Halt the loop after a failed tick. A stop that already won the race
    /// keeps the engine `Stopped`.
    fn fault(&self, err: &SimError) {
        let mut status = self.status.lock();
        error!(
            model = %self.name,
            tick = self.stats.ticks() + 1,
            error = %err,
            "simulation model faulted; loop halted"
        );
        if *status == EngineStatus::Running {
            *status = EngineStatus::Faulted;
        }
        self.stop_requested.store(true, Ordering::Release);
    }

    fn record_tick(&self, outcome: TickOutcome) {
        let tick = self.stats.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if let TickOutcome::Overrun { elapsed, budget } = outcome {
            self.stats.overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                model = %self.name,
                tick,
                elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
                budget_ms = budget.as_secs_f64() * 1_000.0,
                "simulation running slower than real time"
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.observe_tick(outcome.elapsed().as_secs_f64(), outcome.is_overrun());
        }
    }
}

impl SimulationContract for SimulationEngine {
    fn current_state(&self) -> ProcessState {
        self.state.lock().clone()
    }

    fn get_parameter(&self, tag: &str, direction: Direction, kind: Kind) -> Result<Value, SimError> {
        self.state
            .lock()
            .get(tag, direction, kind)
            .ok_or_else(|| SimError::NotFound {
                tag: tag.to_owned(),
                direction,
                kind,
            })
    }

    fn set_parameter(
        &self,
        tag: &str,
        direction: Direction,
        kind: Kind,
        value: Value,
    ) -> Result<(), SimError> {
        let status = self.status();
        if status == EngineStatus::Faulted {
            return Err(SimError::Halted { status });
        }
        let value = value.coerce(kind);
        if let Value::Analog(raw) = value {
            if !raw.is_finite() {
                return Err(SimError::NonFinite {
                    tag: tag.to_owned(),
                    value: raw,
                });
            }
        }
        let mut state = self.state.lock();
        if state.variables_mut(direction).replace(tag, kind, value) {
            Ok(())
        } else {
            Err(SimError::NotFound {
                tag: tag.to_owned(),
                direction,
                kind,
            })
        }
    }

    fn run(&self) -> Result<(), SimError> {
        self.transition(EngineStatus::Created, EngineStatus::Running)?;
        self.run_loop();
        match self.status() {
            EngineStatus::Faulted => Err(SimError::Halted {
                status: EngineStatus::Faulted,
            }),
            _ => Ok(()),
        }
    }

    fn stop(&self) {
        let mut status = self.status.lock();
        let previous = *status;
        if matches!(previous, EngineStatus::Created | EngineStatus::Running) {
            debug!(model = %self.name, from = %previous, "simulation stop requested");
            *status = EngineStatus::Stopped;
            self.stop_requested.store(true, Ordering::Release);
        }
    }

    fn status(&self) -> EngineStatus {
        *self.status.lock()
    }
}
