//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "03-engine"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Integration tests for the real-time simulation loop."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use provsim_metrics::{new_registry, EngineMetrics};
use provsim_sim::{
    Direction, EngineStatus, Kind, ModelRegistry, ProcessState, Simulation, SimulationContract,
    SimulationEngine, Value,
};

/// Panics on step `fail_on`, counting completed steps until then.
struct Brittle {
    fail_on: u32,
    steps: u32,
}

impl Simulation for Brittle {
    fn name(&self) -> &str {
        "brittle"
    }

    fn timestep(&self) -> Duration {
        Duration::from_millis(5)
    }

    fn initial_state(&self) -> ProcessState {
        ProcessState::new().with_output_analog("solver.iterations", 0.0)
    }

    fn advance(&mut self, state: &mut ProcessState) {
        self.steps += 1;
        if self.steps == self.fail_on {
            panic!("solver diverged at step {}", self.steps);
        }
        *state.output.analog.get_mut("solver.iterations").unwrap() += 1.0;
    }
}

struct Sluggish {
    work: Duration,
    timestep: Duration,
}

impl Simulation for Sluggish {
    fn name(&self) -> &str {
        "sluggish"
    }

    fn timestep(&self) -> Duration {
        self.timestep
    }

    fn initial_state(&self) -> ProcessState {
        ProcessState::new().with_output_analog("solver.iterations", 0.0)
    }

    fn advance(&mut self, state: &mut ProcessState) {
        thread::sleep(self.work);
        *state.output.analog.get_mut("solver.iterations").unwrap() += 1.0;
    }
}

fn run_for(engine: &Arc<SimulationEngine>, wall: Duration) {
    let handle = engine.start().expect("engine starts");
    thread::sleep(wall);
    engine.stop();
    handle.join().expect("loop thread joins");
}

#[test]
fn every_slow_tick_records_one_overrun() {
    let metrics = EngineMetrics::new(new_registry()).expect("metrics");
    let engine = Arc::new(
        SimulationEngine::new(Box::new(Sluggish {
            work: Duration::from_millis(15),
            timestep: Duration::from_millis(10),
        }))
        .expect("valid model")
        .with_metrics(metrics.clone()),
    );

    run_for(&engine, Duration::from_millis(150));

    // Back-to-back 15ms ticks fit about ten into the window; sleeping a
    // timestep after each overrun would allow at most six.
    let ticks = engine.stats().ticks();
    assert!(ticks >= 7, "late ticks must start immediately, got {ticks}");
    assert_eq!(engine.stats().overruns(), ticks);
    assert_eq!(metrics.overruns(), ticks);
}

#[test]
fn fast_ticks_sleep_out_their_budget() {
    let engine = Arc::new(
        SimulationEngine::new(Box::new(Sluggish {
            work: Duration::ZERO,
            timestep: Duration::from_millis(25),
        }))
        .expect("valid model"),
    );

    run_for(&engine, Duration::from_millis(110));

    let ticks = engine.stats().ticks();
    assert_eq!(engine.stats().overruns(), 0);
    assert!(
        (2..=6).contains(&ticks),
        "a 25ms timestep over ~110ms should yield a handful of ticks, got {ticks}"
    );
    assert_eq!(engine.status(), EngineStatus::Stopped);
}

#[test]
fn thermostat_tracks_setpoint_written_while_running() {
    let engine = Arc::new(
        ModelRegistry::with_builtin()
            .load("thermostat")
            .expect("thermostat loads")
            .with_timestep(Duration::from_millis(5))
            .expect("positive timestep"),
    );
    engine
        .set_parameter(
            "temperature_setpoint.value",
            Direction::Input,
            Kind::Analog,
            Value::Analog(27.0),
        )
        .expect("setpoint is an input");

    run_for(&engine, Duration::from_millis(100));

    let state = engine.current_state();
    assert_eq!(state.output.analog["temperature.value"], 27.0);
    assert_eq!(state.output.analog["temperature_diff.value"], 0.0);
    assert_eq!(
        engine
            .get_parameter("at_temp.status", Direction::Output, Kind::Binary)
            .unwrap(),
        Value::Binary(true)
    );
}

#[test]
fn panicking_model_faults_the_loop_and_freezes_ticks() {
    let engine = Arc::new(
        SimulationEngine::new(Box::new(Brittle { fail_on: 3, steps: 0 })).expect("valid model"),
    );
    let handle = engine.start().expect("engine starts");
    thread::sleep(Duration::from_millis(60));

    assert_eq!(engine.status(), EngineStatus::Faulted);
    assert!(handle.is_finished(), "loop thread must exit on a model fault");
    handle.join().expect("fault is contained inside the loop thread");
    assert_eq!(engine.stats().ticks(), 2);
    assert_eq!(engine.current_state().output.analog["solver.iterations"], 2.0);

    thread::sleep(Duration::from_millis(30));
    assert_eq!(engine.stats().ticks(), 2);
    assert!(engine
        .set_parameter("solver.iterations", Direction::Output, Kind::Analog, Value::Analog(0.0))
        .is_err());
}
