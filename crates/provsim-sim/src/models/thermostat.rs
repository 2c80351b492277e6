//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "05-models"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Thermostat process model walking temperature toward a setpoint."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
//! Two-state heater that walks the temperature toward a setpoint.
//!
//! Inputs (written by field devices): `temperature_setpoint.value`,
//! `on.status`. Outputs: `temperature.value`, `temperature_diff.value`,
//! `at_temp.status`.

use std::time::Duration;

use crate::engine::Simulation;
use crate::state::ProcessState;

pub const MODEL_NAME: &str = "thermostat";

const SETPOINT: &str = "temperature_setpoint.value";
const ON: &str = "on.status";
const TEMPERATURE: &str = "temperature.value";
const DIFF: &str = "temperature_diff.value";
const AT_TEMP: &str = "at_temp.status";

/// Degrees moved per step while heating or cooling.
const RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Thermostat;

pub fn factory() -> Box<dyn Simulation> {
    Box::new(Thermostat)
}

impl Simulation for Thermostat {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn timestep(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn initial_state(&self) -> ProcessState {
        ProcessState::new()
            .with_input_analog(SETPOINT, 100.0)
            .with_input_binary(ON, true)
            .with_output_analog(TEMPERATURE, 25.0)
            .with_output_analog(DIFF, 75.0)
            .with_output_binary(AT_TEMP, false)
    }

    fn advance(&mut self, state: &mut ProcessState) {
        let setpoint = state.input.analog.get(SETPOINT).copied().unwrap_or_default();
        let on = state.input.binary.get(ON).copied().unwrap_or_default();
        let diff = state.output.analog.get(DIFF).copied().unwrap_or_default();
        let Some(temperature) = state.output.analog.get_mut(TEMPERATURE) else {
            return;
        };

        if on {
            if diff > 0.0 {
                *temperature += RATE;
            } else if diff < 0.0 {
                *temperature -= RATE;
            }
        }
        let temperature = *temperature;

        let diff = setpoint - temperature;
        state.output.analog.insert(DIFF.to_owned(), diff);
        state.output.binary.insert(AT_TEMP.to_owned(), diff == 0.0);
    }
}
