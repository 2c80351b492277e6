//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "05-models"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Process models bundled with the engine."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---

pub mod thermostat;

pub use thermostat::Thermostat;
