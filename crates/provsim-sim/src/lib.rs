//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "01-bootstrap"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Simulation runtime module exports and shared types."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
//! Process state, the real-time simulation engine, and the model registry.
//!
//! A process model implements [`Simulation`]; the [`SimulationEngine`] owns
//! its [`ProcessState`], advances it on a dedicated thread at a fixed
//! timestep, and exposes it to collaborators through [`SimulationContract`].

pub mod engine;
pub mod error;
pub mod loader;
pub mod models;
pub mod state;

pub use engine::{EngineStats, EngineStatus, Simulation, SimulationContract, SimulationEngine};
pub use error::{LoadError, SimError};
pub use loader::{ModelFactory, ModelRegistry};
pub use state::{Direction, Kind, ProcessState, Value, Variables};
