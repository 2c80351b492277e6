//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "02-errors"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Error types raised by the engine and the model loader."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::any::Any;

use thiserror::Error;

use crate::engine::EngineStatus;
use crate::state::{Direction, Kind};

/// Failures reported by a running engine's accessors and lifecycle calls.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("tag {tag} not found in {kind} {direction}")]
    NotFound {
        tag: String,
        direction: Direction,
        kind: Kind,
    },
    #[error("analog value for tag {tag} must be finite, got {value}")]
    NonFinite { tag: String, value: f64 },
    #[error("cannot move simulation engine from {from} to {to}")]
    InvalidTransition { from: EngineStatus, to: EngineStatus },
    #[error("failed to spawn simulation thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("simulation model '{model}' faulted: {reason}")]
    ModelFault { model: String, reason: String },
    #[error("simulation engine is {status}; inputs are no longer accepted")]
    Halted { status: EngineStatus },
}

/// Reasons a simulation model is refused at startup.
///
/// Every variant is fatal: the provider never runs against a model that
/// failed to load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no simulation model registered under '{name}' (available: {available})")]
    UnknownModel { name: String, available: String },
    #[error("simulation model '{name}' faulted while loading: {reason}")]
    Fault { name: String, reason: String },
    #[error("simulation timestep must be strictly positive")]
    InvalidTimestep,
    #[error("simulation state contains an empty tag name")]
    EmptyTag,
    #[error("tag '{tag}' is declared in more than one bucket")]
    DuplicateTag { tag: String },
    #[error("{direction} tag '{tag}' must hold a finite analog value")]
    NonFiniteValue { tag: String, direction: Direction },
    #[error("failed to start simulation: {0}")]
    Start(#[from] SimError),
}

/// Message carried by a caught panic payload.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "model panicked".to_owned()
    }
}
