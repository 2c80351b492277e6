//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "errors"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Error types surfaced by the provider bridge and publishers."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use provsim_sim::{Kind, SimError};
use thiserror::Error;

/// Failures returned to a field-device client as an `ERR=` reply.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider failed to find tag {tag}")]
    TagNotFound { tag: String },
    #[error("Provider failed to find writable tag {tag}")]
    NotWritable { tag: String },
    #[error("Invalid value for tag {tag}: '{value}' is not a valid {kind} value")]
    Conversion {
        tag: String,
        kind: Kind,
        value: String,
    },
    #[error("Simulation rejected request: {0}")]
    Simulation(#[from] SimError),
    #[error("Provider internal error: {0}")]
    Internal(String),
}

/// Failure to hand a snapshot to a downstream sink. Never fatal to the
/// publish loop.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher {publisher} rejected snapshot: {reason}")]
    Rejected {
        publisher: &'static str,
        reason: String,
    },
}
