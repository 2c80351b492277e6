//! ---
//! ps_section: "01-core-functionality"
//! ps_subsection: "module"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Runtime helpers supporting the engine and provider loops."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
//! Real-time scheduling helpers for the provsim runtime.

pub mod scheduling;

pub use scheduling::{RateLimiter, TickOutcome, TickPacer};
