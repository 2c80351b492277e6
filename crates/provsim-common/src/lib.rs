//! ---
//! ps_section: "01-core-functionality"
//! ps_subsection: "module"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Shared primitives and utilities for the provider runtime."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
//! Core shared primitives for the provsim workspace.
//! This crate exposes configuration loading, logging, and loop timing
//! utilities consumed by the engine, the provider bridge, and the daemon.

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{AppConfig, LoggingConfig, MetricsConfig, ProviderConfig, SimulationConfig};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{JitterHistogram, JitterSummary, LoopTimingReporter};
