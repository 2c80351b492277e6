//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "module"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Provider bridge exposing simulation tags to field devices."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
//! Field-device provider for a running simulation.
//!
//! The [`ProviderBridge`] keeps a direction-flipped [`ElementMirror`] of the
//! engine's process state and answers `query`, `read` and `write` requests
//! against it, while a periodic loop publishes the whole mirror through a
//! [`Publisher`]. A transport plugs in either by calling the bridge directly
//! or through the [`ProviderClient`] request channel.

pub mod bridge;
pub mod error;
pub mod mirror;
pub mod protocol;
pub mod publish;
pub mod runtime;
pub mod service;
pub mod tags;

pub use bridge::{BridgeOptions, ProviderBridge};
pub use error::{ProviderError, PublishError};
pub use mirror::{ElementMirror, Role};
pub use protocol::{Reply, Request};
pub use publish::{InMemoryPublisher, Publisher, TracingPublisher};
pub use runtime::ProviderRuntime;
pub use service::{ProviderClient, ProviderService};
