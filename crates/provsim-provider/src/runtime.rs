//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "runtime"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Startup and shutdown sequencing for engine plus bridge."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread::JoinHandle;

use provsim_sim::{LoadError, SimulationContract, SimulationEngine};
use tracing::{error, info};

use crate::bridge::{BridgeOptions, ProviderBridge};
use crate::publish::Publisher;

/// A started engine thread together with the bridge serving it.
#[derive(Debug)]
pub struct ProviderRuntime {
    engine: Arc<SimulationEngine>,
    engine_thread: Option<JoinHandle<()>>,
    bridge: Arc<ProviderBridge>,
}

impl ProviderRuntime {
    /// Start `engine` on its own thread and bring up the bridge.
    ///
    /// The engine has already passed loading, so this only fails if the
    /// thread cannot start or the exposed tag names collide; in the latter
    /// case the engine is stopped again before returning.
    pub fn start(
        engine: SimulationEngine,
        publisher: Arc<dyn Publisher>,
        options: BridgeOptions,
    ) -> Result<Self, LoadError> {
        let engine = Arc::new(engine);
        let engine_thread = engine.start()?;
        let contract: Arc<dyn SimulationContract> = engine.clone();
        match ProviderBridge::new(contract, publisher, options) {
            Ok(bridge) => {
                info!(model = engine.name(), "provider runtime started");
                Ok(Self {
                    engine,
                    engine_thread: Some(engine_thread),
                    bridge: Arc::new(bridge),
                })
            }
            Err(err) => {
                engine.stop();
                if engine_thread.join().is_err() {
                    error!(model = engine.name(), "simulation thread panicked");
                }
                Err(err)
            }
        }
    }

    pub fn bridge(&self) -> Arc<ProviderBridge> {
        self.bridge.clone()
    }

    pub fn engine(&self) -> &Arc<SimulationEngine> {
        &self.engine
    }

    /// Stop the engine and wait for its thread to exit. Blocks for at most
    /// one timestep.
    pub fn shutdown(mut self) {
        self.stop_engine();
    }

    fn stop_engine(&mut self) {
        self.engine.stop();
        if let Some(handle) = self.engine_thread.take() {
            if handle.join().is_err() {
                error!(model = self.engine.name(), "simulation thread panicked");
            }
        }
    }
}

impl Drop for ProviderRuntime {
    fn drop(&mut self) {
        self.stop_engine();
    }
}
