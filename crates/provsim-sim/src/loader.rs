//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "04-loader"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Registry resolving configured model names to engines."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;
use provsim_common::config::SimulationConfig;
use tracing::{error, info};

use crate::engine::{Simulation, SimulationEngine};
use crate::error::{panic_reason, LoadError};
use crate::models;

/// Constructor for a registered model.
pub type ModelFactory = fn() -> Box<dyn Simulation>;

/// Named model constructors. Loading is fail-closed: any fault or invariant
/// violation yields a [`LoadError`] and no engine.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    factories: IndexMap<String, ModelFactory>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the models shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(models::thermostat::MODEL_NAME, models::thermostat::factory);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ModelFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn load(&self, name: &str) -> Result<SimulationEngine, LoadError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LoadError::UnknownModel {
                name: name.to_owned(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })?;

        // Requires `panic = "unwind"` in the build profile.
        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            let model = factory();
            SimulationEngine::new(model)
        }));
        let engine = match built {
            Ok(result) => result,
            Err(payload) => Err(LoadError::Fault {
                name: name.to_owned(),
                reason: panic_reason(payload.as_ref()),
            }),
        }
        .inspect_err(|err| error!(model = %name, error = %err, "simulation model rejected"))?;

        info!(model = %name, timestep_ms = engine.timestep().as_millis() as u64, "simulation model loaded");
        Ok(engine)
    }

    /// Load the configured model, applying its timestep override if any.
    pub fn load_configured(&self, config: &SimulationConfig) -> Result<SimulationEngine, LoadError> {
        let engine = self.load(&config.model)?;
        match config.timestep {
            Some(timestep) => engine.with_timestep(timestep),
            None => Ok(engine),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::ProcessState;

    struct Broken;

    impl Simulation for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn timestep(&self) -> Duration {
            Duration::from_secs(1)
        }

        fn initial_state(&self) -> ProcessState {
            ProcessState::new()
                .with_input_binary("breaker.status", true)
                .with_output_binary("breaker.status", false)
        }

        fn advance(&mut self, _state: &mut ProcessState) {}
    }

    fn broken() -> Box<dyn Simulation> {
        Box::new(Broken)
    }

    fn panicking() -> Box<dyn Simulation> {
        panic!("solver library missing")
    }

    #[test]
    fn builtin_registry_loads_thermostat() {
        let registry = ModelRegistry::with_builtin();
        let engine = registry.load("thermostat").expect("thermostat loads");
        assert_eq!(engine.name(), "thermostat");
        assert_eq!(engine.timestep(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_model_lists_alternatives() {
        let err = ModelRegistry::with_builtin().load("boiler").unwrap_err();
        assert!(matches!(err, LoadError::UnknownModel { .. }));
        assert!(err.to_string().contains("thermostat"));
    }

    #[test]
    fn invariant_violations_abort_loading() {
        let mut registry = ModelRegistry::new();
        registry.register("broken", broken);
        assert!(matches!(
            registry.load("broken"),
            Err(LoadError::DuplicateTag { tag }) if tag == "breaker.status"
        ));
    }

    #[test]
    fn constructor_panic_becomes_load_fault() {
        let mut registry = ModelRegistry::new();
        registry.register("panicking", panicking);
        let err = registry.load("panicking").unwrap_err();
        assert!(matches!(err, LoadError::Fault { .. }));
        assert!(err.to_string().contains("solver library missing"));
    }

    #[test]
    fn configured_timestep_overrides_model() {
        let config = SimulationConfig {
            model: "thermostat".into(),
            timestep: Some(Duration::from_millis(100)),
        };
        let engine = ModelRegistry::with_builtin()
            .load_configured(&config)
            .expect("loads");
        assert_eq!(engine.timestep(), Duration::from_millis(100));
    }
}
