//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "bridge"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Query/read/write/publish bridge over a running simulation."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use provsim_common::config::ProviderConfig;
use provsim_metrics::BridgeMetrics;
use provsim_rt::RateLimiter;
use provsim_sim::{Direction, EngineStatus, Kind, LoadError, SimError, SimulationContract, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, PublishError};
use crate::mirror::ElementMirror;
use crate::protocol::{self, Reply, Request, WRITE_SUCCESS};
use crate::publish::Publisher;
use crate::tags;

/// Per-bridge switches.
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Emit a debug event for every handled request.
    pub debug: bool,
    pub metrics: Option<BridgeMetrics>,
}

impl BridgeOptions {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            debug: config.debug,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: BridgeMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

struct StagedWrite {
    tag: String,
    target: String,
    kind: Kind,
    value: Value,
}

/// Exposes a running simulation to field devices by tag name.
///
/// One mutex guards the mirror and every call the bridge makes into the
/// engine, and it is held for the whole of each operation. Requests are
/// therefore serialised against each other and against the publish loop,
/// but never against the engine's own stepping, which takes only the
/// engine's state lock.
pub struct ProviderBridge {
    engine: Arc<dyn SimulationContract>,
    mirror: Mutex<ElementMirror>,
    normalize_tags: bool,
    publisher: Arc<dyn Publisher>,
    options: BridgeOptions,
}

impl std::fmt::Debug for ProviderBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBridge")
            .field("normalize_tags", &self.normalize_tags)
            .field("publisher", &self.publisher.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ProviderBridge {
    /// Scan the engine's tags, reject name collisions and take the initial
    /// mirror snapshot.
    pub fn new(
        engine: Arc<dyn SimulationContract>,
        publisher: Arc<dyn Publisher>,
        options: BridgeOptions,
    ) -> Result<Self, LoadError> {
        let state = engine.current_state();
        let normalize_tags = tags::state_needs_normalization(&state);
        tags::ensure_unique(&state, normalize_tags)?;
        if normalize_tags {
            info!("simulation exposes non-canonical tags; publishing normalized device.field names");
        }
        let mirror = ElementMirror::from_state(&state, normalize_tags);
        info!(
            tags = mirror.len(),
            normalize_tags,
            publisher = publisher.name(),
            "provider bridge initialised"
        );
        Ok(Self {
            engine,
            mirror: Mutex::new(mirror),
            normalize_tags,
            publisher,
            options,
        })
    }

    pub fn normalizes_tags(&self) -> bool {
        self.normalize_tags
    }

    pub fn publisher_name(&self) -> &'static str {
        self.publisher.name()
    }

    pub fn handle(&self, request: &Request) -> Reply {
        match request {
            Request::Query => self.query(),
            Request::Read { tag } => self.read(tag),
            Request::Write { values } => self.write(values),
        }
    }

    /// `ACK=` followed by every exposed tag and a trailing comma each.
    pub fn query(&self) -> Reply {
        let tags = self.mirror.lock().tag_list();
        self.finish("query", Ok(tags))
    }

    pub fn read(&self, tag: &str) -> Reply {
        let result = self
            .mirror
            .lock()
            .find(tag)
            .map(|(_, value)| format!("{tag}:{value}"))
            .ok_or_else(|| ProviderError::TagNotFound {
                tag: tag.to_owned(),
            });
        self.finish("read", result)
    }

    /// Apply a batch of textual values to writable tags.
    ///
    /// Every pair is validated before anything is applied; the first invalid
    /// pair fails the call and leaves both the mirror and the engine as they
    /// were. A faulted engine refuses the whole batch.
    pub fn write<I, K, V>(&self, values: I) -> Reply
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let result = self
            .apply_write(values)
            .map(|_| WRITE_SUCCESS.to_owned());
        self.finish("write", result)
    }

    /// Replace the mirror with the engine's current state.
    pub fn refresh_mirror(&self) {
        let mut mirror = self.mirror.lock();
        *mirror = ElementMirror::from_state(&self.engine.current_state(), self.normalize_tags);
    }

    /// Copy of the mirror as of the last refresh or write.
    pub fn snapshot(&self) -> ElementMirror {
        self.mirror.lock().clone()
    }

    /// Refresh, then serialise every tag as `tag:value,`.
    pub fn pack_data(&self) -> String {
        let mut mirror = self.mirror.lock();
        *mirror = ElementMirror::from_state(&self.engine.current_state(), self.normalize_tags);
        mirror.pack()
    }

    /// Publish a single fresh snapshot.
    pub fn publish_once(&self) -> Result<(), PublishError> {
        let payload = self.pack_data();
        let result = self.publisher.publish(&payload);
        if let Some(metrics) = &self.options.metrics {
            metrics.record_publish(result.is_ok());
        }
        result
    }

    /// Publish every `period` until `shutdown` fires. Publish failures are
    /// logged and retried on the next interval.
    pub async fn publish_loop(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut limiter = RateLimiter::new(period);
        let mut published: u64 = 0;
        let mut failed: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(publisher = self.publisher.name(), "publish loop shutdown");
                    break;
                }
                _ = limiter.tick() => {
                    match self.publish_once() {
                        Ok(()) => published += 1,
                        Err(err) => {
                            failed += 1;
                            warn!(publisher = self.publisher.name(), error = %err, "provider periodic publish failed");
                        }
                    }
                }
            }
        }
        info!(published, failed, "publish loop stopped");
    }

    fn apply_write<I, K, V>(&self, values: I) -> Result<usize, ProviderError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut mirror = self.mirror.lock();
        let status = self.engine.status();
        if status == EngineStatus::Faulted {
            return Err(SimError::Halted { status }.into());
        }
        let mut staged = Vec::new();
        for (tag, token) in values {
            let (tag, token) = (tag.as_ref(), token.as_ref());
            let kind = mirror
                .writable_kind(tag)
                .ok_or_else(|| ProviderError::NotWritable {
                    tag: tag.to_owned(),
                })?;
            let value = protocol::parse_token(tag, token, kind)?;
            let target = self.resolve_input(tag, kind)?;
            staged.push(StagedWrite {
                tag: tag.to_owned(),
                target,
                kind,
                value,
            });
        }

        for write in &staged {
            mirror.outputs_from_fd.replace(&write.tag, write.kind, write.value);
            self.engine
                .set_parameter(&write.target, Direction::Input, write.kind, write.value)?;
            if self.options.debug {
                debug!(tag = %write.tag, engine_tag = %write.target, value = %write.value, "simulation input written");
            }
        }
        Ok(staged.len())
    }

    /// Engine input name behind an exposed tag: the tag itself, or its device
    /// component when the tag was normalized from a bare name.
    fn resolve_input(&self, tag: &str, kind: Kind) -> Result<String, ProviderError> {
        match self.engine.get_parameter(tag, Direction::Input, kind) {
            Ok(_) => Ok(tag.to_owned()),
            Err(SimError::NotFound { .. }) => {
                let device = tags::device_component(tag);
                self.engine.get_parameter(device, Direction::Input, kind)?;
                Ok(device.to_owned())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn finish(&self, op: &'static str, result: Result<String, ProviderError>) -> Reply {
        let reply = match result {
            Ok(body) => Reply::Ack(body),
            Err(err) => {
                warn!(op, error = %err, "provider request failed");
                Reply::from(err)
            }
        };
        if let Some(metrics) = &self.options.metrics {
            metrics.record_request(op, reply.is_ack());
        }
        if self.options.debug {
            debug!(op, reply = %reply, "provider request handled");
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::InMemoryPublisher;
    use provsim_sim::{ProcessState, Simulation, SimulationEngine};

    struct Pump;

    impl Simulation for Pump {
        fn name(&self) -> &str {
            "pump"
        }

        fn timestep(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn initial_state(&self) -> ProcessState {
            ProcessState::new()
                .with_input_analog("speed", 0.0)
                .with_input_binary("pump.enable", false)
                .with_output_analog("pump.flow", 0.0)
        }

        fn advance(&mut self, state: &mut ProcessState) {
            let enabled = state.input.binary.get("pump.enable").copied().unwrap_or(false);
            let speed = state.input.analog.get("speed").copied().unwrap_or(0.0);
            if let Some(flow) = state.output.analog.get_mut("pump.flow") {
                *flow = if enabled { speed * 2.0 } else { 0.0 };
            }
        }
    }

    fn bridge() -> (Arc<SimulationEngine>, ProviderBridge) {
        let engine = Arc::new(SimulationEngine::new(Box::new(Pump)).unwrap());
        let bridge = ProviderBridge::new(
            engine.clone(),
            Arc::new(InMemoryPublisher::default()),
            BridgeOptions::default(),
        )
        .unwrap();
        (engine, bridge)
    }

    #[test]
    fn bare_engine_input_is_written_through_device_fallback() {
        let (engine, bridge) = bridge();
        assert!(bridge.normalizes_tags());
        assert!(bridge.write([("speed.value", "4.5")]).is_ack());
        assert_eq!(
            engine.get_parameter("speed", Direction::Input, Kind::Analog).unwrap(),
            Value::Analog(4.5)
        );
        assert_eq!(bridge.read("speed.value").to_string(), "ACK=speed.value:4.5");
    }

    #[test]
    fn refresh_picks_up_engine_steps() {
        let (engine, bridge) = bridge();
        bridge.write([("speed.value", "3"), ("pump.enable", "on")]);
        engine.advance().unwrap();
        assert_eq!(bridge.read("pump.flow").to_string(), "ACK=pump.flow:0.0");
        bridge.refresh_mirror();
        assert_eq!(bridge.read("pump.flow").to_string(), "ACK=pump.flow:6.0");
    }

    #[test]
    fn outputs_are_not_writable() {
        let (_, bridge) = bridge();
        assert_eq!(
            bridge.write([("pump.flow", "1.0")]).to_string(),
            "ERR=Provider failed to find writable tag pump.flow"
        );
    }
}
