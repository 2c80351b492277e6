//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "publish"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Sinks receiving periodic provider snapshots."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::PublishError;

/// Destination for the packed `tag:value,` snapshot emitted each publish
/// interval.
pub trait Publisher: Send + Sync {
    fn publish(&self, payload: &str) -> Result<(), PublishError>;

    fn name(&self) -> &'static str;
}

/// Keeps the most recent snapshots in memory.
#[derive(Debug, Clone)]
pub struct InMemoryPublisher {
    capacity: usize,
    history: Arc<Mutex<VecDeque<String>>>,
}

impl InMemoryPublisher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn latest(&self) -> Option<String> {
        self.history.lock().back().cloned()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Publisher for InMemoryPublisher {
    fn publish(&self, payload: &str) -> Result<(), PublishError> {
        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(payload.to_owned());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Emits each snapshot as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl Publisher for TracingPublisher {
    fn publish(&self, payload: &str) -> Result<(), PublishError> {
        info!(target: "provsim::publish", payload, "provider snapshot");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_history_is_bounded() {
        let publisher = InMemoryPublisher::new(2);
        for payload in ["a.value:1.0,", "a.value:2.0,", "a.value:3.0,"] {
            publisher.publish(payload).unwrap();
        }
        assert_eq!(publisher.history(), vec!["a.value:2.0,", "a.value:3.0,"]);
        assert_eq!(publisher.latest().as_deref(), Some("a.value:3.0,"));
    }

    #[test]
    fn clones_share_history() {
        let publisher = InMemoryPublisher::default();
        let handle = publisher.clone();
        publisher.publish("x.status:true,").unwrap();
        assert_eq!(handle.len(), 1);
    }
}
