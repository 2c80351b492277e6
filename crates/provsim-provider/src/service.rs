//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "service"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Channel-based request service fronting the provider bridge."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::bridge::ProviderBridge;
use crate::error::ProviderError;
use crate::protocol::{Reply, Request};

const DEFAULT_QUEUE_DEPTH: usize = 64;

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Reply>,
}

/// Cloneable handle transports use to submit requests.
#[derive(Clone, Debug)]
pub struct ProviderClient {
    tx: mpsc::Sender<Envelope>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl ProviderClient {
    /// Submit `request` and wait for its reply. A stopped service yields an
    /// error reply rather than a fault.
    pub async fn request(&self, request: Request) -> Reply {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            request,
            reply: reply_tx,
        };
        if self.tx.send(envelope).await.is_err() {
            return unavailable();
        }
        reply_rx.await.unwrap_or_else(|_| unavailable())
    }
}

fn unavailable() -> Reply {
    Reply::from(ProviderError::Internal(
        "provider service is not running".to_owned(),
    ))
}

/// Task draining the request channel into a [`ProviderBridge`].
pub struct ProviderService;

impl ProviderService {
    pub fn spawn(
        bridge: Arc<ProviderBridge>,
        shutdown: broadcast::Receiver<()>,
    ) -> (ProviderClient, JoinHandle<()>) {
        Self::spawn_with_depth(bridge, DEFAULT_QUEUE_DEPTH, shutdown)
    }

    /// Each request runs on the blocking pool so a contended bridge lock
    /// never stalls the async workers.
    pub fn spawn_with_depth(
        bridge: Arc<ProviderBridge>,
        depth: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (ProviderClient, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Envelope>(depth.max(1));
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("provider service shutdown");
                        break;
                    }
                    envelope = rx.recv() => {
                        let Some(Envelope { request, reply }) = envelope else {
                            break;
                        };
                        let bridge = bridge.clone();
                        tokio::spawn(async move {
                            let op = request.op();
                            let outcome = tokio::task::spawn_blocking(move || bridge.handle(&request)).await;
                            let response = match outcome {
                                Ok(response) => response,
                                Err(err) => {
                                    error!(op, error = %err, "provider request handler panicked");
                                    Reply::from(ProviderError::Internal(format!("{op} handler failed")))
                                }
                            };
                            let _ = reply.send(response);
                        });
                    }
                }
            }
        });
        (ProviderClient { tx }, task)
    }
}
