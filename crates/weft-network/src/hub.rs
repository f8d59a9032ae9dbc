//! The broadcast set of live viewer connections.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use weft_types::{protocol::ServerMessage, Result};

use crate::network_error;

pub type ConnectionId = u64;

/// One viewer's outbound side.
pub trait ClientTransport: Send + Sync {
    /// Whether the transport currently accepts messages.
    fn is_ready(&self) -> bool;
    fn deliver(&self, message: &ServerMessage) -> Result<()>;
}

/// Transport backed by the queue a WebSocket writer task drains.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ClientTransport for ChannelTransport {
    fn is_ready(&self) -> bool {
        !self.tx.is_closed()
    }

    fn deliver(&self, message: &ServerMessage) -> Result<()> {
        self.tx
            .send(message.clone())
            .map_err(|_| network_error("viewer queue closed"))
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct ConnectionHub {
    next_id: AtomicU64,
    clients: Mutex<BTreeMap<ConnectionId, Arc<dyn ClientTransport>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, transport: Arc<dyn ClientTransport>) -> Result<ConnectionId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| network_error("failed to lock connection set"))?;
        clients.insert(id, transport);
        info!(connection = id, live = clients.len(), "viewer connected");
        Ok(id)
    }

    /// Remove a connection. Returns whether it was present.
    pub fn unregister(&self, id: ConnectionId) -> Result<bool> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| network_error("failed to lock connection set"))?;
        let removed = clients.remove(&id).is_some();
        if removed {
            info!(connection = id, live = clients.len(), "viewer disconnected");
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `message` to every connection present right now that reports
    /// itself ready. The set is copied under the lock and delivery happens
    /// outside it, so connections may come and go mid-broadcast.
    pub fn broadcast(&self, message: &ServerMessage) -> Result<BroadcastReport> {
        let targets: Vec<(ConnectionId, Arc<dyn ClientTransport>)> = {
            let clients = self
                .clients
                .lock()
                .map_err(|_| network_error("failed to lock connection set"))?;
            clients
                .iter()
                .map(|(id, transport)| (*id, Arc::clone(transport)))
                .collect()
        };

        let mut report = BroadcastReport::default();
        for (id, transport) in targets {
            if !transport.is_ready() {
                report.skipped += 1;
                continue;
            }
            match transport.deliver(message) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    debug!(connection = id, "delivery failed: {err}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
