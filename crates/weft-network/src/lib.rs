//! Networking facade: live viewer connections and real-time event publication.

pub mod hub;
pub mod socket;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use weft_types::{events::SystemEvent, Result, WeftError};

pub use hub::{BroadcastReport, ChannelTransport, ClientTransport, ConnectionHub, ConnectionId};
pub use socket::{run_socket, SocketSummary, ViewerChannel};

#[async_trait]
pub trait RealtimeServer: Send + Sync {
    async fn run(&self) -> Result<()>;
    async fn publish(&self, event: SystemEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, SystemEvent>;
}

/// In-process event bus backed by a broadcast channel.
#[derive(Clone)]
pub struct LocalServer {
    tx: broadcast::Sender<SystemEvent>,
}

impl LocalServer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl RealtimeServer for LocalServer {
    async fn run(&self) -> Result<()> {
        info!("Local event bus ready");
        Ok(())
    }

    async fn publish(&self, event: SystemEvent) -> Result<()> {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

pub fn network_error(message: impl Into<String>) -> WeftError {
    WeftError::Network(message.into())
}
