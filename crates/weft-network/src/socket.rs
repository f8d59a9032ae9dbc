//! Per-viewer WebSocket pump.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use weft_types::{
    protocol::{ClientMessage, ServerMessage},
    Result,
};

use crate::hub::{ChannelTransport, ClientTransport, ConnectionHub, ConnectionId};

/// A registered viewer slot whose outbound queue has not been attached to a
/// socket yet.
pub struct ViewerChannel {
    pub id: ConnectionId,
    transport: ChannelTransport,
    outbound: mpsc::UnboundedReceiver<ServerMessage>,
}

impl ViewerChannel {
    /// Register a new queue-backed connection in the hub.
    pub fn attach(hub: &ConnectionHub) -> Result<Self> {
        let (transport, outbound) = ChannelTransport::new();
        let id = hub.register(Arc::new(transport.clone()))?;
        Ok(Self {
            id,
            transport,
            outbound,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketSummary {
    pub id: ConnectionId,
    pub pings: u64,
    pub ignored: u64,
}

/// Drive one viewer socket until it closes, then drop it from the hub.
///
/// Keepalive pings are answered on the same queue as broadcasts so replies
/// keep their order. A missing ping is never treated as a failure.
pub async fn run_socket(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    channel: ViewerChannel,
) -> SocketSummary {
    let ViewerChannel {
        id,
        transport,
        mut outbound,
    } = channel;
    let (mut sink, mut stream) = socket.split();
    let mut summary = SocketSummary {
        id,
        ..Default::default()
    };

    loop {
        tokio::select! {
            Some(message) = outbound.recv() => {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(connection = id, "failed to encode {message:?}: {err}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                summary.pings += 1;
                                if transport.deliver(&ServerMessage::Pong).is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                summary.ignored += 1;
                                debug!(connection = id, "ignoring client message: {err}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(connection = id, "socket error: {err}");
                        break;
                    }
                }
            }
        }
    }

    outbound.close();
    if let Err(err) = hub.unregister(id) {
        warn!(connection = id, "failed to remove connection: {err}");
    }
    let _ = sink.close().await;
    summary
}
