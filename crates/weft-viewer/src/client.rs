use async_stream::stream;
use chrono::Utc;
use futures::{SinkExt, Stream, StreamExt};
use tokio::time::{interval, sleep, sleep_until, Duration, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use weft_codec::SnapshotCompressor;
use weft_types::{
    config::{CodecConfig, ViewerConfig},
    protocol::{ClientMessage, ServerMessage},
    Result,
};

use crate::{
    session::{SessionAction, ViewerSession},
    submit::{SnapshotSubmission, SnapshotSubmitter},
    textures::TextureRegistry,
    viewer_error,
};

/// Map the coordinator's HTTP base URL to its WebSocket endpoint.
pub fn websocket_url(server_url: &str) -> Result<String> {
    let base = server_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{rest}/ws"))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{rest}/ws"))
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        Ok(base.to_string())
    } else {
        Err(viewer_error(format!("unsupported server url: {server_url}")))
    }
}

/// Headless viewer: renders the activated texture and reports snapshots.
pub struct Viewer {
    config: ViewerConfig,
    session: ViewerSession,
    registry: TextureRegistry,
    compressor: SnapshotCompressor,
    submitter: SnapshotSubmitter,
    started: Instant,
}

impl Viewer {
    pub fn new(config: ViewerConfig, codec: CodecConfig) -> Self {
        let registry = TextureRegistry::default();
        let session = ViewerSession::new(
            registry.catalog().clone(),
            Duration::from_millis(config.idle_timeout_ms),
        );
        let submitter = SnapshotSubmitter::new(&config.server_url);
        Self {
            config,
            session,
            registry,
            compressor: SnapshotCompressor::new(codec),
            submitter,
            started: Instant::now(),
        }
    }

    pub fn session(&self) -> &ViewerSession {
        &self.session
    }

    /// Connect, serve until the transport drops, wait, repeat. Only returns
    /// when the server URL itself is unusable.
    pub async fn run(mut self) -> Result<()> {
        let url = websocket_url(&self.config.server_url)?;
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
        loop {
            match self.run_connection(&url).await {
                Ok(()) => info!("Coordinator closed the connection"),
                Err(err) => warn!("Viewer connection failed: {err}"),
            }
            info!("Reconnecting in {:?}", delay);
            sleep(delay).await;
        }
    }

    async fn run_connection(&mut self, url: &str) -> Result<()> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|err| viewer_error(format!("connect to {url} failed: {err}")))?;
        info!("Connected to {url}");
        let (mut sink, source) = socket.split();
        let incoming = server_messages(source);
        futures::pin_mut!(incoming);

        let mut keepalive = interval(Duration::from_millis(self.config.keepalive_interval_ms));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await;
        let mut idle_check = interval(idle_check_period(self.config.idle_timeout_ms));
        idle_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let settle = Duration::from_millis(self.config.settle_delay_ms);
        let mut capture_at: Option<Instant> = None;

        loop {
            let deadline = capture_at.unwrap_or_else(Instant::now);
            tokio::select! {
                _ = keepalive.tick() => {
                    let ping = serde_json::to_string(&ClientMessage::Ping)
                        .map_err(|err| viewer_error(format!("encode ping: {err}")))?;
                    sink.send(Message::Text(ping))
                        .await
                        .map_err(|err| viewer_error(format!("send ping: {err}")))?;
                }
                _ = idle_check.tick() => {
                    if self.session.poll_idle(Instant::now()) {
                        info!("No activation for {}ms, back to idle", self.config.idle_timeout_ms);
                        capture_at = None;
                    }
                }
                _ = sleep_until(deadline), if capture_at.is_some() => {
                    capture_at = None;
                    self.capture_and_submit();
                }
                message = incoming.next() => match message {
                    Some(Ok(message)) => {
                        if self.handle(&message) {
                            capture_at = Some(Instant::now() + settle);
                        }
                    }
                    Some(Err(err)) => {
                        let _ = sink.close().await;
                        return Err(err);
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    /// Returns `true` when a snapshot should follow.
    fn handle(&mut self, message: &ServerMessage) -> bool {
        match self.session.apply(message, Instant::now()) {
            SessionAction::Render { index, name } => {
                info!(index, texture = %name, "Activation received");
                true
            }
            SessionAction::ErrorCue { index } => {
                warn!(index, "Invalid activation index, keeping current texture");
                false
            }
            SessionAction::KeepaliveAck => {
                debug!("pong");
                false
            }
        }
    }

    fn capture_and_submit(&self) {
        let index = self.session.current_texture();
        let t = self.started.elapsed().as_secs_f32();
        let frame = self
            .registry
            .render(index, self.config.frame_width, self.config.frame_height, t);
        let snapshot = self.compressor.compress(&frame);
        let Some(submission) = SnapshotSubmission::new(
            index as i64,
            self.session.current_name(),
            snapshot,
            Utc::now(),
        ) else {
            warn!(index, "Capture produced no snapshot, skipping upload");
            return;
        };
        self.submitter.dispatch(submission);
    }
}

/// Run a viewer until the process is stopped.
pub async fn run_viewer(config: ViewerConfig, codec: CodecConfig) -> Result<()> {
    Viewer::new(config, codec).run().await
}

fn idle_check_period(idle_timeout_ms: u64) -> Duration {
    Duration::from_millis((idle_timeout_ms / 4).clamp(50, 1_000))
}

/// Decode protocol messages off the socket. Frames that do not parse are
/// skipped; the stream ends on close.
fn server_messages<S, E>(mut source: S) -> impl Stream<Item = Result<ServerMessage>>
where
    S: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    stream! {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => {
                        yield Ok(message);
                    }
                    Err(err) => {
                        debug!("ignoring frame {text:?}: {err}");
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    yield Err(viewer_error(format!("transport error: {err}")));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use weft_types::config::WeftConfig;

    #[test]
    fn websocket_url_follows_scheme() {
        assert_eq!(websocket_url("http://host:3000").unwrap(), "ws://host:3000/ws");
        assert_eq!(websocket_url("https://host/").unwrap(), "wss://host/ws");
        assert_eq!(websocket_url("ws://host/ws").unwrap(), "ws://host/ws");
        assert!(websocket_url("ftp://host").is_err());
    }

    #[test]
    fn idle_check_period_is_bounded() {
        assert_eq!(idle_check_period(60_000), Duration::from_secs(1));
        assert_eq!(idle_check_period(100), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn decoder_skips_noise_and_stops_at_close() {
        let frames: Vec<std::result::Result<Message, String>> = vec![
            Ok(Message::Text(r#"{"type":"activate","index":2}"#.into())),
            Ok(Message::Text("not json".into())),
            Ok(Message::Binary(vec![1, 2])),
            Ok(Message::Text(r#"{"type":"pong"}"#.into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"type":"activate","index":1}"#.into())),
        ];
        let decoded: Vec<_> = server_messages(stream::iter(frames)).collect().await;
        let decoded: Vec<_> = decoded.into_iter().map(|m| m.unwrap()).collect();
        assert_eq!(decoded, vec![ServerMessage::activate(2), ServerMessage::Pong]);
    }

    #[tokio::test]
    async fn decoder_surfaces_transport_errors() {
        let frames: Vec<std::result::Result<Message, String>> =
            vec![Err("reset".into()), Ok(Message::Text(r#"{"type":"pong"}"#.into()))];
        let decoded: Vec<_> = server_messages(stream::iter(frames)).collect().await;
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].is_err());
    }

    #[test]
    fn activation_schedules_capture_only_for_valid_index() {
        let config = WeftConfig::defaults();
        let mut viewer = Viewer::new(config.viewer, config.codec);
        assert!(viewer.handle(&ServerMessage::activate(3)));
        assert!(!viewer.handle(&ServerMessage::activate(7)));
        assert!(!viewer.handle(&ServerMessage::Pong));
        assert_eq!(viewer.session().current_texture(), 3);
    }
}
