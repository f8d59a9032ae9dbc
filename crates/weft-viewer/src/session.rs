use tokio::time::{Duration, Instant};
use weft_types::{protocol::ServerMessage, textures::TextureCatalog};

/// What the client loop should do after a server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Switch to texture `index` and schedule a snapshot once it settles.
    Render { index: usize, name: String },
    /// Index outside the catalog. Nothing changed.
    ErrorCue { index: i64 },
    KeepaliveAck,
}

/// Presentation state of one viewer.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    catalog: TextureCatalog,
    idle_timeout: Duration,
    current: usize,
    active: bool,
    last_activity: Option<Instant>,
}

impl ViewerSession {
    pub fn new(catalog: TextureCatalog, idle_timeout: Duration) -> Self {
        Self {
            catalog,
            idle_timeout,
            current: 0,
            active: false,
            last_activity: None,
        }
    }

    pub fn apply(&mut self, message: &ServerMessage, now: Instant) -> SessionAction {
        match *message {
            ServerMessage::Pong => SessionAction::KeepaliveAck,
            ServerMessage::Activate { index } => {
                let Some(slot) = usize::try_from(index)
                    .ok()
                    .filter(|_| self.catalog.is_valid(index))
                else {
                    return SessionAction::ErrorCue { index };
                };
                self.current = slot;
                self.active = true;
                self.last_activity = Some(now);
                SessionAction::Render {
                    index: slot,
                    name: self.catalog.name_for(index),
                }
            }
        }
    }

    /// Returns `true` once when the idle window elapses after an activation.
    pub fn poll_idle(&mut self, now: Instant) -> bool {
        let expired = self
            .last_activity
            .is_some_and(|last| now.saturating_duration_since(last) >= self.idle_timeout);
        if self.active && expired {
            self.active = false;
            return true;
        }
        false
    }

    pub fn current_texture(&self) -> usize {
        self.current
    }

    pub fn current_name(&self) -> String {
        self.catalog.name_for(self.current as i64)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn catalog(&self) -> &TextureCatalog {
        &self.catalog
    }
}
