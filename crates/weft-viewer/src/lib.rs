//! Headless viewer client for the activation protocol.

pub mod client;
pub mod session;
pub mod submit;
pub mod textures;

use weft_types::WeftError;

pub use client::{run_viewer, websocket_url, Viewer};
pub use session::{SessionAction, ViewerSession};
pub use submit::{SnapshotSubmission, SnapshotSubmitter};
pub use textures::{Modulation, Oscillator, TextureRegistry};

pub fn viewer_error(message: impl Into<String>) -> WeftError {
    WeftError::Viewer(message.into())
}
