//! Shared domain types for the Weft installation.

pub mod analytics;
pub mod config;
pub mod events;
pub mod frame;
pub mod protocol;
pub mod record;
pub mod textures;

mod errors;

pub use errors::{Result, WeftError};
