//! Catalog of the pre-registered visuals an activation can select.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TEXTURE_NAMES: [&str; 4] = [
    "OSC_BLUE_CYAN",
    "OSC_GREEN_PURPLE",
    "OSC_ORANGE_RED",
    "VORONOI_RED_BLUE",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureCatalog {
    names: Vec<String>,
}

impl TextureCatalog {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Accepts only indices in `[0, len)`.
    pub fn is_valid(&self, index: i64) -> bool {
        usize::try_from(index).map_or(false, |idx| idx < self.names.len())
    }

    pub fn name_for(&self, index: i64) -> String {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .cloned()
            .unwrap_or_else(|| format!("TEXTURE_{index}"))
    }
}

impl Default for TextureCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_TEXTURE_NAMES.iter().map(|s| s.to_string()).collect())
    }
}
