use serde::{Deserialize, Serialize};

/// How a list assignment treats occurrences past the end of the new list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetMode {
    /// Occurrences at index >= k are left in place.
    #[default]
    Preserve,
    /// Occurrences at index >= k are deleted.
    Truncate,
}

/// Per-map behaviour switches, inherited by every map derived from this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub set_mode: SetMode,
    /// Nested buffers come back as maps over the nested storage. When off,
    /// they are converted to `Value::Map`.
    pub rich_view: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            set_mode: SetMode::Preserve,
            rich_view: true,
        }
    }
}

impl MapConfig {
    pub fn with_set_mode(mut self, set_mode: SetMode) -> Self {
        self.set_mode = set_mode;
        self
    }

    pub fn with_rich_view(mut self, rich_view: bool) -> Self {
        self.rich_view = rich_view;
        self
    }
}
