use crate::types::ThinkingError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TAG_NAME: &str = "thinking";

/// Settings for the thinking middleware that can live in a config file.
///
/// Callbacks (reasoning observer, reasoning part factory) cannot be expressed
/// in a file and are attached on the middleware itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Name used to build the `<tag>` / `</tag>` marker pair
    pub tag_name: String,
    /// Remove reasoning spans (and their markers) from the visible text
    pub strip_reasoning_from_text: bool,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            tag_name: DEFAULT_TAG_NAME.to_string(),
            strip_reasoning_from_text: true,
        }
    }
}

impl ThinkingConfig {
    /// Load a JSON config file. Missing keys fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.markers()?;
        Ok(config)
    }

    pub fn markers(&self) -> Result<MarkerPair, ThinkingError> {
        MarkerPair::from_tag_name(&self.tag_name)
    }
}

/// Start and end marker around a reasoning span, e.g. `<thinking>` and
/// `</thinking>`. Matched by plain substring search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPair {
    start: String,
    end: String,
}

impl MarkerPair {
    pub fn from_tag_name(tag_name: &str) -> Result<Self, ThinkingError> {
        let valid = !tag_name.is_empty()
            && !tag_name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '/'));
        if !valid {
            return Err(ThinkingError::InvalidTagName(tag_name.to_string()));
        }

        Ok(Self {
            start: format!("<{tag_name}>"),
            end: format!("</{tag_name}>"),
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }
}

impl Default for MarkerPair {
    fn default() -> Self {
        Self {
            start: format!("<{DEFAULT_TAG_NAME}>"),
            end: format!("</{DEFAULT_TAG_NAME}>"),
        }
    }
}
