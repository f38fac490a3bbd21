//! Bilingual story derived from a narrative and its analysis.
//!
//! Models frequently return `lore` as a nested object or list even when
//! asked for prose. [`StoryDraft`] accepts any JSON shape for the lore
//! fields and [`Story`] always holds plain strings.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub synopsis: String,
    pub synopsis_translated: String,
    pub scene_bits: Vec<String>,
    pub scene_bits_translated: Vec<String>,
    pub lore: String,
    pub lore_translated: String,
}

/// Story exactly as the model produced it, before lore normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryDraft {
    pub synopsis: String,
    #[serde(default)]
    pub synopsis_translated: String,
    #[serde(default)]
    pub scene_bits: Vec<String>,
    #[serde(default)]
    pub scene_bits_translated: Vec<String>,
    #[serde(default)]
    pub lore: serde_json::Value,
    #[serde(default)]
    pub lore_translated: serde_json::Value,
}

impl From<StoryDraft> for Story {
    fn from(draft: StoryDraft) -> Self {
        Self {
            lore: lore_to_text(&draft.lore),
            lore_translated: lore_to_text(&draft.lore_translated),
            synopsis: draft.synopsis,
            synopsis_translated: draft.synopsis_translated,
            scene_bits: draft.scene_bits,
            scene_bits_translated: draft.scene_bits_translated,
        }
    }
}

/// Render a lore value as plain text.
///
/// Strings pass through untouched, `null` becomes empty, and any other
/// shape is pretty-printed JSON so nothing the model wrote is lost.
pub fn lore_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

impl Story {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.synopsis.trim().is_empty() {
            return Err(CoreError::Validation(
                "Story synopsis must not be empty".to_string(),
            ));
        }
        if self.scene_bits.iter().all(|s| s.trim().is_empty()) {
            return Err(CoreError::Validation(
                "Story must contain at least one scene".to_string(),
            ));
        }
        if !self.scene_bits_translated.is_empty()
            && self.scene_bits_translated.len() != self.scene_bits.len()
        {
            return Err(CoreError::Validation(format!(
                "Story has {} scenes but {} translated scenes",
                self.scene_bits.len(),
                self.scene_bits_translated.len()
            )));
        }
        Ok(())
    }
}
