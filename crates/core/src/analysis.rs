//! Structured bilingual analysis of a narrative.
//!
//! Every textual fact carries a primary-language value (English) and a
//! `*_translated` value in the configured secondary language. Label lists
//! (tones, genres, ...) are open vocabularies stored as parallel vectors:
//! index `i` of the primary list and index `i` of the translated list must
//! name the same concept. [`Analysis::validate`] checks the lengths; the
//! semantic pairing is the model's responsibility and is covered by tests.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A character the narrative mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSketch {
    pub name: String,
    #[serde(default)]
    pub name_translated: String,
    pub description: String,
    #[serde(default)]
    pub description_translated: String,
}

/// The world the narrative takes place in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSketch {
    pub setting: String,
    pub setting_translated: String,
    pub atmosphere: String,
    pub atmosphere_translated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub title: String,
    pub title_translated: String,
    pub summary: String,
    pub summary_translated: String,
    #[serde(default)]
    pub characters: Vec<CharacterSketch>,
    #[serde(default)]
    pub world: WorldSketch,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub objects_translated: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub locations_translated: Vec<String>,
    #[serde(default)]
    pub tones: Vec<String>,
    #[serde(default)]
    pub tones_translated: Vec<String>,
    pub genres: Vec<String>,
    pub genres_translated: Vec<String>,
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub emotions_translated: Vec<String>,
}

impl Analysis {
    /// The parallel label lists, as `(name, primary, translated)`.
    pub fn label_pairs(&self) -> [(&'static str, &[String], &[String]); 5] {
        [
            ("objects", &self.objects, &self.objects_translated),
            ("locations", &self.locations, &self.locations_translated),
            ("tones", &self.tones, &self.tones_translated),
            ("genres", &self.genres, &self.genres_translated),
            ("emotions", &self.emotions, &self.emotions_translated),
        ]
    }

    /// Reject analyses that are empty where they must not be, or whose
    /// paired label lists have drifted apart.
    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("title", &self.title),
            ("title_translated", &self.title_translated),
            ("summary", &self.summary),
            ("summary_translated", &self.summary_translated),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Analysis field '{field}' must not be empty"
                )));
            }
        }

        for (name, primary, translated) in self.label_pairs() {
            if primary.len() != translated.len() {
                return Err(CoreError::Validation(format!(
                    "Analysis label list '{name}' has {} entries but its translation has {}",
                    primary.len(),
                    translated.len()
                )));
            }
            if primary.iter().chain(translated).any(|l| l.trim().is_empty()) {
                return Err(CoreError::Validation(format!(
                    "Analysis label list '{name}' contains an empty label"
                )));
            }
        }

        if self.genres.is_empty() {
            return Err(CoreError::Validation(
                "Analysis must name at least one genre".to_string(),
            ));
        }

        if self.characters.iter().any(|c| c.name.trim().is_empty()) {
            return Err(CoreError::Validation(
                "Analysis contains a character without a name".to_string(),
            ));
        }

        Ok(())
    }
}
