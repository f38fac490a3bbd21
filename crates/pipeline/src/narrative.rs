//! Story writing from a narrative and its analysis.

use taleforge_core::analysis::Analysis;
use taleforge_core::story::{Story, StoryDraft};
use taleforge_providers::text::{CompletionRequest, TextCompletion};

use crate::error::StageError;

pub const STAGE: &str = "story";

pub const STORY_SYSTEM_PROMPT: &str = "\
You are a story writer expanding a short narrative into a bilingual story package. \
You receive the narrative and a JSON analysis of it. Answer with a single JSON object \
with these keys: synopsis, synopsis_translated, scene_bits (array of 3 to 6 short \
scene descriptions), scene_bits_translated (same length and order), lore, \
lore_translated (background lore as prose). Primary values are in English; \
*_translated values are in the secondary language named by the user. Stay faithful \
to the analysis. Do not add keys or prose outside the JSON object.";

fn user_message(
    secondary_language: &str,
    narrative: &str,
    analysis: &Analysis,
) -> Result<String, StageError> {
    let analysis_json = serde_json::to_string(analysis).map_err(|e| StageError::Malformed {
        stage: STAGE,
        reason: format!("analysis could not be serialized: {e}"),
    })?;
    Ok(format!(
        "Secondary language: {secondary_language}\n\nNarrative:\n{narrative}\n\nAnalysis:\n{analysis_json}"
    ))
}

/// Parse raw model output into a validated [`Story`]. Lore of any JSON
/// shape is flattened to text.
pub fn parse_story(raw: &str) -> Result<Story, StageError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StageError::EmptyOutput { stage: STAGE });
    }
    let draft: StoryDraft = serde_json::from_str(raw).map_err(|e| StageError::Malformed {
        stage: STAGE,
        reason: e.to_string(),
    })?;
    let story = Story::from(draft);
    story.validate().map_err(|e| StageError::Malformed {
        stage: STAGE,
        reason: e.to_string(),
    })?;
    Ok(story)
}

pub async fn write_story(
    text: &dyn TextCompletion,
    model: &str,
    secondary_language: &str,
    narrative: &str,
    analysis: &Analysis,
) -> Result<Story, StageError> {
    let raw = text
        .complete(CompletionRequest {
            model: model.to_string(),
            system: STORY_SYSTEM_PROMPT.to_string(),
            user: user_message(secondary_language, narrative, analysis)?,
            json_mode: true,
        })
        .await
        .map_err(|source| StageError::Model {
            stage: STAGE,
            source,
        })?;
    parse_story(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn object_lore_is_flattened() {
        let raw = json!({
            "synopsis": "A whale of stars crosses the desert.",
            "synopsis_translated": "별 고래가 사막을 건넌다.",
            "scene_bits": ["The dunes glow."],
            "scene_bits_translated": ["모래 언덕이 빛난다."],
            "lore": { "origin": "born from a falling star" },
            "lore_translated": "떨어지는 별에서 태어났다.",
        });
        let story = parse_story(&raw.to_string()).unwrap();
        assert!(story.lore.contains("\"origin\""));
        assert!(story.lore.contains("born from a falling star"));
        assert_eq!(story.lore_translated, "떨어지는 별에서 태어났다.");
    }

    #[test]
    fn story_without_scenes_is_malformed() {
        let raw = json!({ "synopsis": "Something happens.", "scene_bits": [] });
        assert_matches!(
            parse_story(&raw.to_string()),
            Err(StageError::Malformed { stage: "story", .. })
        );
    }

    #[test]
    fn empty_output_is_rejected() {
        assert_matches!(parse_story(""), Err(StageError::EmptyOutput { .. }));
    }
}
