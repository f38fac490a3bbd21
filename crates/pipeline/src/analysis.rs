//! Structured analysis of a narrative by a text model.

use taleforge_core::analysis::Analysis;
use taleforge_providers::text::{CompletionRequest, TextCompletion};

use crate::error::StageError;

pub const STAGE: &str = "analysis";

/// Fixed instructions for the analysis call. The target language and the
/// narrative go in the user message.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a literary analyst preparing a short narrative for illustration. \
Read the narrative and answer with a single JSON object with these keys: \
title, title_translated, summary, summary_translated, \
characters (array of {name, name_translated, description, description_translated}), \
world ({setting, setting_translated, atmosphere, atmosphere_translated}), \
objects, objects_translated, locations, locations_translated, \
tones, tones_translated, genres, genres_translated, emotions, emotions_translated. \
Primary values are in English. Every *_translated value is the same content in the \
secondary language named by the user. Label lists are short lowercase phrases and each \
translated list has exactly as many entries as its English list, in the same order. \
Name at least one genre. Do not add keys, comments or prose outside the JSON object.";

fn user_message(secondary_language: &str, narrative: &str) -> String {
    format!("Secondary language: {secondary_language}\n\nNarrative:\n{narrative}")
}

/// Parse and validate raw model output. Never coerces a bad shape into a
/// default analysis.
pub fn parse_analysis(raw: &str) -> Result<Analysis, StageError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StageError::EmptyOutput { stage: STAGE });
    }
    let analysis: Analysis = serde_json::from_str(raw).map_err(|e| StageError::Malformed {
        stage: STAGE,
        reason: e.to_string(),
    })?;
    analysis.validate().map_err(|e| StageError::Malformed {
        stage: STAGE,
        reason: e.to_string(),
    })?;
    Ok(analysis)
}

/// Run the analysis call in JSON mode and parse the result.
pub async fn analyze(
    text: &dyn TextCompletion,
    model: &str,
    secondary_language: &str,
    narrative: &str,
) -> Result<Analysis, StageError> {
    let raw = text
        .complete(CompletionRequest {
            model: model.to_string(),
            system: ANALYSIS_SYSTEM_PROMPT.to_string(),
            user: user_message(secondary_language, narrative),
            json_mode: true,
        })
        .await
        .map_err(|source| StageError::Model {
            stage: STAGE,
            source,
        })?;
    parse_analysis(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use taleforge_providers::fake::FakeText;

    fn valid() -> serde_json::Value {
        json!({
            "title": "The Star Whale",
            "title_translated": "별고래",
            "summary": "A whale of starlight drifts over a desert.",
            "summary_translated": "별빛 고래가 사막 위를 떠다닌다.",
            "genres": ["fantasy"],
            "genres_translated": ["판타지"],
        })
    }

    #[test]
    fn minimal_valid_analysis_parses() {
        let analysis = parse_analysis(&valid().to_string()).unwrap();
        assert_eq!(analysis.title, "The Star Whale");
        assert!(analysis.characters.is_empty());
    }

    #[test]
    fn blank_output_is_empty() {
        assert_matches!(
            parse_analysis("  \n"),
            Err(StageError::EmptyOutput { stage: "analysis" })
        );
    }

    #[test]
    fn prose_is_malformed() {
        assert_matches!(
            parse_analysis("Here is your analysis: the story is about a whale."),
            Err(StageError::Malformed { .. })
        );
    }

    #[test]
    fn mismatched_label_lists_are_malformed() {
        let mut v = valid();
        v["tones"] = json!(["dreamy", "serene"]);
        v["tones_translated"] = json!(["몽환적인"]);
        let err = parse_analysis(&v.to_string()).unwrap_err();
        assert!(err.to_string().contains("tones"), "{err}");
    }

    #[test]
    fn missing_genres_are_malformed() {
        let mut v = valid();
        v["genres"] = json!([]);
        v["genres_translated"] = json!([]);
        assert_matches!(parse_analysis(&v.to_string()), Err(StageError::Malformed { .. }));
    }

    #[tokio::test]
    async fn request_uses_json_mode_and_language() {
        let fake = FakeText::always(valid().to_string());
        analyze(&fake, "gpt-test", "Korean", "A whale made of stars.")
            .await
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].json_mode);
        assert_eq!(calls[0].model, "gpt-test");
        assert_eq!(calls[0].system, ANALYSIS_SYSTEM_PROMPT);
        assert!(calls[0].user.contains("Korean"));
        assert!(calls[0].user.contains("A whale made of stars."));
    }

    #[tokio::test]
    async fn model_failure_is_reported_with_stage() {
        let err = analyze(&FakeText::failing(), "m", "Korean", "text")
            .await
            .unwrap_err();
        assert_matches!(err, StageError::Model { stage: "analysis", .. });
    }
}
