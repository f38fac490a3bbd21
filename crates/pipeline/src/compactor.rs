//! Image prompt compaction.
//!
//! Compiled prompts often exceed what image backends accept. A text model
//! condenses them; [`enforce_compact_limits`] then guarantees the length cap
//! and the trailing no-text directive whatever the model returned.

use taleforge_core::prompt::{enforce_compact_limits, is_compact, MAX_PROMPT_CHARS};
use taleforge_providers::text::{CompletionRequest, TextCompletion};

pub const COMPACTION_SYSTEM_PROMPT: &str = "\
You condense image-generation prompts. Rewrite the prompt you are given so it keeps \
the subject, setting, mood, style and composition but is much shorter. Answer with \
the rewritten prompt only, as plain text, without quotes or commentary.";

/// Compact `prompt` so it fits [`MAX_PROMPT_CHARS`] and ends with the
/// no-text directive. Never fails: if the model call fails the limits are
/// enforced on the original prompt.
pub async fn compact(text: &dyn TextCompletion, model: &str, prompt: &str) -> String {
    if is_compact(prompt) {
        return prompt.to_string();
    }

    let request = CompletionRequest {
        model: model.to_string(),
        system: COMPACTION_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Condense this prompt to well under {MAX_PROMPT_CHARS} characters:\n\n{prompt}"
        ),
        json_mode: false,
    };

    match text.complete(request).await {
        Ok(condensed) if !condensed.trim().is_empty() => enforce_compact_limits(&condensed),
        Ok(_) => {
            tracing::warn!("Compaction returned no output, truncating original prompt");
            enforce_compact_limits(prompt)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Compaction failed, truncating original prompt");
            enforce_compact_limits(prompt)
        }
    }
}
