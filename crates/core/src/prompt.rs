//! Image prompt compilation and compaction limits.
//!
//! [`compile_prompt`] expands an [`Analysis`] into a long descriptive prompt
//! per visual kind. Image backends cap prompt length, so prompts are later
//! compacted by a model; [`enforce_compact_limits`] is the programmatic
//! backstop that is applied to every compacted prompt regardless of what
//! the model returned.

use crate::analysis::Analysis;
use crate::package::VisualKind;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Appended to every image prompt. Without it, backends render stray glyphs.
pub const NO_TEXT_DIRECTIVE: &str =
    "No text, letters, words, captions, watermarks, signatures or typography anywhere in the image.";

/// Maximum prompt length in characters accepted by the image backends.
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Cap for character, location and object lists in a prompt.
const MAX_ENTITIES: usize = 2;

/// Cap for tone, genre and emotion lists in a prompt.
const MAX_LABELS: usize = 3;

const STYLE_TAIL: &str = "Highly detailed digital painting, volumetric cinematic lighting, \
rich harmonious color palette, painterly textures, soft atmospheric depth, \
balanced composition with a clear focal point, professional concept-art quality, \
sharp focus, 4k resolution.";

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Join at most `cap` non-empty items with commas.
fn join_capped(items: &[String], cap: usize) -> Option<String> {
    let picked: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(cap)
        .collect();
    if picked.is_empty() {
        None
    } else {
        Some(picked.join(", "))
    }
}

/// Shared mood clauses: tones, genres and emotions.
fn mood_clauses(analysis: &Analysis, parts: &mut Vec<String>) {
    if let Some(tones) = join_capped(&analysis.tones, MAX_LABELS) {
        parts.push(format!("The mood is {tones}."));
    }
    if let Some(genres) = join_capped(&analysis.genres, MAX_LABELS) {
        parts.push(format!("Rendered in the visual language of {genres}."));
    }
    if let Some(emotions) = join_capped(&analysis.emotions, MAX_LABELS) {
        parts.push(format!("The image should evoke {emotions}."));
    }
}

fn character_clause(analysis: &Analysis) -> Option<String> {
    let sketches: Vec<String> = analysis
        .characters
        .iter()
        .take(MAX_ENTITIES)
        .map(|c| {
            if c.description.trim().is_empty() {
                c.name.trim().to_string()
            } else {
                format!("{} ({})", c.name.trim(), c.description.trim())
            }
        })
        .collect();
    if sketches.is_empty() {
        None
    } else {
        Some(sketches.join(" and "))
    }
}

/// Deterministically expand an analysis into a long prompt for `kind`.
///
/// The result always ends with [`NO_TEXT_DIRECTIVE`].
pub fn compile_prompt(kind: VisualKind, analysis: &Analysis) -> String {
    let mut parts: Vec<String> = Vec::new();
    let world = &analysis.world;

    match kind {
        VisualKind::KeyVisual => {
            parts.push(format!(
                "A sweeping cinematic key visual for the story \"{}\".",
                analysis.title.trim()
            ));
            parts.push(analysis.summary.trim().to_string());
            if let Some(chars) = character_clause(analysis) {
                parts.push(format!("Featuring {chars}."));
            }
            if !world.setting.trim().is_empty() {
                parts.push(format!("Set in {}.", world.setting.trim()));
            }
            if let Some(locations) = join_capped(&analysis.locations, MAX_ENTITIES) {
                parts.push(format!("Key locations: {locations}."));
            }
        }
        VisualKind::Character => {
            match analysis.characters.first() {
                Some(c) => parts.push(format!(
                    "Full-body character concept art of {}, {}.",
                    c.name.trim(),
                    c.description.trim()
                )),
                None => parts.push(format!(
                    "Full-body character concept art of the protagonist of \"{}\".",
                    analysis.title.trim()
                )),
            }
            if let Some(second) = analysis.characters.get(1) {
                parts.push(format!(
                    "{} may appear in the background.",
                    second.name.trim()
                ));
            }
            parts.push("Expressive pose, clear silhouette, detailed costume and features.".into());
            if !world.setting.trim().is_empty() {
                parts.push(format!("Backdrop hints at {}.", world.setting.trim()));
            }
        }
        VisualKind::World => {
            let setting = if world.setting.trim().is_empty() {
                format!("the world of \"{}\"", analysis.title.trim())
            } else {
                world.setting.trim().to_string()
            };
            parts.push(format!("Wide establishing environment concept art of {setting}."));
            if !world.atmosphere.trim().is_empty() {
                parts.push(format!("Atmosphere: {}.", world.atmosphere.trim()));
            }
            if let Some(locations) = join_capped(&analysis.locations, MAX_ENTITIES) {
                parts.push(format!("Showing {locations}."));
            }
            parts.push("No characters in the foreground; the landscape is the subject.".into());
        }
        VisualKind::Object => {
            let objects = join_capped(&analysis.objects, MAX_ENTITIES)
                .unwrap_or_else(|| format!("a symbolic artifact from \"{}\"", analysis.title.trim()));
            parts.push(format!("Detailed prop concept art of {objects}."));
            parts.push("Studio presentation on a neutral backdrop with subtle rim light.".into());
        }
    }

    mood_clauses(analysis, &mut parts);
    parts.push(STYLE_TAIL.to_string());
    parts.push(NO_TEXT_DIRECTIVE.to_string());

    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Compaction limits
// ---------------------------------------------------------------------------

/// Whether `prompt` already satisfies both compaction constraints.
pub fn is_compact(prompt: &str) -> bool {
    prompt.chars().count() <= MAX_PROMPT_CHARS && prompt.contains(NO_TEXT_DIRECTIVE)
}

/// Truncate to at most `max_chars` characters, preferring a word boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(ws) if ws > cut / 2 => &head[..ws],
        _ => head,
    }
}

/// Force a prompt within [`MAX_PROMPT_CHARS`] with the directive at the end.
///
/// Every occurrence of the directive is removed from the body, the body is
/// truncated to leave room for it, and the directive is appended exactly
/// once. Applying this twice yields the same string.
pub fn enforce_compact_limits(prompt: &str) -> String {
    let without_directive = prompt.replace(NO_TEXT_DIRECTIVE, " ");
    let body = without_directive.split_whitespace().collect::<Vec<_>>().join(" ");

    let budget = MAX_PROMPT_CHARS - NO_TEXT_DIRECTIVE.chars().count() - 1;
    let body = truncate_chars(&body, budget)
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'));

    if body.is_empty() {
        NO_TEXT_DIRECTIVE.to_string()
    } else {
        format!("{body} {NO_TEXT_DIRECTIVE}")
    }
}
