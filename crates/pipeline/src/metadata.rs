//! Metadata documents attached to a registered asset.
//!
//! Two documents are published per registration: the domain document
//! describing the creative work (bilingual) and the display document read
//! by wallets and marketplaces (English only). Each is hashed over its
//! serialized form; the ledger stores both hashes next to the URIs.

use serde_json::{json, Value};
use taleforge_core::hashing::{sha256_hex, to_bytes32};
use taleforge_core::package::{Package, VisualKind};

/// Domain metadata: title, description, creators, media and the full story.
pub fn domain_metadata(package: &Package) -> Value {
    let analysis = package.analysis.as_ref();
    let story = package.story.as_ref();
    let key_visual = package.visual(VisualKind::KeyVisual);

    let creators: Vec<Value> = package
        .creator_address
        .iter()
        .map(|address| {
            json!({
                "name": package.record.user_id,
                "address": address,
                "contributionPercent": 100,
            })
        })
        .collect();

    json!({
        "title": analysis.map(|a| a.title.as_str()).unwrap_or_default(),
        "titleTranslated": analysis.map(|a| a.title_translated.as_str()).unwrap_or_default(),
        "description": analysis.map(|a| a.summary.as_str()).unwrap_or_default(),
        "descriptionTranslated": analysis.map(|a| a.summary_translated.as_str()).unwrap_or_default(),
        "createdAt": package.created_at.timestamp().to_string(),
        "creators": creators,
        "image": key_visual.map(|v| v.best_url()).unwrap_or_default(),
        "mediaUrl": key_visual.map(|v| v.best_url()).unwrap_or_default(),
        "mediaType": "image/png",
        "mediaHash": to_bytes32(&package.content_hash),
        "genres": analysis.map(|a| a.genres.clone()).unwrap_or_default(),
        "genresTranslated": analysis.map(|a| a.genres_translated.clone()).unwrap_or_default(),
        "tones": analysis.map(|a| a.tones.clone()).unwrap_or_default(),
        "story": story.map(|s| json!({
            "synopsis": s.synopsis,
            "synopsisTranslated": s.synopsis_translated,
            "sceneBits": s.scene_bits,
            "sceneBitsTranslated": s.scene_bits_translated,
            "lore": s.lore,
            "loreTranslated": s.lore_translated,
        })),
        "visuals": package.visuals.iter().map(|v| json!({
            "kind": v.kind.name(),
            "title": v.title,
            "titleTranslated": v.title_translated,
            "url": v.best_url(),
        })).collect::<Vec<_>>(),
    })
}

/// Display metadata for wallets. Always English.
pub fn display_metadata(package: &Package) -> Value {
    let analysis = package.analysis.as_ref();

    let mut attributes = vec![json!({ "trait_type": "Model", "value": package.model_choice.name() })];
    if let Some(a) = analysis {
        attributes.extend(
            a.genres
                .iter()
                .map(|g| json!({ "trait_type": "Genre", "value": g })),
        );
        attributes.extend(
            a.tones
                .iter()
                .map(|t| json!({ "trait_type": "Tone", "value": t })),
        );
    }

    json!({
        "name": analysis.map(|a| a.title.as_str()).unwrap_or_default(),
        "description": analysis.map(|a| a.summary.as_str()).unwrap_or_default(),
        "image": package
            .visual(VisualKind::KeyVisual)
            .map(|v| v.best_url())
            .unwrap_or_default(),
        "attributes": attributes,
    })
}

/// `0x`-prefixed SHA-256 of a document's compact serialization.
pub fn document_hash(document: &Value) -> String {
    to_bytes32(&sha256_hex(document.to_string().as_bytes()))
}
