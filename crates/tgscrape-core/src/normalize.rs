//! Message normalization.
//!
//! Turns a [`RawMessage`] into a [`MessageRow`]: rich-text entities are
//! serialized to a JSON array with the annotated text extracted, and media
//! is reduced to a type name plus an optional metadata blob.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Media, MessageRow, RawMessage, TextEntity};

const NO_FILE_METADATA_HINT: &str = "No direct file metadata available.";

#[derive(Serialize)]
struct EntityRecord<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    offset: usize,
    length: usize,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

/// Serialize entities as a JSON array, each carrying the text it covers.
pub fn serialize_entities(text: &str, entities: &[TextEntity]) -> serde_json::Result<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let records: Vec<EntityRecord<'_>> = entities
        .iter()
        .map(|e| EntityRecord {
            kind: &e.kind,
            offset: e.offset,
            length: e.length,
            text: utf16_slice(&units, e.offset, e.length),
            url: e.url.as_deref(),
            user_id: e.user_id,
            language: e.language.as_deref(),
        })
        .collect();
    serde_json::to_string(&records)
}

fn utf16_slice(units: &[u16], offset: usize, length: usize) -> String {
    let end = offset.saturating_add(length).min(units.len());
    let start = offset.min(end);
    String::from_utf16_lossy(&units[start..end])
}

/// Media type name and, when requested, its metadata as JSON.
pub fn media_payload(
    media: Option<&Media>,
    include_metadata: bool,
) -> serde_json::Result<(Option<String>, Option<String>)> {
    let Some(media) = media else {
        return Ok((None, None));
    };
    let media_type = Some(media.type_name().to_string());
    if !include_metadata {
        return Ok((media_type, None));
    }

    let metadata = match media.file() {
        Some(file) if !file.is_empty() => serde_json::to_string(file)?,
        _ => serde_json::to_string(&serde_json::json!({ "hint": NO_FILE_METADATA_HINT }))?,
    };
    Ok((media_type, Some(metadata)))
}

/// Build the stored row for one message.
pub fn message_row(
    target_id: i64,
    message: &RawMessage,
    sender_username: Option<String>,
    include_media_metadata: bool,
    scraped_at: DateTime<Utc>,
) -> serde_json::Result<MessageRow> {
    let entities_json = serialize_entities(
        message.text.as_deref().unwrap_or_default(),
        &message.entities,
    )?;
    let (media_type, media_metadata_json) =
        media_payload(message.media.as_ref(), include_media_metadata)?;

    Ok(MessageRow {
        target_id,
        message_id: message.id,
        date_utc: message.date,
        sender_id: message.sender_id,
        sender_username,
        text: message.text.clone(),
        entities_json,
        views: message.views,
        forwards: message.forwards,
        reply_to_msg_id: message.reply_to_msg_id,
        media_type,
        media_metadata_json,
        scraped_at,
    })
}
