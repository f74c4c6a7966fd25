//! Represents the attachment being uploaded and the record the server returns.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Category an attachment is filed under on the server.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentType {
    AiModel,
    MapRow,
    PersonaGallery,
}

impl AttachmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentType::AiModel => "AI_MODEL",
            AttachmentType::MapRow => "MAP_ROW",
            AttachmentType::PersonaGallery => "PERSONA_GALLERY",
        }
    }
}

impl fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown attachment type `{0}` (expected ai-model, map-row or persona-gallery)")]
pub struct ParseAttachmentTypeError(String);

impl FromStr for AttachmentType {
    type Err = ParseAttachmentTypeError;

    /// Accepts the wire form (`MAP_ROW`) as well as kebab case (`map-row`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "AI_MODEL" => Ok(AttachmentType::AiModel),
            "MAP_ROW" => Ok(AttachmentType::MapRow),
            "PERSONA_GALLERY" => Ok(AttachmentType::PersonaGallery),
            _ => Err(ParseAttachmentTypeError(s.to_string())),
        }
    }
}

/// Everything the caller knows about the attachment before the upload starts.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// MIME type sent when the session is created.
    pub content_type: String,

    /// File type hint (usually the extension) sent when the session is created.
    pub file_type: String,

    pub attachment_type: AttachmentType,

    /// Optional sub-category stored with the finalized attachment.
    pub category: Option<String>,

    /// Display name stored with the finalized attachment.
    pub file_name: Option<String>,

    /// Entity the attachment will be linked to.
    pub related_id: String,

    /// Opaque extra payload forwarded to the finalize call.
    pub detailed_input: Option<Value>,

    /// Opaque map-embedding payload forwarded to the finalize call.
    pub embed_map_input: Option<Value>,
}

impl UploadRequest {
    pub fn new(
        related_id: impl Into<String>,
        attachment_type: AttachmentType,
        content_type: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            file_type: file_type.into(),
            attachment_type,
            category: None,
            file_name: None,
            related_id: related_id.into(),
            detailed_input: None,
            embed_map_input: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_detailed_input(mut self, input: Value) -> Self {
        self.detailed_input = Some(input);
        self
    }

    pub fn with_embed_map_input(mut self, input: Value) -> Self {
        self.embed_map_input = Some(input);
        self
    }
}

/// Attachment record persisted by the server after the parts are assembled.
///
/// Fields the client does not model are kept in `extra` so nothing the server
/// returns is lost when the record is handed to the caller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Attachment {
    /// Persisted identifier. GraphQL `ID`s arrive as either strings or numbers.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Storage key of the assembled object.
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<AttachmentType>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
