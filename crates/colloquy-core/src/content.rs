use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of a message's content
///
/// Serialized externally tagged, so a text block is `{"text": "..."}` and a
/// tool call is `{"tool_call": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text(String),
    /// Model reasoning trace
    Thinking(String),
    /// Binary or remote media
    Attachment(Attachment),
    /// Tool invocation requested by the assistant
    ToolCall(ToolCall),
    /// Outcome of a tool invocation
    ToolResult(ToolResult),
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a thinking block
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking(text.into())
    }

    /// Create a tool call block
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolCall(ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        })
    }

    /// Create a successful tool result block
    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, content: Value) -> Self {
        Self::ToolResult(ToolResult {
            id: id.into(),
            name: name.into(),
            content,
            is_error: false,
        })
    }

    /// Text payload, if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Invocation identifier, unique within its message
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as a JSON value
    pub input: Value,
}

/// Result of a tool invocation, paired with an earlier [`ToolCall`] by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the invocation this answers
    pub id: String,
    /// Tool name (may be empty when only the id is known)
    #[serde(default)]
    pub name: String,
    /// Tool output
    pub content: Value,
    /// Whether the tool reported a failure
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Media attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Where the bytes live
    pub source: AttachmentSource,
}

/// Inline bytes or a remote reference, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSource {
    /// Raw bytes, base64 in serialized form
    Inline(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Remote URL or provider file URI
    Url(String),
}

/// Coarse media classification used to decide how a destination renders an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFamily {
    Text,
    Image,
    Audio,
    Other,
}

impl MediaFamily {
    /// Classify a MIME type, ignoring parameters such as `charset`
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.split_once('/') {
            Some(("text", _)) => Self::Text,
            Some(("application", "json" | "xml" | "yaml" | "x-yaml" | "toml")) => Self::Text,
            Some(("image", _)) => Self::Image,
            Some(("audio", _)) => Self::Audio,
            _ => Self::Other,
        }
    }
}

impl Attachment {
    /// Attachment carrying its bytes inline
    pub fn inline(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: AttachmentSource::Inline(bytes.into()),
        }
    }

    /// Attachment referencing a remote location
    pub fn url(mime_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: AttachmentSource::Url(url.into()),
        }
    }

    pub fn family(&self) -> MediaFamily {
        MediaFamily::from_mime(&self.mime_type)
    }

    /// Inline bytes encoded as base64, or `None` for remote attachments
    pub fn base64_data(&self) -> Option<String> {
        match &self.source {
            AttachmentSource::Inline(bytes) => Some(STANDARD.encode(bytes)),
            AttachmentSource::Url(_) => None,
        }
    }

    /// Render as a URL: a `data:` URI for inline bytes, the reference otherwise
    pub fn to_url(&self) -> String {
        match &self.source {
            AttachmentSource::Inline(bytes) => {
                format!("data:{};base64,{}", self.mime_type, STANDARD.encode(bytes))
            }
            AttachmentSource::Url(url) => url.clone(),
        }
    }

    /// Parse a URL into an attachment
    ///
    /// Base64 `data:` URIs become inline attachments. Any other URL is kept as
    /// a remote reference with `fallback_mime` as its type. Returns `None` for
    /// a malformed `data:` URI.
    pub fn from_url(url: &str, fallback_mime: &str) -> Option<Self> {
        let Some(rest) = url.strip_prefix("data:") else {
            return Some(Self::url(fallback_mime, url));
        };

        let (header, data) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        let bytes = STANDARD.decode(data).ok()?;
        let mime_type = if mime_type.is_empty() { fallback_mime } else { mime_type };

        Some(Self::inline(mime_type, bytes))
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn media_family_classification() {
        assert_eq!(MediaFamily::from_mime("text/plain; charset=utf-8"), MediaFamily::Text);
        assert_eq!(MediaFamily::from_mime("application/json"), MediaFamily::Text);
        assert_eq!(MediaFamily::from_mime("IMAGE/PNG"), MediaFamily::Image);
        assert_eq!(MediaFamily::from_mime("audio/wav"), MediaFamily::Audio);
        assert_eq!(MediaFamily::from_mime("application/pdf"), MediaFamily::Other);
        assert_eq!(MediaFamily::from_mime(""), MediaFamily::Other);
    }

    #[test]
    fn data_uri_becomes_inline_attachment() {
        let attachment = Attachment::from_url("data:image/png;base64,aGVsbG8=", "image/*").unwrap();
        assert_eq!(attachment, Attachment::inline("image/png", b"hello".to_vec()));
        assert_eq!(attachment.to_url(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn remote_url_keeps_reference() {
        let attachment = Attachment::from_url("https://example.com/cat.jpg", "image/*").unwrap();
        assert_eq!(attachment.source, AttachmentSource::Url("https://example.com/cat.jpg".to_owned()));
        assert_eq!(attachment.base64_data(), None);
    }

    #[test]
    fn malformed_data_uri_is_rejected() {
        assert!(Attachment::from_url("data:image/png,not-base64", "image/*").is_none());
        assert!(Attachment::from_url("data:image/png;base64,%%%", "image/*").is_none());
    }

    #[test]
    fn blocks_serialize_with_snake_case_tags() {
        let block = ContentBlock::tool_call("call_1", "get_weather", json!({"city": "Oslo"}));
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"tool_call": {"id": "call_1", "name": "get_weather", "input": {"city": "Oslo"}}})
        );

        let block = ContentBlock::Attachment(Attachment::inline("image/png", b"hi".to_vec()));
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"attachment": {"mime_type": "image/png", "source": {"inline": "aGk="}}})
        );
    }

    #[test]
    fn tool_result_error_flag_defaults_to_false() {
        let block: ContentBlock =
            serde_json::from_value(json!({"tool_result": {"id": "a", "content": "ok"}})).unwrap();
        let ContentBlock::ToolResult(result) = block else {
            panic!("expected tool result");
        };
        assert!(!result.is_error);
        assert!(result.name.is_empty());
    }
}
