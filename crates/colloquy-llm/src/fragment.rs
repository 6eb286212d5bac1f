//! Canonical partial-response units
//!
//! Every adapter decodes its wire responses, whole or streamed, into these
//! types before they are assembled into a [`colloquy_core::Message`].

use colloquy_core::{Attachment, Role};
use serde_json::Value;

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Generated tokens
    pub output_tokens: u32,
}

/// One decoded piece of a response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// Author role, usually present on the first fragment only
    pub role: Option<Role>,
    /// Incremental text
    pub text: Option<String>,
    /// Incremental reasoning trace
    pub thinking: Option<String>,
    /// Opaque signature accompanying a reasoning trace
    pub thinking_signature: Option<String>,
    /// Complete attachments produced by the model
    pub attachments: Vec<Attachment>,
    /// Tool call pieces
    pub tool_calls: Vec<ToolCallChunk>,
    /// Raw provider stop signal
    pub finish_reason: Option<String>,
    /// Usage block, typically on the terminal fragment
    pub usage: Option<Usage>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Piece of a tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallChunk {
    /// Position of the call in the provider's `tool_calls` array
    pub index: Option<u32>,
    /// Invocation identifier
    pub id: Option<String>,
    /// Tool name
    pub name: Option<String>,
    pub arguments: ArgumentsChunk,
}

/// Tool arguments as they arrive on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentsChunk {
    /// Fragment of a JSON-encoded argument string, appended to earlier fragments
    Partial(String),
    /// Whole decoded arguments; the chunk always starts a new call
    Complete(Value),
}

/// Outcome of decoding one raw stream payload
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentEvent {
    Fragment(Fragment),
    /// Explicit end-of-stream marker
    Done,
    /// Payload carried nothing (keep-alive, empty data)
    Skip,
}
