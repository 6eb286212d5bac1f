use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::{Attachment, ContentBlock, ToolCall, ToolResult};

/// Meta key holding the provider's opaque signature for a thinking trace
pub const THINKING_SIGNATURE: &str = "thinking_signature";

/// Meta key holding the prompt token count reported with a response
pub const INPUT_TOKENS: &str = "input_tokens";

/// Open map for provider-specific annotations
pub type Meta = BTreeMap<String, Value>;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical outcome of a generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// Natural end of generation
    Stop,
    /// Output was truncated by the token limit
    MaxTokens,
    /// Model is waiting on tool results
    ToolCall,
    /// Output was withheld by a safety or policy filter
    Blocked,
    /// Provider reported an internal failure
    Error,
    /// Anything else, including an absent signal
    #[default]
    Other,
}

/// One turn in a conversation
///
/// `result` and `tokens` are filled in by provider adapters when they ingest
/// a response; messages built by callers leave them at their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Ordered content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Why generation ended (assistant messages only)
    #[serde(default)]
    pub result: ResultType,
    /// Generated token count
    #[serde(default)]
    pub tokens: u32,
    /// Provider-specific annotations
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
}

impl Message {
    /// Empty message with the given role
    pub fn new(role: Role) -> Self {
        Self {
            role,
            content: Vec::new(),
            result: ResultType::default(),
            tokens: 0,
            meta: Meta::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System).with_text(text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User).with_text(text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant).with_text(text)
    }

    /// Tool message carrying a single successful result
    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, content: Value) -> Self {
        Self::new(Role::Tool).with_block(ContentBlock::tool_result(id, name, content))
    }

    /// Append a text block
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_block(ContentBlock::Text(text.into()))
    }

    /// Append any content block
    #[must_use]
    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.content.push(block);
        self
    }

    /// Set a meta annotation
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// All text blocks joined without separator
    pub fn text(&self) -> String {
        self.content.iter().filter_map(ContentBlock::as_text).collect()
    }

    /// All thinking blocks joined without separator
    pub fn thinking(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Thinking(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::Attachment(attachment) => Some(attachment),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    /// First tool call id that appears more than once in this message
    pub fn duplicate_tool_call_id(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.tool_calls()
            .map(|call| call.id.as_str())
            .find(|id| !seen.insert(*id))
    }

    /// Meta annotation as a string
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }
}
