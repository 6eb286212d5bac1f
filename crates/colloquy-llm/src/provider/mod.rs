//! Provider adapter trait and implementations for each wire protocol family

pub mod google;
pub mod openai;

use std::fmt;

use colloquy_core::{Conversation, Message, ToolDefinition};
use serde_json::Value;

use crate::draft::MessageDraft;
use crate::error::LlmError;
use crate::finish::FinishReasonTable;
use crate::fragment::{Fragment, FragmentEvent};

pub use self::google::GoogleAdapter;
pub use self::openai::OpenAiAdapter;

/// Conversation in a provider's wire shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireConversation {
    /// System instruction, for protocols that carry it out of band
    pub system: Option<Value>,
    /// Wire messages in conversation order
    pub messages: Vec<Value>,
}

/// Per-request generation parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,
}

impl GenerateOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Translator between the canonical conversation model and one wire protocol
///
/// Adapters are stateless; one instance serves any number of concurrent
/// conversions.
pub trait ProviderAdapter: fmt::Debug + Send + Sync {
    /// Provider name, as registered
    fn name(&self) -> &str;

    /// Convert a conversation into wire messages
    fn to_wire(&self, conversation: &Conversation) -> Result<WireConversation, LlmError>;

    /// Decode a whole response body into one fragment
    fn decode_response(&self, response: Value) -> Result<Fragment, LlmError>;

    /// Decode one raw stream payload
    fn decode_fragment(&self, data: &str) -> Result<FragmentEvent, LlmError>;

    /// Tool declarations in the protocol's dialect
    fn tools_to_wire(&self, tools: &[ToolDefinition]) -> Result<Value, LlmError>;

    /// Complete request body
    fn request_body(&self, wire: WireConversation, options: &GenerateOptions, stream: bool)
    -> Result<Value, LlmError>;

    /// Request path relative to the transport's base URL
    fn endpoint(&self, model: &str, stream: bool) -> String;

    /// Finish-reason lookup table of the protocol
    fn finish_reasons(&self) -> &'static FinishReasonTable;

    /// Decode a whole response body into a message
    ///
    /// Goes through the same draft as streamed fragments, so both paths
    /// produce equal messages for equal content.
    fn from_wire(&self, response: Value) -> Result<Message, LlmError> {
        let mut draft = MessageDraft::new();
        draft.apply(self.decode_response(response)?);
        draft.finish(self.finish_reasons())
    }
}

/// Encode a typed request body
fn body_to_value<T: serde::Serialize>(body: &T) -> Result<Value, LlmError> {
    serde_json::to_value(body).map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to encode request: {e}")))
}
