//! OpenAI-style chat completion adapter, with `OpenAI` and Mistral presets

use colloquy_config::MixedContentPolicy;
use colloquy_core::{Conversation, ToolDefinition};
use serde_json::Value;

use super::{GenerateOptions, ProviderAdapter, WireConversation, body_to_value};
use crate::convert::openai::{OutboundRules, chunk_to_event, conversation_to_openai, response_to_fragment};
use crate::error::LlmError;
use crate::finish::{FinishReasonTable, OPENAI_FINISH_REASONS};
use crate::fragment::{Fragment, FragmentEvent};
use crate::protocol::openai::{OpenAiRequest, OpenAiStreamOptions};
use crate::sanitize::{AlphanumericIds, IdSanitizer, NonEmptyIds};
use crate::tools::openai_tools;

/// Adapter for protocol family A
#[derive(Debug)]
pub struct OpenAiAdapter {
    name: String,
    ids: Box<dyn IdSanitizer>,
    text_with_tool_calls: bool,
    mixed_content: MixedContentPolicy,
    stream_usage: bool,
}

impl OpenAiAdapter {
    /// `OpenAI` preset: any non-empty id, text may accompany tool calls
    pub fn openai(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ids: Box::new(NonEmptyIds),
            text_with_tool_calls: true,
            mixed_content: MixedContentPolicy::default(),
            stream_usage: true,
        }
    }

    /// Mistral preset: nine-character alphanumeric ids, text and tool calls
    /// never share an assistant turn
    pub fn mistral(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ids: Box::new(AlphanumericIds::MISTRAL),
            text_with_tool_calls: false,
            mixed_content: MixedContentPolicy::default(),
            // usage arrives on the final chunk without asking
            stream_usage: false,
        }
    }

    #[must_use]
    pub const fn with_mixed_content(mut self, policy: MixedContentPolicy) -> Self {
        self.mixed_content = policy;
        self
    }

    fn rules(&self) -> OutboundRules<'_> {
        OutboundRules {
            provider: &self.name,
            ids: self.ids.as_ref(),
            text_with_tool_calls: self.text_with_tool_calls,
            mixed_content: self.mixed_content,
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_wire(&self, conversation: &Conversation) -> Result<WireConversation, LlmError> {
        Ok(WireConversation {
            system: None,
            messages: conversation_to_openai(conversation, &self.rules())?,
        })
    }

    fn decode_response(&self, response: Value) -> Result<Fragment, LlmError> {
        response_to_fragment(response)
    }

    fn decode_fragment(&self, data: &str) -> Result<FragmentEvent, LlmError> {
        chunk_to_event(data)
    }

    fn tools_to_wire(&self, tools: &[ToolDefinition]) -> Result<Value, LlmError> {
        openai_tools(tools)
    }

    fn request_body(
        &self,
        wire: WireConversation,
        options: &GenerateOptions,
        stream: bool,
    ) -> Result<Value, LlmError> {
        let mut messages = wire.messages;
        if let Some(system) = wire.system {
            messages.insert(0, serde_json::json!({"role": "system", "content": system}));
        }

        let tools = if options.tools.is_empty() {
            None
        } else {
            Some(self.tools_to_wire(&options.tools)?)
        };

        let request = OpenAiRequest {
            model: options.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: stream.then_some(true),
            stream_options: (stream && self.stream_usage).then_some(OpenAiStreamOptions { include_usage: true }),
            tools,
        };

        body_to_value(&request)
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> String {
        "chat/completions".to_owned()
    }

    fn finish_reasons(&self) -> &'static FinishReasonTable {
        &OPENAI_FINISH_REASONS
    }
}
