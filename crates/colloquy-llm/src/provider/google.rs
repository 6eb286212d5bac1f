//! Google Generative Language adapter

use colloquy_core::{Conversation, ToolDefinition};
use serde_json::Value;

use super::{GenerateOptions, ProviderAdapter, WireConversation, body_to_value};
use crate::convert::google::{chunk_to_event, conversation_to_google, response_to_fragment};
use crate::error::LlmError;
use crate::finish::{FinishReasonTable, GOOGLE_FINISH_REASONS};
use crate::fragment::{Fragment, FragmentEvent};
use crate::protocol::google::{GoogleGenerationConfig, GoogleRequest};
use crate::tools::google_tools;

/// Adapter for protocol family B
#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    name: String,
}

impl GoogleAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ProviderAdapter for GoogleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_wire(&self, conversation: &Conversation) -> Result<WireConversation, LlmError> {
        let wire = conversation_to_google(conversation, &self.name)?;

        Ok(WireConversation {
            system: wire.system_instruction.as_ref().map(body_to_value).transpose()?,
            messages: wire.contents.iter().map(body_to_value).collect::<Result<_, _>>()?,
        })
    }

    fn decode_response(&self, response: Value) -> Result<Fragment, LlmError> {
        response_to_fragment(response)
    }

    fn decode_fragment(&self, data: &str) -> Result<FragmentEvent, LlmError> {
        chunk_to_event(data)
    }

    fn tools_to_wire(&self, tools: &[ToolDefinition]) -> Result<Value, LlmError> {
        google_tools(tools)
    }

    fn request_body(
        &self,
        wire: WireConversation,
        options: &GenerateOptions,
        _stream: bool,
    ) -> Result<Value, LlmError> {
        let generation_config = (options.temperature.is_some() || options.max_tokens.is_some()).then(|| {
            GoogleGenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            }
        });

        let tools = if options.tools.is_empty() {
            None
        } else {
            Some(self.tools_to_wire(&options.tools)?)
        };

        body_to_value(&GoogleRequest {
            contents: wire.messages,
            system_instruction: wire.system,
            generation_config,
            tools,
        })
    }

    /// Model and streaming mode are part of the path
    fn endpoint(&self, model: &str, stream: bool) -> String {
        if stream {
            format!("models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("models/{model}:generateContent")
        }
    }

    fn finish_reasons(&self) -> &'static FinishReasonTable {
        &GOOGLE_FINISH_REASONS
    }
}
