//! Accumulator shared by the whole-response and streaming inbound paths
//!
//! Both paths feed [`Fragment`]s into a [`MessageDraft`] and finish it through
//! the same code, so a streamed response and its non-streamed equivalent
//! produce equal messages.

use colloquy_core::{
    Attachment, ContentBlock, INPUT_TOKENS, Message, ResultType, Role, THINKING_SIGNATURE, ToolCall,
};
use serde_json::Value;

use crate::error::LlmError;
use crate::finish::FinishReasonTable;
use crate::fragment::{ArgumentsChunk, Fragment, ToolCallChunk, Usage};

#[derive(Debug, Clone, PartialEq)]
enum Arguments {
    Raw(String),
    Parsed(Value),
}

#[derive(Debug, Clone, PartialEq)]
struct DraftToolCall {
    index: Option<u32>,
    id: Option<String>,
    name: String,
    arguments: Arguments,
}

/// Message under construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageDraft {
    role: Option<Role>,
    thinking: String,
    text: String,
    attachments: Vec<Attachment>,
    tool_calls: Vec<DraftToolCall>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    thinking_signature: Option<String>,
}

impl MessageDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.len()
    }

    /// Merge one fragment into the draft
    pub fn apply(&mut self, fragment: Fragment) {
        if self.role.is_none() {
            self.role = fragment.role;
        }
        if let Some(text) = fragment.text {
            self.text.push_str(&text);
        }
        if let Some(thinking) = fragment.thinking {
            self.thinking.push_str(&thinking);
        }
        if let Some(signature) = fragment.thinking_signature.filter(|s| !s.is_empty()) {
            self.thinking_signature = Some(signature);
        }
        self.attachments.extend(fragment.attachments);
        for chunk in fragment.tool_calls {
            self.merge_tool_call(chunk);
        }
        if let Some(reason) = fragment.finish_reason.filter(|r| !r.trim().is_empty()) {
            self.finish_reason = Some(reason);
        }
        if fragment.usage.is_some() {
            self.usage = fragment.usage;
        }
    }

    fn merge_tool_call(&mut self, chunk: ToolCallChunk) {
        let ToolCallChunk {
            index,
            id,
            name,
            arguments,
        } = chunk;
        let id = id.filter(|id| !id.is_empty());

        let args = match arguments {
            ArgumentsChunk::Complete(value) => {
                self.tool_calls.push(DraftToolCall {
                    index,
                    id,
                    name: name.unwrap_or_default(),
                    arguments: Arguments::Parsed(value),
                });
                return;
            }
            ArgumentsChunk::Partial(args) => args,
        };

        let position = match (&id, index) {
            (Some(id), _) => self
                .tool_calls
                .iter()
                .position(|call| call.id.as_deref() == Some(id.as_str()))
                .or_else(|| {
                    index.and_then(|index| {
                        self.tool_calls
                            .iter()
                            .rposition(|call| call.index == Some(index) && call.id.is_none())
                    })
                }),
            (None, Some(index)) => self.tool_calls.iter().rposition(|call| call.index == Some(index)),
            (None, None) => self.tool_calls.len().checked_sub(1),
        };

        let Some(call) = position.and_then(|p| self.tool_calls.get_mut(p)) else {
            self.tool_calls.push(DraftToolCall {
                index,
                id,
                name: name.unwrap_or_default(),
                arguments: Arguments::Raw(args),
            });
            return;
        };

        if call.id.is_none() {
            call.id = id;
        }
        if call.name.is_empty()
            && let Some(name) = name
        {
            call.name = name;
        }
        match &mut call.arguments {
            Arguments::Raw(raw) => raw.push_str(&args),
            Arguments::Parsed(_) => {
                tracing::debug!(tool = %call.name, "ignoring argument fragment for a complete tool call");
            }
        }
    }

    /// Finish a complete response
    ///
    /// Fails when tool call arguments are not valid JSON.
    pub fn finish(mut self, finish_reasons: &FinishReasonTable) -> Result<Message, LlmError> {
        for call in &mut self.tool_calls {
            if let Arguments::Raw(raw) = &call.arguments {
                call.arguments = Arguments::Parsed(parse_arguments(&call.name, raw)?);
            }
        }
        Ok(self.assemble(finish_reasons))
    }

    /// Finish whatever was accumulated before a failure or cancellation
    ///
    /// Arguments that do not parse (typically cut off mid-stream) are kept as a
    /// JSON string instead of failing.
    pub fn finish_partial(mut self, finish_reasons: &FinishReasonTable) -> Message {
        for call in &mut self.tool_calls {
            if let Arguments::Raw(raw) = &call.arguments {
                let value = parse_arguments(&call.name, raw).unwrap_or_else(|_| Value::String(raw.clone()));
                call.arguments = Arguments::Parsed(value);
            }
        }
        self.assemble(finish_reasons)
    }

    fn assemble(self, finish_reasons: &FinishReasonTable) -> Message {
        let mut message = Message::new(self.role.unwrap_or(Role::Assistant));

        if !self.thinking.is_empty() {
            message.content.push(ContentBlock::Thinking(self.thinking));
        }
        if !self.text.is_empty() {
            message.content.push(ContentBlock::Text(self.text));
        }
        message
            .content
            .extend(self.attachments.into_iter().map(ContentBlock::Attachment));

        let has_tool_calls = !self.tool_calls.is_empty();
        for (position, call) in self.tool_calls.into_iter().enumerate() {
            let input = match call.arguments {
                Arguments::Parsed(value) => value,
                Arguments::Raw(raw) => Value::String(raw),
            };
            message.content.push(ContentBlock::ToolCall(ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{position}")),
                name: call.name,
                input,
            }));
        }

        message.result = self
            .finish_reason
            .as_deref()
            .map_or(ResultType::Other, |raw| finish_reasons.normalize(raw));
        // some providers report a plain stop alongside pending invocations
        if has_tool_calls {
            message.result = ResultType::ToolCall;
        }

        if let Some(signature) = self.thinking_signature {
            message.meta.insert(THINKING_SIGNATURE.to_owned(), Value::String(signature));
        }
        if let Some(usage) = self.usage {
            message.tokens = usage.output_tokens;
            message.meta.insert(INPUT_TOKENS.to_owned(), Value::from(usage.input_tokens));
        }

        message
    }
}

/// Decode a JSON-encoded argument string; empty input means no arguments
pub fn parse_arguments(name: &str, raw: &str) -> Result<Value, LlmError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|source| LlmError::InvalidToolArguments {
        name: name.to_owned(),
        source,
    })
}
