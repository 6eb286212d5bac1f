//! Conversion between the canonical conversation model and OpenAI-style wire format

use colloquy_config::MixedContentPolicy;
use colloquy_core::{
    Attachment, AttachmentSource, ContentBlock, Conversation, MediaFamily, Message, Role, ToolCall, ToolResult,
};
use serde_json::Value;

use crate::error::LlmError;
use crate::fragment::{ArgumentsChunk, Fragment, FragmentEvent, ToolCallChunk, Usage};
use crate::protocol::openai::{
    OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiErrorDetail, OpenAiFunctionCall, OpenAiImageUrl,
    OpenAiMessage, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamToolCall, OpenAiToolCall, OpenAiUsage,
};
use crate::sanitize::{IdRemapper, IdSanitizer};

/// End-of-stream sentinel sent as the final SSE payload
pub const DONE_SENTINEL: &str = "[DONE]";

/// Destination-specific legality rules applied during outbound conversion
#[derive(Debug, Clone, Copy)]
pub struct OutboundRules<'a> {
    /// Provider name used in errors and logs
    pub provider: &'a str,
    /// Tool-call identifier syntax
    pub ids: &'a dyn IdSanitizer,
    /// Whether an assistant turn may carry text next to tool calls
    pub text_with_tool_calls: bool,
    /// What to do when it may not
    pub mixed_content: MixedContentPolicy,
}

// -- Outbound: canonical conversation -> wire messages --

/// Convert a conversation into wire messages, in order
///
/// Tool-call identifiers are sanitized with a remapper that lives only for
/// this call.
pub fn conversation_to_openai(conversation: &Conversation, rules: &OutboundRules<'_>) -> Result<Vec<Value>, LlmError> {
    let mut remapper = IdRemapper::new(rules.ids);
    let mut messages = Vec::with_capacity(conversation.len());

    for message in conversation {
        if let Some(id) = message.duplicate_tool_call_id() {
            return Err(LlmError::Conflict(format!("tool call id `{id}` appears twice in one message")));
        }

        match message.role {
            Role::Assistant => messages.push(assistant_to_openai(message, rules, &mut remapper)?),
            Role::System | Role::User | Role::Tool => {
                turn_to_openai(message, rules, &mut remapper, &mut messages)?;
            }
        }
    }

    messages.into_iter().map(to_value).collect()
}

fn to_value(message: OpenAiMessage) -> Result<Value, LlmError> {
    serde_json::to_value(message).map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to encode message: {e}")))
}

/// System, user and tool turns
///
/// Tool results come first, one wire message each, so they directly follow
/// the assistant turn that invoked them. Remaining text and attachments
/// follow in a single message.
fn turn_to_openai(
    message: &Message,
    rules: &OutboundRules<'_>,
    remapper: &mut IdRemapper<'_>,
    out: &mut Vec<OpenAiMessage>,
) -> Result<(), LlmError> {
    let mut parts = Vec::new();
    let mut results = 0usize;

    for block in &message.content {
        match block {
            ContentBlock::ToolResult(result) => {
                out.push(tool_result_to_openai(result, remapper)?);
                results += 1;
            }
            ContentBlock::Text(text) => parts.push(OpenAiContentPart::Text { text: text.clone() }),
            ContentBlock::Attachment(attachment) => parts.push(attachment_to_openai(attachment, rules.provider)?),
            ContentBlock::Thinking(_) => {
                tracing::debug!(provider = rules.provider, role = %message.role, "dropping thinking block");
            }
            ContentBlock::ToolCall(call) => {
                return Err(LlmError::BadParameter(format!(
                    "tool call `{}` in a {} message; only assistant messages may invoke tools",
                    call.name, message.role
                )));
            }
        }
    }

    if message.role == Role::Tool {
        if results == 0 {
            return Err(LlmError::BadParameter("tool message carries no tool results".to_owned()));
        }
        if parts.is_empty() {
            return Ok(());
        }
    } else if results > 0 && parts.is_empty() {
        return Ok(());
    }

    let role = if message.role == Role::System { "system" } else { "user" };
    out.push(OpenAiMessage {
        role: role.to_owned(),
        content: Some(parts_to_content(parts)),
        tool_calls: None,
        tool_call_id: None,
    });

    Ok(())
}

/// A lone text part collapses into a plain string
fn parts_to_content(parts: Vec<OpenAiContentPart>) -> OpenAiContent {
    match <[OpenAiContentPart; 1]>::try_from(parts) {
        Ok([OpenAiContentPart::Text { text }]) => OpenAiContent::Text(text),
        Ok(single) => OpenAiContent::Parts(single.into()),
        Err(parts) if parts.is_empty() => OpenAiContent::Text(String::new()),
        Err(parts) => OpenAiContent::Parts(parts),
    }
}

fn tool_result_to_openai(result: &ToolResult, remapper: &mut IdRemapper<'_>) -> Result<OpenAiMessage, LlmError> {
    let mut content = match &result.content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if result.is_error {
        content.insert_str(0, "Error: ");
    }

    Ok(OpenAiMessage {
        role: "tool".to_owned(),
        content: Some(OpenAiContent::Text(content)),
        tool_calls: None,
        tool_call_id: Some(remapper.result_id(&result.id)?),
    })
}

fn assistant_to_openai(
    message: &Message,
    rules: &OutboundRules<'_>,
    remapper: &mut IdRemapper<'_>,
) -> Result<OpenAiMessage, LlmError> {
    let mut text = String::new();
    let mut calls: Vec<&ToolCall> = Vec::new();

    for block in &message.content {
        match block {
            ContentBlock::Text(t) => text.push_str(t),
            ContentBlock::ToolCall(call) => calls.push(call),
            ContentBlock::Thinking(_) => {
                tracing::debug!(provider = rules.provider, "dropping thinking block");
            }
            // assistant content is a single string on this protocol
            ContentBlock::Attachment(attachment) => match attachment_to_openai(attachment, rules.provider)? {
                OpenAiContentPart::Text { text: inline } => text.push_str(&inline),
                OpenAiContentPart::ImageUrl { .. } => {
                    return Err(LlmError::UnsupportedAttachment {
                        provider: rules.provider.to_owned(),
                        mime_type: attachment.mime_type.clone(),
                    });
                }
            },
            ContentBlock::ToolResult(result) => {
                return Err(LlmError::BadParameter(format!(
                    "tool result `{}` in an assistant message",
                    result.id
                )));
            }
        }
    }

    if !calls.is_empty() && !text.is_empty() && !rules.text_with_tool_calls {
        match rules.mixed_content {
            MixedContentPolicy::DropText => {
                tracing::warn!(
                    provider = rules.provider,
                    dropped_chars = text.chars().count(),
                    "dropping assistant text that accompanies tool calls"
                );
                text.clear();
            }
            MixedContentPolicy::Reject => {
                return Err(LlmError::BadParameter(format!(
                    "provider {} does not accept text and tool calls in the same assistant message",
                    rules.provider
                )));
            }
        }
    }

    let tool_calls = calls
        .into_iter()
        .map(|call| {
            Ok(OpenAiToolCall {
                id: remapper.call_id(&call.id)?,
                tool_type: "function".to_owned(),
                function: OpenAiFunctionCall {
                    name: call.name.clone(),
                    arguments: encode_arguments(&call.input)?,
                },
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(OpenAiContent::Text(text))
    };

    Ok(OpenAiMessage {
        role: "assistant".to_owned(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    })
}

/// Arguments travel as a JSON-encoded string
fn encode_arguments(input: &Value) -> Result<String, LlmError> {
    match input {
        Value::Null => Ok("{}".to_owned()),
        other => serde_json::to_string(other)
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to encode tool arguments: {e}"))),
    }
}

fn attachment_to_openai(attachment: &Attachment, provider: &str) -> Result<OpenAiContentPart, LlmError> {
    let unsupported = || LlmError::UnsupportedAttachment {
        provider: provider.to_owned(),
        mime_type: attachment.mime_type.clone(),
    };

    match (attachment.family(), &attachment.source) {
        (MediaFamily::Image, _) => Ok(OpenAiContentPart::ImageUrl {
            image_url: OpenAiImageUrl {
                url: attachment.to_url(),
                detail: None,
            },
        }),
        (MediaFamily::Text, AttachmentSource::Inline(bytes)) => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                LlmError::BadParameter(format!(
                    "text attachment of type {} is not valid UTF-8: {e}",
                    attachment.mime_type
                ))
            })?;
            Ok(OpenAiContentPart::Text { text: text.to_owned() })
        }
        (MediaFamily::Text, AttachmentSource::Url(_)) | (MediaFamily::Audio | MediaFamily::Other, _) => {
            Err(unsupported())
        }
    }
}

// -- Inbound: wire response -> fragments --

/// Decoded form of a string-or-parts `content` value
#[derive(Debug, Default, PartialEq)]
pub struct DecodedContent {
    pub text: String,
    pub thinking: String,
    pub attachments: Vec<Attachment>,
}

/// Decode `content` by inspecting its JSON shape
///
/// Accepts `null`, a plain string, or an array of typed parts. Unknown part
/// types are skipped.
pub fn content_from_value(content: &Value) -> DecodedContent {
    let mut decoded = DecodedContent::default();

    match content {
        Value::Null => {}
        Value::String(text) => decoded.text.push_str(text),
        Value::Array(parts) => {
            for part in parts {
                decode_part(part, &mut decoded);
            }
        }
        other => {
            tracing::debug!(kind = json_kind(other), "skipping content of unexpected shape");
        }
    }

    decoded
}

fn decode_part(part: &Value, decoded: &mut DecodedContent) {
    // bare strings appear inside some compatible APIs' part arrays
    if let Value::String(text) = part {
        decoded.text.push_str(text);
        return;
    }

    match part.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                decoded.text.push_str(text);
            }
        }
        Some("thinking") => {
            let inner = part.get("thinking").unwrap_or(&Value::Null);
            let nested = content_from_value(inner);
            decoded.thinking.push_str(&nested.text);
        }
        Some("image_url") => {
            let url = part
                .get("image_url")
                .and_then(|image| image.get("url").or(Some(image)))
                .and_then(Value::as_str);
            match url.and_then(|url| Attachment::from_url(url, "image/*")) {
                Some(attachment) => decoded.attachments.push(attachment),
                None => tracing::debug!("skipping malformed image_url part"),
            }
        }
        other => {
            tracing::debug!(part_type = other.unwrap_or("<none>"), "skipping unknown content part");
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "assistant" => Some(Role::Assistant),
        "user" => Some(Role::User),
        "system" | "developer" => Some(Role::System),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

const fn usage(usage: OpenAiUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

fn embedded_error(value: &Value) -> Option<LlmError> {
    super::embedded_error(value, |detail: OpenAiErrorDetail| {
        tracing::debug!(error_type = ?detail.error_type, code = ?detail.code, "provider reported an error");
        detail.message
    })
}

/// Decode a whole chat completion response into a single fragment
pub fn response_to_fragment(value: Value) -> Result<Fragment, LlmError> {
    if let Some(error) = embedded_error(&value) {
        return Err(error);
    }

    let response: OpenAiResponse =
        serde_json::from_value(value).map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Upstream("response contained no choices".to_owned()))?;

    let mut fragment = choice_message_to_fragment(choice.message);
    fragment.finish_reason = choice.finish_reason;
    fragment.usage = response.usage.map(usage);

    Ok(fragment)
}

fn choice_message_to_fragment(message: OpenAiChoiceMessage) -> Fragment {
    let DecodedContent {
        text,
        mut thinking,
        attachments,
    } = content_from_value(&message.content);

    if let Some(reasoning) = message.reasoning_content {
        thinking.insert_str(0, &reasoning);
    }

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCallChunk {
            index: u32::try_from(index).ok(),
            id: Some(call.id).filter(|id| !id.is_empty()),
            name: Some(call.function.name),
            arguments: ArgumentsChunk::Partial(call.function.arguments),
        })
        .collect();

    Fragment {
        role: message.role.as_deref().and_then(parse_role),
        text: (!text.is_empty()).then_some(text),
        thinking: (!thinking.is_empty()).then_some(thinking),
        thinking_signature: None,
        attachments,
        tool_calls,
        finish_reason: None,
        usage: None,
    }
}

/// Decode one SSE `data` payload of a streamed response
///
/// Unparseable payloads are skipped; an embedded error object is an upstream
/// failure.
pub fn chunk_to_event(data: &str) -> Result<FragmentEvent, LlmError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(FragmentEvent::Skip);
    }
    if data == DONE_SENTINEL {
        return Ok(FragmentEvent::Done);
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
            return Ok(FragmentEvent::Skip);
        }
    };

    if let Some(error) = embedded_error(&value) {
        return Err(error);
    }

    let chunk: OpenAiStreamChunk = match serde_json::from_value(value) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, "skipping SSE chunk of unexpected shape");
            return Ok(FragmentEvent::Skip);
        }
    };

    let fragment = chunk_to_fragment(chunk);
    if fragment == Fragment::default() {
        return Ok(FragmentEvent::Skip);
    }

    Ok(FragmentEvent::Fragment(fragment))
}

fn chunk_to_fragment(chunk: OpenAiStreamChunk) -> Fragment {
    let mut fragment = Fragment {
        usage: chunk.usage.map(usage),
        ..Fragment::default()
    };

    // only the first choice is reconstructed
    let Some(choice) = chunk.choices.into_iter().find(|choice| choice.index == 0) else {
        return fragment;
    };

    let DecodedContent {
        text,
        mut thinking,
        attachments,
    } = content_from_value(&choice.delta.content);

    if let Some(reasoning) = choice.delta.reasoning_content {
        thinking.insert_str(0, &reasoning);
    }

    fragment.role = choice.delta.role.as_deref().and_then(parse_role);
    fragment.text = (!text.is_empty()).then_some(text);
    fragment.thinking = (!thinking.is_empty()).then_some(thinking);
    fragment.attachments = attachments;
    fragment.tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(stream_tool_call_to_chunk)
        .collect();
    fragment.finish_reason = choice.finish_reason;

    fragment
}

fn stream_tool_call_to_chunk(call: OpenAiStreamToolCall) -> ToolCallChunk {
    let (name, arguments) = call
        .function
        .map(|function| (function.name, function.arguments))
        .unwrap_or_default();

    ToolCallChunk {
        index: call.index,
        id: call.id,
        name: name.filter(|name| !name.is_empty()),
        arguments: ArgumentsChunk::Partial(arguments.unwrap_or_default()),
    }
}
