//! Conversion between the canonical conversation model and Google Generative Language wire format

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use colloquy_core::{
    Attachment, AttachmentSource, ContentBlock, Conversation, MediaFamily, Message, ResultType, Role,
    THINKING_SIGNATURE, ToolResult,
};
use serde_json::{Value, json};

use crate::error::LlmError;
use crate::finish::GOOGLE_FINISH_REASONS;
use crate::fragment::{ArgumentsChunk, Fragment, FragmentEvent, ToolCallChunk, Usage};
use crate::protocol::google::{
    GoogleContent, GoogleErrorDetail, GoogleFileData, GoogleFunctionCall, GoogleFunctionResponse, GoogleInlineData,
    GooglePart, GoogleResponse, GoogleUsageMetadata,
};

/// Finish reason reported when the prompt itself was refused
const PROMPT_BLOCKED: &str = "PROHIBITED_CONTENT";

/// Wire form of a conversation: system turns travel out of band
#[derive(Debug, Default, PartialEq)]
pub struct GoogleConversation {
    pub system_instruction: Option<GoogleContent>,
    pub contents: Vec<GoogleContent>,
}

// -- Outbound: canonical conversation -> wire contents --

/// Convert a conversation into `systemInstruction` plus `contents`
///
/// Tool-call identifiers are not transmitted; each tool result is matched to
/// its function by name, taken from the result itself or from the earlier
/// tool call with the same identifier. A result whose identifier no earlier
/// call declared is rejected.
pub fn conversation_to_google(conversation: &Conversation, provider: &str) -> Result<GoogleConversation, LlmError> {
    let mut wire = GoogleConversation::default();
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for message in conversation {
        if let Some(id) = message.duplicate_tool_call_id() {
            return Err(LlmError::Conflict(format!("tool call id `{id}` appears twice in one message")));
        }

        match message.role {
            Role::System => {
                let parts = plain_parts(message, provider)?;
                wire.system_instruction
                    .get_or_insert_with(GoogleContent::default)
                    .parts
                    .extend(parts);
            }
            Role::Assistant => {
                for call in message.tool_calls() {
                    call_names.insert(call.id.as_str(), call.name.as_str());
                }
                wire.contents.push(assistant_to_google(message, provider)?);
            }
            Role::User | Role::Tool => user_to_google(message, provider, &call_names, &mut wire.contents)?,
        }
    }

    Ok(wire)
}

/// Text and attachments of a non-assistant turn
fn plain_parts(message: &Message, provider: &str) -> Result<Vec<GooglePart>, LlmError> {
    let mut parts = Vec::new();
    for block in &message.content {
        match block {
            ContentBlock::Text(text) => parts.push(GooglePart::text(text.clone())),
            ContentBlock::Attachment(attachment) => parts.push(attachment_to_google(attachment, provider)?),
            ContentBlock::Thinking(_) => {
                tracing::debug!(provider, role = %message.role, "dropping thinking block");
            }
            ContentBlock::ToolCall(call) => {
                return Err(LlmError::BadParameter(format!(
                    "tool call `{}` in a {} message; only assistant messages may invoke tools",
                    call.name, message.role
                )));
            }
            ContentBlock::ToolResult(_) => {}
        }
    }
    Ok(parts)
}

fn user_to_google(
    message: &Message,
    provider: &str,
    call_names: &HashMap<&str, &str>,
    out: &mut Vec<GoogleContent>,
) -> Result<(), LlmError> {
    let mut results = 0usize;
    for result in message.tool_results() {
        out.push(GoogleContent {
            role: Some("user".to_owned()),
            parts: vec![GooglePart {
                function_response: Some(tool_result_to_google(result, call_names)?),
                ..GooglePart::default()
            }],
        });
        results += 1;
    }

    if message.role == Role::Tool && results == 0 {
        return Err(LlmError::BadParameter("tool message carries no tool results".to_owned()));
    }

    let parts = plain_parts(message, provider)?;
    if parts.is_empty() && results > 0 {
        return Ok(());
    }

    out.push(GoogleContent {
        role: Some("user".to_owned()),
        parts: non_empty(parts),
    });

    Ok(())
}

fn tool_result_to_google(
    result: &ToolResult,
    call_names: &HashMap<&str, &str>,
) -> Result<GoogleFunctionResponse, LlmError> {
    let declared = call_names.get(result.id.as_str()).copied().ok_or_else(|| {
        LlmError::BadParameter(format!("tool result id `{}` matches no earlier tool call", result.id))
    })?;
    let name = if result.name.is_empty() {
        declared
    } else {
        result.name.as_str()
    };

    let response = match &result.content {
        content if result.is_error => json!({ "error": content }),
        Value::Object(_) => result.content.clone(),
        content => json!({ "result": content }),
    };

    Ok(GoogleFunctionResponse {
        name: name.to_owned(),
        response,
    })
}

fn assistant_to_google(message: &Message, provider: &str) -> Result<GoogleContent, LlmError> {
    let mut parts = Vec::new();
    let mut signature = message.meta_str(THINKING_SIGNATURE).map(str::to_owned);

    for block in &message.content {
        match block {
            ContentBlock::Thinking(text) => parts.push(GooglePart {
                text: Some(text.clone()),
                thought: true,
                thought_signature: signature.take(),
                ..GooglePart::default()
            }),
            ContentBlock::Text(text) => parts.push(GooglePart::text(text.clone())),
            ContentBlock::Attachment(attachment) => parts.push(attachment_to_google(attachment, provider)?),
            ContentBlock::ToolCall(call) => parts.push(GooglePart {
                function_call: Some(GoogleFunctionCall {
                    id: None,
                    name: call.name.clone(),
                    args: match &call.input {
                        Value::Null => json!({}),
                        input => input.clone(),
                    },
                }),
                ..GooglePart::default()
            }),
            ContentBlock::ToolResult(result) => {
                return Err(LlmError::BadParameter(format!(
                    "tool result `{}` in an assistant message",
                    result.id
                )));
            }
        }
    }

    // without a thought part, the signature belongs to the first function call
    if let Some(signature) = signature {
        let carrier = parts
            .iter()
            .position(|part| part.function_call.is_some())
            .unwrap_or(0);
        if let Some(part) = parts.get_mut(carrier) {
            part.thought_signature = Some(signature);
        }
    }

    Ok(GoogleContent {
        role: Some("model".to_owned()),
        parts: non_empty(parts),
    })
}

/// Google rejects contents without parts
fn non_empty(mut parts: Vec<GooglePart>) -> Vec<GooglePart> {
    if parts.is_empty() {
        parts.push(GooglePart::text(String::new()));
    }
    parts
}

fn attachment_to_google(attachment: &Attachment, provider: &str) -> Result<GooglePart, LlmError> {
    if attachment.family() == MediaFamily::Other {
        return Err(LlmError::UnsupportedAttachment {
            provider: provider.to_owned(),
            mime_type: attachment.mime_type.clone(),
        });
    }

    let part = match &attachment.source {
        AttachmentSource::Inline(bytes) => GooglePart {
            inline_data: Some(GoogleInlineData {
                mime_type: attachment.mime_type.clone(),
                data: STANDARD.encode(bytes),
            }),
            ..GooglePart::default()
        },
        AttachmentSource::Url(uri) => GooglePart {
            file_data: Some(GoogleFileData {
                mime_type: Some(attachment.mime_type.clone()),
                file_uri: uri.clone(),
            }),
            ..GooglePart::default()
        },
    };

    Ok(part)
}

// -- Inbound: wire response -> fragments --

fn embedded_error(value: &Value) -> Option<LlmError> {
    super::embedded_error(value, |detail: GoogleErrorDetail| {
        tracing::debug!(code = detail.code, status = %detail.status, "provider reported an error");
        detail.message
    })
}

/// Decode a whole `generateContent` response into a single fragment
pub fn response_to_fragment(value: Value) -> Result<Fragment, LlmError> {
    if let Some(error) = embedded_error(&value) {
        return Err(error);
    }

    let response: GoogleResponse =
        serde_json::from_value(value).map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;

    if response.candidates.is_empty() && blocked_prompt(&response).is_none() {
        return Err(LlmError::Upstream("response contained no candidates".to_owned()));
    }

    decode_response(response)
}

/// Decode one SSE `data` payload of a streamed response
///
/// Every payload is a complete response object; there is no end-of-stream
/// sentinel.
pub fn chunk_to_event(data: &str) -> Result<FragmentEvent, LlmError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(FragmentEvent::Skip);
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

    let response: GoogleResponse = match serde_json::from_value(value) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, "skipping SSE chunk of unexpected shape");
            return Ok(FragmentEvent::Skip);
        }
    };

    let fragment = decode_response(response)?;
    if fragment == Fragment::default() {
        return Ok(FragmentEvent::Skip);
    }

    Ok(FragmentEvent::Fragment(fragment))
}

fn blocked_prompt(response: &GoogleResponse) -> Option<&str> {
    response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
        .filter(|reason| !reason.is_empty())
}

const fn usage(metadata: GoogleUsageMetadata) -> Usage {
    Usage {
        input_tokens: metadata.prompt_token_count,
        output_tokens: metadata.candidates_token_count.saturating_add(metadata.thoughts_token_count),
    }
}

fn decode_response(response: GoogleResponse) -> Result<Fragment, LlmError> {
    let mut fragment = Fragment {
        usage: response.usage_metadata.map(usage),
        ..Fragment::default()
    };

    if response.candidates.is_empty() {
        if let Some(reason) = blocked_prompt(&response) {
            tracing::debug!(block_reason = reason, "prompt was blocked");
            fragment.role = Some(Role::Assistant);
            fragment.finish_reason = Some(if GOOGLE_FINISH_REASONS.normalize(reason) == ResultType::Blocked {
                reason.to_owned()
            } else {
                PROMPT_BLOCKED.to_owned()
            });
        }
        return Ok(fragment);
    }

    // only the first candidate is reconstructed
    let Some(candidate) = response
        .candidates
        .into_iter()
        .find(|candidate| candidate.index.unwrap_or(0) == 0)
    else {
        return Ok(fragment);
    };

    fragment.finish_reason = candidate.finish_reason;

    let Some(content) = candidate.content else {
        return Ok(fragment);
    };

    if content.role.as_deref().is_none_or(|role| role == "model") {
        fragment.role = Some(Role::Assistant);
    }

    let mut text = String::new();
    let mut thinking = String::new();

    for part in content.parts {
        if let Some(signature) = part.thought_signature.filter(|s| !s.is_empty()) {
            fragment.thinking_signature = Some(signature);
        }

        if let Some(t) = part.text {
            if part.thought {
                thinking.push_str(&t);
            } else {
                text.push_str(&t);
            }
        } else if let Some(inline) = part.inline_data {
            let bytes = STANDARD
                .decode(inline.data.as_bytes())
                .map_err(|e| LlmError::Upstream(format!("invalid base64 in inlineData: {e}")))?;
            fragment.attachments.push(Attachment::inline(inline.mime_type, bytes));
        } else if let Some(file) = part.file_data {
            let mime_type = file
                .mime_type
                .unwrap_or_else(|| "application/octet-stream".to_owned());
            fragment.attachments.push(Attachment::url(mime_type, file.file_uri));
        } else if let Some(call) = part.function_call {
            fragment.tool_calls.push(ToolCallChunk {
                index: None,
                id: call.id.filter(|id| !id.is_empty()),
                name: Some(call.name),
                arguments: ArgumentsChunk::Complete(match call.args {
                    Value::Null => json!({}),
                    args => args,
                }),
            });
        } else {
            tracing::debug!("skipping unsupported response part");
        }
    }

    fragment.text = (!text.is_empty()).then_some(text);
    fragment.thinking = (!thinking.is_empty()).then_some(thinking);

    Ok(fragment)
}
