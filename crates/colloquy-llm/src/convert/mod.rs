//! Bidirectional conversion between canonical conversation types and wire formats
//!
//! Outbound functions turn a [`colloquy_core::Conversation`] into wire
//! messages; inbound functions turn wire responses and stream payloads into
//! [`crate::fragment::Fragment`]s.

pub mod google;
pub mod openai;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LlmError;

/// Error object reported inside an otherwise successful body
///
/// An error that does not fit the protocol's typed detail keeps its raw JSON
/// as the message.
fn embedded_error<D>(value: &Value, message: impl FnOnce(D) -> String) -> Option<LlmError>
where
    D: DeserializeOwned,
{
    let error = value.get("error").filter(|error| !error.is_null())?;
    let detail: Result<D, _> = Deserialize::deserialize(error);
    let message = detail.map_or_else(|_| error.to_string(), message);
    Some(LlmError::Upstream(message))
}
