//! Canonical, provider-agnostic conversation model
//!
//! Every provider adapter translates to and from these types. Nothing in this
//! crate knows about a specific wire protocol.

#![allow(clippy::must_use_candidate)]

pub mod content;
pub mod conversation;
pub mod message;
pub mod tool;

pub use content::{Attachment, AttachmentSource, ContentBlock, MediaFamily, ToolCall, ToolResult};
pub use conversation::Conversation;
pub use message::{INPUT_TOKENS, Message, Meta, ResultType, Role, THINKING_SIGNATURE};
pub use tool::ToolDefinition;
