use colloquy_core::Message;
use thiserror::Error;

/// Errors that can occur while converting or generating conversations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Malformed input or an illegal structural combination
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// Attachment media family the destination cannot render
    #[error("provider {provider} does not support attachments of type {mime_type}")]
    UnsupportedAttachment { provider: String, mime_type: String },

    /// Tool call arguments were not valid JSON
    #[error("invalid arguments for tool call {name}: {source}")]
    InvalidToolArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Generation was truncated by the token limit
    #[error("maximum token count reached")]
    MaxTokensReached,

    /// Upstream provider returned or reported an error
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error while consuming a streaming response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Generation was cancelled before it completed
    #[error("generation cancelled")]
    Cancelled,

    /// Duplicate tool or identifier
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referenced provider, tool, or model is absent
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Canonical error taxonomy exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadParameter,
    MaxTokensReached,
    UpstreamError,
    Conflict,
    NotFound,
}

impl LlmError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadParameter(_) | Self::UnsupportedAttachment { .. } | Self::InvalidToolArguments { .. } => {
                ErrorKind::BadParameter
            }
            Self::MaxTokensReached => ErrorKind::MaxTokensReached,
            Self::Upstream(_) | Self::Streaming(_) | Self::Cancelled | Self::Internal(_) => ErrorKind::UpstreamError,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

/// Failure of a generation, paired with whatever message was produced
///
/// Truncated or interrupted generations still carry content the caller may
/// want, so it is returned instead of dropped.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct GenerationError {
    #[source]
    pub error: LlmError,
    pub partial: Option<Message>,
}

impl GenerationError {
    pub fn with_partial(error: LlmError, partial: Message) -> Self {
        Self {
            error,
            partial: Some(partial),
        }
    }
}

impl From<LlmError> for GenerationError {
    fn from(error: LlmError) -> Self {
        Self { error, partial: None }
    }
}
