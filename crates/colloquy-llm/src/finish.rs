//! Mapping from provider stop signals to [`ResultType`]

use colloquy_core::ResultType;

/// Static lookup table for one protocol's finish reasons
///
/// Lookup is case-insensitive and total: unknown or empty input yields
/// [`ResultType::Other`].
#[derive(Debug)]
pub struct FinishReasonTable {
    protocol: &'static str,
    entries: &'static [(&'static str, ResultType)],
}

impl FinishReasonTable {
    pub const fn new(protocol: &'static str, entries: &'static [(&'static str, ResultType)]) -> Self {
        Self { protocol, entries }
    }

    pub const fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn normalize(&self, raw: &str) -> ResultType {
        let raw = raw.trim();
        self.entries
            .iter()
            .find(|(signal, _)| signal.eq_ignore_ascii_case(raw))
            .map_or(ResultType::Other, |(_, result)| *result)
    }
}

/// OpenAI-style chat completions, including Mistral's extra signals
pub static OPENAI_FINISH_REASONS: FinishReasonTable = FinishReasonTable::new(
    "openai",
    &[
        ("stop", ResultType::Stop),
        ("end_turn", ResultType::Stop),
        ("length", ResultType::MaxTokens),
        ("model_length", ResultType::MaxTokens),
        ("tool_calls", ResultType::ToolCall),
        ("function_call", ResultType::ToolCall),
        ("content_filter", ResultType::Blocked),
        ("error", ResultType::Error),
    ],
);

/// Google Generative Language `finishReason` and `blockReason` values
pub static GOOGLE_FINISH_REASONS: FinishReasonTable = FinishReasonTable::new(
    "google",
    &[
        ("STOP", ResultType::Stop),
        ("MAX_TOKENS", ResultType::MaxTokens),
        ("SAFETY", ResultType::Blocked),
        ("RECITATION", ResultType::Blocked),
        ("PROHIBITED_CONTENT", ResultType::Blocked),
        ("BLOCKLIST", ResultType::Blocked),
        ("SPII", ResultType::Blocked),
        ("IMAGE_SAFETY", ResultType::Blocked),
        ("LANGUAGE", ResultType::Blocked),
        ("MALFORMED_FUNCTION_CALL", ResultType::Error),
        ("UNEXPECTED_TOOL_CALL", ResultType::Error),
    ],
);
