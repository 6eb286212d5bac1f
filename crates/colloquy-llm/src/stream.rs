//! Streaming response reconstruction
//!
//! A [`StreamReconstructor`] is owned by exactly one in-flight generation.
//! Fragments must be applied in arrival order; the final message is identical
//! to what the non-streaming path would produce for the same content.

use colloquy_core::Message;

use crate::draft::MessageDraft;
use crate::error::LlmError;
use crate::finish::FinishReasonTable;
use crate::fragment::Fragment;

/// Incremental update forwarded to a live-update callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta<'a> {
    /// Newly arrived text, not the accumulated total
    Text(&'a str),
    /// Newly arrived reasoning trace
    Thinking(&'a str),
}

/// Live-update callback, invoked synchronously for each non-empty delta
pub type DeltaCallback<'a> = dyn FnMut(Delta<'_>) + Send + 'a;

/// Accumulates streamed fragments into one message
pub struct StreamReconstructor<'a> {
    draft: MessageDraft,
    finish_reasons: &'static FinishReasonTable,
    on_delta: Option<&'a mut DeltaCallback<'a>>,
    fragments: usize,
}

impl<'a> StreamReconstructor<'a> {
    pub fn new(finish_reasons: &'static FinishReasonTable) -> Self {
        Self {
            draft: MessageDraft::new(),
            finish_reasons,
            on_delta: None,
            fragments: 0,
        }
    }

    #[must_use]
    pub fn with_callback(mut self, on_delta: &'a mut DeltaCallback<'a>) -> Self {
        self.on_delta = Some(on_delta);
        self
    }

    /// Number of fragments applied so far
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn draft(&self) -> &MessageDraft {
        &self.draft
    }

    /// Apply the next fragment in arrival order
    pub fn apply(&mut self, fragment: Fragment) {
        self.fragments += 1;

        if let Some(on_delta) = self.on_delta.as_deref_mut() {
            if let Some(thinking) = fragment.thinking.as_deref().filter(|t| !t.is_empty()) {
                on_delta(Delta::Thinking(thinking));
            }
            if let Some(text) = fragment.text.as_deref().filter(|t| !t.is_empty()) {
                on_delta(Delta::Text(text));
            }
        }

        self.draft.apply(fragment);
    }

    /// Finalize after the end-of-stream marker or the end of input
    pub fn finish(self) -> Result<Message, LlmError> {
        tracing::debug!(
            protocol = self.finish_reasons.protocol(),
            fragments = self.fragments,
            "stream complete"
        );
        self.draft.finish(self.finish_reasons)
    }

    /// Finalize with whatever has accumulated, after a failure or cancellation
    pub fn finish_partial(self) -> Message {
        tracing::debug!(
            protocol = self.finish_reasons.protocol(),
            fragments = self.fragments,
            "finalizing interrupted stream"
        );
        self.draft.finish_partial(self.finish_reasons)
    }
}

impl std::fmt::Debug for StreamReconstructor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReconstructor")
            .field("draft", &self.draft)
            .field("protocol", &self.finish_reasons.protocol())
            .field("has_callback", &self.on_delta.is_some())
            .field("fragments", &self.fragments)
            .finish()
    }
}
