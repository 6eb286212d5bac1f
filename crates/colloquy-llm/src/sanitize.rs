//! Tool-call identifier validation and consistent replacement
//!
//! Some destinations constrain invocation identifiers (Mistral accepts exactly
//! nine ASCII alphanumerics). Invalid identifiers are replaced during outbound
//! conversion, and the replacements are handed to the matching tool results in
//! the order the calls were declared.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::LlmError;

/// Draws allowed before an identifier space counts as exhausted
const MAX_DRAWS: usize = 1024;

/// Syntax rule for tool-call identifiers at one destination
pub trait IdSanitizer: fmt::Debug + Send + Sync {
    fn is_valid(&self, id: &str) -> bool;

    /// Fresh identifier satisfying [`IdSanitizer::is_valid`]
    fn generate(&self) -> String;
}

/// Fixed-length ASCII alphanumeric identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphanumericIds {
    len: usize,
}

impl AlphanumericIds {
    /// Rule used by Mistral's chat API
    pub const MISTRAL: Self = Self { len: 9 };

    pub const fn new(len: usize) -> Self {
        Self {
            len: if len == 0 { 1 } else { len },
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }
}

impl IdSanitizer for AlphanumericIds {
    fn is_valid(&self, id: &str) -> bool {
        id.len() == self.len && id.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    fn generate(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}

/// Any non-empty identifier without whitespace, up to 64 bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NonEmptyIds;

impl IdSanitizer for NonEmptyIds {
    fn is_valid(&self, id: &str) -> bool {
        !id.is_empty() && id.len() <= 64 && !id.chars().any(char::is_whitespace)
    }

    fn generate(&self) -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }
}

/// Per-conversion replacement queue
///
/// Create one for each outbound conversion and drop it afterwards; it is
/// never shared between conversions. Every identifier emitted for a tool call
/// is remembered, so a result can only refer to a call declared earlier in
/// the same pass.
#[derive(Debug)]
pub struct IdRemapper<'a> {
    sanitizer: &'a dyn IdSanitizer,
    pending: VecDeque<(String, String)>,
    /// Identifiers emitted for tool calls, kept and replaced alike
    issued: HashSet<String>,
}

impl<'a> IdRemapper<'a> {
    pub fn new(sanitizer: &'a dyn IdSanitizer) -> Self {
        Self {
            sanitizer,
            pending: VecDeque::new(),
            issued: HashSet::new(),
        }
    }

    /// Identifier to emit for a tool call
    ///
    /// Valid identifiers pass through unchanged. Invalid ones are replaced by
    /// a fresh identifier that is distinct from every other identifier issued
    /// in this pass, and the replacement is queued for the matching result.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Conflict`] when the sanitizer cannot produce an
    /// identifier that has not been issued already.
    pub fn call_id(&mut self, original: &str) -> Result<String, LlmError> {
        if self.sanitizer.is_valid(original) {
            self.issued.insert(original.to_owned());
            return Ok(original.to_owned());
        }

        let replacement = self.fresh()?;
        tracing::debug!(original, replacement = %replacement, "replaced invalid tool call id");
        self.pending.push_back((original.to_owned(), replacement.clone()));
        Ok(replacement)
    }

    /// Identifier to emit for a tool result
    ///
    /// Valid identifiers must name a call emitted earlier in this pass. Invalid
    /// ones take the oldest pending replacement, which assumes results arrive
    /// in the same relative order as their calls were declared.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::BadParameter`] when the result cannot be paired
    /// with an earlier tool call.
    pub fn result_id(&mut self, original: &str) -> Result<String, LlmError> {
        if self.sanitizer.is_valid(original) {
            if !self.issued.contains(original) {
                return Err(LlmError::BadParameter(format!(
                    "tool result id `{original}` matches no earlier tool call"
                )));
            }
            return Ok(original.to_owned());
        }

        let (queued_for, replacement) = self.pending.pop_front().ok_or_else(|| {
            LlmError::BadParameter(format!(
                "tool result id `{original}` is invalid and no earlier tool call is waiting for a result"
            ))
        })?;

        if queued_for != original {
            tracing::debug!(
                original,
                queued_for = %queued_for,
                "tool result order differs from tool call order"
            );
        }

        Ok(replacement)
    }

    /// Number of replacements not yet claimed by a tool result
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn fresh(&mut self) -> Result<String, LlmError> {
        for _ in 0..MAX_DRAWS {
            let candidate = self.sanitizer.generate();
            if self.issued.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }

        Err(LlmError::Conflict(format!(
            "no unused tool call id left after {} replacements",
            self.issued.len()
        )))
    }
}
