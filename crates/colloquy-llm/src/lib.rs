//! Cross-provider conversation adapter
//!
//! Converts one canonical [`Conversation`](colloquy_core::Conversation) into
//! the wire formats of OpenAI-style chat completion APIs (`OpenAI`, Mistral)
//! and the Google Generative Language API, and reconstructs canonical
//! messages from their whole or streamed responses.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod convert;
pub mod draft;
pub mod error;
pub mod finish;
pub mod fragment;
pub mod generate;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod sanitize;
pub mod stream;
pub mod tools;
pub mod transport;

pub use colloquy_config::MixedContentPolicy;
pub use error::{ErrorKind, GenerationError, LlmError};
pub use generate::Generator;
pub use provider::{GenerateOptions, GoogleAdapter, OpenAiAdapter, ProviderAdapter, WireConversation};
pub use registry::AdapterRegistry;
pub use stream::{Delta, DeltaCallback, StreamReconstructor};
pub use tools::Toolkit;
pub use transport::{HttpTransport, RawStream, Transport};
