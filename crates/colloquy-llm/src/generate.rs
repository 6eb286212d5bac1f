//! One-call generation on top of an adapter and a transport

use std::sync::Arc;

use colloquy_core::{Conversation, Message, ResultType};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{GenerationError, LlmError};
use crate::fragment::FragmentEvent;
use crate::provider::{GenerateOptions, ProviderAdapter};
use crate::stream::{DeltaCallback, StreamReconstructor};
use crate::transport::Transport;

/// Runs generations against one provider
#[derive(Clone)]
pub struct Generator {
    adapter: Arc<dyn ProviderAdapter>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("provider", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

impl Generator {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, transport: Arc<dyn Transport>) -> Self {
        Self { adapter, transport }
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    /// Generate the next assistant turn and append it to `conversation`
    ///
    /// With a callback the response is streamed and every text or thinking
    /// delta is forwarded as it arrives; without one a single request is made.
    pub async fn generate(
        &self,
        conversation: &mut Conversation,
        options: &GenerateOptions,
        on_delta: Option<&mut DeltaCallback<'_>>,
    ) -> Result<Message, GenerationError> {
        self.generate_with_cancel(conversation, options, on_delta, CancellationToken::new())
            .await
    }

    /// Same as [`Generator::generate`], stopping early once `cancel` fires
    ///
    /// A cancelled stream returns what was received so far as the partial
    /// message; nothing is appended to the conversation.
    pub async fn generate_with_cancel(
        &self,
        conversation: &mut Conversation,
        options: &GenerateOptions,
        on_delta: Option<&mut DeltaCallback<'_>>,
        cancel: CancellationToken,
    ) -> Result<Message, GenerationError> {
        if conversation.is_empty() {
            return Err(LlmError::BadParameter("conversation is empty".to_owned()).into());
        }

        let stream = on_delta.is_some();
        let wire = self.adapter.to_wire(conversation)?;
        let body = self.adapter.request_body(wire, options, stream)?;
        let path = self.adapter.endpoint(&options.model, stream);

        tracing::debug!(
            provider = self.adapter.name(),
            model = %options.model,
            stream,
            messages = conversation.len(),
            "starting generation"
        );

        let message = match on_delta {
            Some(on_delta) => self.stream_message(&path, &body, on_delta, &cancel).await?,
            None => {
                let response = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(LlmError::Cancelled.into()),
                    response = self.transport.send(&path, &body) => response?,
                };
                self.adapter.from_wire(response)?
            }
        };

        self.settle(conversation, message)
    }

    async fn stream_message(
        &self,
        path: &str,
        body: &serde_json::Value,
        on_delta: &mut DeltaCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<Message, GenerationError> {
        let mut events = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(LlmError::Cancelled.into()),
            events = self.transport.stream(path, body) => events?,
        };

        let mut reconstructor = StreamReconstructor::new(self.adapter.finish_reasons()).with_callback(on_delta);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(
                        provider = self.adapter.name(),
                        fragments = reconstructor.fragments(),
                        "generation cancelled"
                    );
                    return Err(GenerationError::with_partial(LlmError::Cancelled, reconstructor.finish_partial()));
                }
                next = events.next() => next,
            };

            // end of input terminates protocols without a sentinel
            let Some(data) = next else { break };

            match data.and_then(|data| self.adapter.decode_fragment(&data)) {
                Ok(FragmentEvent::Fragment(fragment)) => reconstructor.apply(fragment),
                Ok(FragmentEvent::Done) => break,
                Ok(FragmentEvent::Skip) => {}
                Err(error) => {
                    tracing::error!(provider = self.adapter.name(), error = %error, "stream failed");
                    return Err(GenerationError::with_partial(error, reconstructor.finish_partial()));
                }
            }
        }

        Ok(reconstructor.finish()?)
    }

    fn settle(&self, conversation: &mut Conversation, message: Message) -> Result<Message, GenerationError> {
        tracing::info!(
            provider = self.adapter.name(),
            result = ?message.result,
            tokens = message.tokens,
            "generation finished"
        );

        match message.result {
            ResultType::MaxTokens => {
                conversation.push(message.clone());
                Err(GenerationError::with_partial(LlmError::MaxTokensReached, message))
            }
            ResultType::Error => Err(GenerationError::with_partial(
                LlmError::Upstream("provider reported an error during generation".to_owned()),
                message,
            )),
            _ => {
                conversation.push(message.clone());
                Ok(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use colloquy_core::{Role, ToolDefinition};
    use futures_util::stream;
    use serde_json::{Value, json};

    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::{GoogleAdapter, OpenAiAdapter};
    use crate::stream::Delta;
    use crate::transport::RawStream;

    /// Replays canned bodies and records every request
    #[derive(Default)]
    struct FakeTransport {
        response: Value,
        chunks: Vec<String>,
        fail_after_chunks: bool,
        hang_after_chunks: bool,
        requests: Mutex<Vec<(String, Value)>>,
    }

    impl FakeTransport {
        fn responding(response: Value) -> Self {
            Self {
                response,
                ..Self::default()
            }
        }

        fn streaming(chunks: &[Value]) -> Self {
            Self {
                chunks: chunks.iter().map(Value::to_string).collect(),
                ..Self::default()
            }
        }

        fn record(&self, path: &str, body: &Value) {
            self.requests.lock().unwrap().push((path.to_owned(), body.clone()));
        }

        fn last_request(&self) -> (String, Value) {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
            self.record(path, body);
            Ok(self.response.clone())
        }

        async fn stream(&self, path: &str, body: &Value) -> Result<RawStream, LlmError> {
            self.record(path, body);
            let chunks = stream::iter(self.chunks.clone().into_iter().map(Ok));
            if self.fail_after_chunks {
                let failure = stream::once(async { Err(LlmError::Streaming("connection reset".to_owned())) });
                Ok(Box::pin(chunks.chain(failure)))
            } else if self.hang_after_chunks {
                Ok(Box::pin(chunks.chain(stream::pending())))
            } else {
                Ok(Box::pin(chunks))
            }
        }
    }

    fn generator(adapter: impl ProviderAdapter + 'static, transport: &Arc<FakeTransport>) -> Generator {
        let transport: Arc<dyn Transport> = transport.clone();
        Generator::new(Arc::new(adapter), transport)
    }

    fn text_chunk(text: &str) -> Value {
        json!({"choices": [{"index": 0, "delta": {"content": text}}]})
    }

    #[tokio::test]
    async fn non_streaming_generation_appends_reply() {
        let transport = Arc::new(FakeTransport::responding(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2}
        })));
        let generator = generator(OpenAiAdapter::openai("openai"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("hi")]);

        let reply = generator
            .generate(&mut conversation, &GenerateOptions::new("gpt-4o-mini"), None)
            .await
            .unwrap();

        assert_eq!(reply.text(), "Hello!");
        assert_eq!(reply.tokens, 2);
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.last(), Some(&reply));

        let (path, body) = transport.last_request();
        assert_eq!(path, "chat/completions");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
        assert!(body.get("stream").is_none());
    }

    #[tokio::test]
    async fn streaming_generation_forwards_deltas() {
        let transport = Arc::new(FakeTransport {
            chunks: vec![
                json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}).to_string(),
                text_chunk("Hel").to_string(),
                text_chunk("lo").to_string(),
                json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}).to_string(),
                "[DONE]".to_owned(),
                text_chunk("ignored").to_string(),
            ],
            ..FakeTransport::default()
        });
        let generator = generator(OpenAiAdapter::openai("openai"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("hi")]);

        let mut deltas = Vec::new();
        let mut on_delta = |delta: Delta<'_>| {
            if let Delta::Text(text) = delta {
                deltas.push(text.to_owned());
            }
        };

        let reply = generator
            .generate(&mut conversation, &GenerateOptions::new("gpt-4o-mini"), Some(&mut on_delta))
            .await
            .unwrap();

        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(reply.text(), "Hello");
        assert_eq!(reply.result, ResultType::Stop);
        assert_eq!(conversation.len(), 2);
        assert_eq!(transport.last_request().1["stream"], true);
    }

    #[tokio::test]
    async fn google_stream_ends_with_input() {
        let transport = Arc::new(FakeTransport::streaming(&[
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Ciao"}]}}]}),
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "!"}]}, "finishReason": "STOP"}]}),
        ]));
        let generator = generator(GoogleAdapter::new("google"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("hi")]);

        let mut on_delta = |_: Delta<'_>| {};
        let reply = generator
            .generate(&mut conversation, &GenerateOptions::new("gemini-2.0-flash"), Some(&mut on_delta))
            .await
            .unwrap();

        assert_eq!(reply.text(), "Ciao!");
        assert_eq!(
            transport.last_request().0,
            "models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn max_tokens_is_appended_and_reported() {
        let transport = Arc::new(FakeTransport::responding(json!({
            "choices": [{"message": {"role": "assistant", "content": "Once upon"}, "finish_reason": "length"}]
        })));
        let generator = generator(OpenAiAdapter::openai("openai"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("story")]);

        let err = generator
            .generate(&mut conversation, &GenerateOptions::new("gpt-4o-mini").with_max_tokens(2), None)
            .await
            .unwrap_err();

        assert_eq!(err.error.kind(), ErrorKind::MaxTokensReached);
        assert_eq!(err.partial.unwrap().text(), "Once upon");
        assert_eq!(conversation.len(), 2);
        assert_eq!(transport.last_request().1["max_tokens"], 2);
    }

    #[tokio::test]
    async fn error_result_is_upstream_and_not_appended() {
        let transport = Arc::new(FakeTransport::responding(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "x"}]},
                            "finishReason": "MALFORMED_FUNCTION_CALL"}]
        })));
        let generator = generator(GoogleAdapter::new("google"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("hi")]);

        let err = generator
            .generate(&mut conversation, &GenerateOptions::new("gemini-2.0-flash"), None)
            .await
            .unwrap_err();

        assert!(matches!(err.error, LlmError::Upstream(_)));
        assert_eq!(err.partial.unwrap().result, ResultType::Error);
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_keeps_partial_message() {
        let transport = Arc::new(FakeTransport {
            chunks: vec![text_chunk("Par").to_string(), text_chunk("tial").to_string()],
            fail_after_chunks: true,
            ..FakeTransport::default()
        });
        let generator = generator(OpenAiAdapter::openai("openai"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("hi")]);

        let mut on_delta = |_: Delta<'_>| {};
        let err = generator
            .generate(&mut conversation, &GenerateOptions::new("gpt-4o-mini"), Some(&mut on_delta))
            .await
            .unwrap_err();

        assert!(matches!(err.error, LlmError::Streaming(_)));
        let partial = err.partial.unwrap();
        assert_eq!(partial.role, Role::Assistant);
        assert_eq!(partial.text(), "Partial");
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_returns_accumulated_text() {
        let transport = Arc::new(FakeTransport {
            chunks: vec![text_chunk("Half").to_string()],
            hang_after_chunks: true,
            ..FakeTransport::default()
        });
        let generator = generator(OpenAiAdapter::openai("openai"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("hi")]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut on_delta = move |_: Delta<'_>| trigger.cancel();

        let err = generator
            .generate_with_cancel(
                &mut conversation,
                &GenerateOptions::new("gpt-4o-mini"),
                Some(&mut on_delta),
                cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err.error, LlmError::Cancelled));
        assert_eq!(err.partial.unwrap().text(), "Half");
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn tools_are_sent_in_the_provider_dialect() {
        let transport = Arc::new(FakeTransport::responding(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "lookup", "args": {"q": "rust"}}}
            ]}, "finishReason": "STOP"}]
        })));
        let generator = generator(GoogleAdapter::new("google"), &transport);
        let mut conversation = Conversation::with_messages(vec![Message::user("search rust")]);
        let options = GenerateOptions::new("gemini-2.0-flash").with_tools(vec![ToolDefinition::new(
            "lookup",
            "Search",
            json!({"type": "object", "properties": {"q": {"type": "string", "default": "x"}}}),
        )]);

        let reply = generator.generate(&mut conversation, &options, None).await.unwrap();

        assert_eq!(reply.result, ResultType::ToolCall);
        let body = transport.last_request().1;
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["parameters"]["properties"]["q"],
            json!({"type": "string"})
        );
    }

    #[tokio::test]
    async fn empty_conversation_is_rejected() {
        let transport = Arc::new(FakeTransport::default());
        let generator = generator(OpenAiAdapter::openai("openai"), &transport);

        let err = generator
            .generate(&mut Conversation::new(), &GenerateOptions::new("gpt-4o-mini"), None)
            .await
            .unwrap_err();

        assert_eq!(err.error.kind(), ErrorKind::BadParameter);
        assert!(transport.requests.lock().unwrap().is_empty());
    }
}
