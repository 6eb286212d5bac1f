//! Request delivery to provider endpoints
//!
//! A [`Transport`] only moves JSON bodies and raw SSE payloads; every
//! protocol decision lives in the adapters.

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde_json::Value;
use url::Url;

use colloquy_config::ProviderConfig;

use crate::error::LlmError;

/// Raw `data` payloads of a server-sent event stream
pub type RawStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Delivery of request bodies to one provider
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the whole response body
    async fn send(&self, path: &str, body: &Value) -> Result<Value, LlmError>;

    /// Send a request and return the event payloads as they arrive
    async fn stream(&self, path: &str, body: &Value) -> Result<RawStream, LlmError>;
}

/// HTTP transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    name: String,
    client: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            base_url,
            headers: HeaderMap::new(),
        }
    }

    /// Build from a provider's configuration
    pub fn from_config(name: impl Into<String>, config: &ProviderConfig) -> Result<Self, LlmError> {
        let mut transport = Self::new(name, config.base_url());
        for (key, value) in &config.headers {
            transport = transport.with_header(key, value)?;
        }
        Ok(transport)
    }

    /// Add a static header sent with every request
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, LlmError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::BadParameter(format!("invalid header name `{name}`: {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::BadParameter(format!("invalid value for header `{name}`: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(name, value);
        Ok(self)
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{}", path.trim_start_matches('/'))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Response, LlmError> {
        let response = self
            .client
            .post(self.url(path))
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = %self.name, error = %e, "upstream request failed");
                LlmError::Upstream(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                provider = %self.name,
                status = %status,
                "upstream returned error"
            );
            return Err(LlmError::Upstream(format!("provider returned {status}: {body}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        self.post(path, body)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))
    }

    async fn stream(&self, path: &str, body: &Value) -> Result<RawStream, LlmError> {
        let response = self.post(path, body).await?;

        let events = response.bytes_stream().eventsource().map(|result| match result {
            Ok(event) => Ok(event.data),
            Err(e) => Err(LlmError::Streaming(e.to_string())),
        });

        Ok(Box::pin(events))
    }
}
