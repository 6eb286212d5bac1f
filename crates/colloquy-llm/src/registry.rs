//! Named provider adapters
//!
//! The registry is built once at startup and then only read, so lookups hand
//! out shared [`Arc`] handles.

use std::collections::HashMap;
use std::sync::Arc;

use colloquy_config::{Config, ProviderConfig, ProviderType};

use crate::error::LlmError;
use crate::provider::{GoogleAdapter, OpenAiAdapter, ProviderAdapter};

/// Registry of adapters keyed by provider name
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `openai`, `mistral` and `google` with their preset rules
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for provider_type in [ProviderType::Openai, ProviderType::Mistral, ProviderType::Google] {
            registry
                .adapters
                .insert(provider_type.as_str().to_owned(), adapter_for(provider_type.as_str(), None));
        }
        registry
    }

    /// One adapter per configured provider
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let mut registry = Self::new();
        for (name, provider) in &config.providers {
            registry.register(adapter_for(name, Some(provider)))?;
            tracing::debug!(
                provider = %name,
                provider_type = provider.provider_type.as_str(),
                "registered provider adapter"
            );
        }
        Ok(registry)
    }

    /// Add an adapter under its own name
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> Result<(), LlmError> {
        let name = adapter.name().to_owned();
        if self.adapters.contains_key(&name) {
            return Err(LlmError::Conflict(format!("provider `{name}` is already registered")));
        }
        self.adapters.insert(name, adapter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        self.adapters.get(name).cloned().ok_or_else(|| LlmError::NotFound {
            kind: "provider",
            name: name.to_owned(),
        })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn adapter_for(name: &str, config: Option<&ProviderConfig>) -> Arc<dyn ProviderAdapter> {
    let provider_type = config.map_or_else(
        || match name {
            "mistral" => ProviderType::Mistral,
            "google" => ProviderType::Google,
            _ => ProviderType::Openai,
        },
        |config| config.provider_type,
    );
    let policy = config.map(|config| config.mixed_content).unwrap_or_default();

    match provider_type {
        ProviderType::Openai => Arc::new(OpenAiAdapter::openai(name).with_mixed_content(policy)),
        ProviderType::Mistral => Arc::new(OpenAiAdapter::mistral(name).with_mixed_content(policy)),
        ProviderType::Google => Arc::new(GoogleAdapter::new(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_cover_all_presets() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["google", "mistral", "openai"]);
        assert_eq!(registry.get("mistral").unwrap().name(), "mistral");
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let err = AdapterRegistry::with_defaults().get("anthropic").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "provider not found: anthropic");
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut registry = AdapterRegistry::with_defaults();
        let err = registry
            .register(Arc::new(GoogleAdapter::new("google")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn config_names_adapters() {
        let config = Config::parse(
            r#"
            [providers.gemini]
            type = "google"

            [providers.le-chat]
            type = "mistral"
            mixed_content = "reject"
            "#,
        )
        .unwrap();

        let registry = AdapterRegistry::from_config(&config).unwrap();
        assert_eq!(registry.names(), vec!["gemini", "le-chat"]);
        assert_eq!(
            registry.get("gemini").unwrap().endpoint("gemini-2.0-flash", false),
            "models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(registry.get("le-chat").unwrap().endpoint("m", true), "chat/completions");
    }
}
