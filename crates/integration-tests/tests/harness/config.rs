//! Programmatic configuration builder for integration tests

use colloquy_config::{Config, MixedContentPolicy, ProviderConfig, ProviderType};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder without providers
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Add a provider of the given type pointed at a mock backend
    pub fn with_provider(mut self, name: &str, provider_type: ProviderType, base_url: &str) -> Self {
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig {
                provider_type,
                base_url: Some(base_url.parse().expect("valid URL")),
                default_model: None,
                mixed_content: MixedContentPolicy::default(),
                headers: [("Authorization".to_owned(), "Bearer test-key".to_owned())]
                    .into_iter()
                    .collect(),
            },
        );
        self
    }

    pub fn with_openai_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ProviderType::Openai, base_url)
    }

    pub fn with_mistral_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ProviderType::Mistral, base_url)
    }

    pub fn with_google_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ProviderType::Google, base_url)
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config.validate().expect("valid test config");
        self.config
    }
}
