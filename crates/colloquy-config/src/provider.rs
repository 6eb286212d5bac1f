use indexmap::IndexMap;
use serde::Deserialize;
use url::Url;

/// Configuration for a single provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol preset
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model used when the caller does not name one
    #[serde(default)]
    pub default_model: Option<String>,
    /// Handling of assistant turns that mix text with tool calls
    #[serde(default)]
    pub mixed_content: MixedContentPolicy,
    /// Static headers sent with every request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl ProviderConfig {
    /// Configured base URL, or the preset's public endpoint
    pub fn base_url(&self) -> Url {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider_type.default_base_url())
    }
}

/// Supported wire protocol presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenAI chat completions
    Openai,
    /// Mistral chat completions (OpenAI-style with stricter rules)
    Mistral,
    /// Google Generative Language API
    Google,
}

impl ProviderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Mistral => "mistral",
            Self::Google => "google",
        }
    }

    /// Public API endpoint of the preset
    ///
    /// # Panics
    ///
    /// Panics if a hardcoded default URL is invalid (should never happen).
    pub fn default_base_url(self) -> Url {
        let raw = match self {
            Self::Openai => "https://api.openai.com/v1/",
            Self::Mistral => "https://api.mistral.ai/v1/",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/",
        };
        Url::parse(raw).expect("valid default URL")
    }
}

/// What to do with free text in an assistant turn that also carries tool
/// calls, when the destination forbids the combination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedContentPolicy {
    /// Keep the tool calls, drop the text and log a warning
    #[default]
    DropText,
    /// Fail the conversion
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_defaults() {
        let config: ProviderConfig = toml::from_str(r#"type = "mistral""#).unwrap();
        assert_eq!(config.provider_type, ProviderType::Mistral);
        assert_eq!(config.mixed_content, MixedContentPolicy::DropText);
        assert_eq!(config.base_url().as_str(), "https://api.mistral.ai/v1/");
        assert!(config.headers.is_empty());
    }

    #[test]
    fn mixed_content_reject() {
        let config: ProviderConfig = toml::from_str(
            r#"
            type = "openai"
            mixed_content = "reject"
            base_url = "http://localhost:8080/v1/"
            "#,
        )
        .unwrap();
        assert_eq!(config.mixed_content, MixedContentPolicy::Reject);
        assert_eq!(config.base_url().as_str(), "http://localhost:8080/v1/");
    }

    #[test]
    fn unknown_provider_type_is_rejected() {
        let err = toml::from_str::<ProviderConfig>(r#"type = "anthropic""#).unwrap_err();
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<ProviderConfig>("type = \"google\"\napi_kee = \"x\"").unwrap_err();
        assert!(err.to_string().contains("api_kee"));
    }
}
