//! Model service providers for mnemos.
//!
//! All providers implement the `mnemos_core::Provider` trait.
//! [`build_from_config`] selects the implementation named in configuration.

pub mod hashed;
pub mod openai_compat;

use std::sync::Arc;

use mnemos_config::{ProviderConfig, ProviderKind};
use mnemos_core::{Provider, ProviderError};

pub use hashed::HashedEmbedder;
pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
pub fn build_from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::OpenAi => {
            let api_key = config.api_key.clone().unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!("No API key configured, requests to {} will likely fail", config.base_url);
            }
            Arc::new(OpenAiCompatProvider::new("openai", &config.base_url, api_key)?)
        }
        ProviderKind::Hash => Arc::new(HashedEmbedder::new(config.hash_dimension)),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_hash_provider() {
        let config = ProviderConfig {
            kind: ProviderKind::Hash,
            ..ProviderConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "hash");
    }

    #[test]
    fn builds_openai_provider_without_key() {
        let provider = build_from_config(&ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
