//! Builds the configured provider.

use deliberate_config::AppConfig;
use deliberate_core::error::ProviderError;
use deliberate_core::provider::Provider;
use std::sync::Arc;
use tracing::info;

use crate::openai_compat::{OpenAiCompatProvider, default_base_url};

/// Providers that run locally and accept any key.
const KEYLESS: &[&str] = &["ollama", "vllm"];

/// Resolve `default_provider` against `[providers.<name>]`.
///
/// A per-provider `api_key` wins over the top-level one; `api_url` overrides
/// the well-known base URL. Hosted providers without a key are rejected here
/// rather than on the first request.
pub fn provider_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.default_provider.as_str();
    let section = config.providers.get(name);

    let base_url = section
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));
    let api_key = section
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone());

    let api_key = match api_key {
        Some(key) => key,
        None if KEYLESS.contains(&name) => name.to_string(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}' (set api_key, providers.{name}.api_key or DELIBERATE_API_KEY)"
            )));
        }
    };

    info!(provider = name, base_url = %base_url, "Provider configured");
    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}
