// Configuration layer for building provider clients and fallback chains

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::fallback::{FallbackClient, ProviderRoute};
use crate::openai::OpenAIClient;
use crate::traits::ChatClient;

pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEEPINFRA_API_BASE: &str = "https://api.deepinfra.com/v1/openai";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// One OpenAI-compatible provider endpoint serving one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Extra request body fields, e.g. `reasoning_format` for Groq
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            extra: Map::new(),
        }
    }

    pub fn groq(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new("groq", GROQ_API_BASE, model, api_key)
    }

    pub fn deepinfra(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new("deepinfra", DEEPINFRA_API_BASE, model, api_key)
    }

    pub fn openai(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_API_BASE, model, api_key)
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Factory for creating chat clients from configuration
pub struct ClientFactory;

impl ClientFactory {
    pub fn create_chat_client(config: &ProviderConfig) -> Result<Arc<dyn ChatClient>> {
        let client = OpenAIClient::new(config.api_key.clone())?
            .with_base_url(config.base_url.clone())
            .with_provider_name(config.name.clone())
            .with_extra_body(config.extra.clone());
        Ok(Arc::new(client))
    }

    /// Build an ordered fallback chain; the first entry is the primary.
    pub fn create_fallback_chain(configs: &[ProviderConfig]) -> Result<FallbackClient> {
        let routes = configs
            .iter()
            .map(|config| {
                Ok(ProviderRoute::new(
                    config.name.clone(),
                    config.model.clone(),
                    Self::create_chat_client(config)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FallbackClient::new(routes))
    }
}
