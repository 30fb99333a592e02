use config::{Config as ConfigLoader, ConfigError, Environment, File};
use parley_llm::ProviderConfig;
use parley_persist::{Tenant, User};
use parley_tools::ProviderEndpoints;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ProviderEndpoints,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub seed: SeedConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub mongodb_uri: String,
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "parley".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub credentials_ttl_secs: u64,
    pub threads_ttl_secs: u64,
    pub usage_ttl_secs: u64,
    /// How often expired entries are purged from the in-process cache
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            credentials_ttl_secs: 12 * 60 * 60,
            threads_ttl_secs: 5 * 60,
            usage_ttl_secs: 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn credentials_ttl(&self) -> Duration {
        Duration::from_secs(self.credentials_ttl_secs)
    }

    pub fn threads_ttl(&self) -> Duration {
        Duration::from_secs(self.threads_ttl_secs)
    }

    pub fn usage_ttl(&self) -> Duration {
        Duration::from_secs(self.usage_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Fallback chain for regular turns, primary first
    pub standard: Vec<ProviderSettings>,
    /// Fallback chain for `extraReason` turns, primary first
    pub reasoning: Vec<ProviderSettings>,
}

fn default_max_steps() -> usize {
    20
}

fn default_execution_timeout() -> u64 {
    300
}

fn default_event_buffer() -> usize {
    100
}

/// One provider route. The API key is read from the environment variable
/// named by `api_key_env`, never from the file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ProviderSettings {
    pub fn resolve(&self) -> Result<ProviderConfig, ConfigError> {
        let api_key = std::env::var(&self.api_key_env).map_err(|_| {
            ConfigError::Message(format!(
                "{} environment variable is required by provider '{}'",
                self.api_key_env, self.name
            ))
        })?;
        let mut provider = ProviderConfig::new(&self.name, &self.base_url, &self.model, api_key);
        provider.extra = self.extra.clone();
        Ok(provider)
    }
}

impl LlmConfig {
    pub fn standard_chain(&self) -> Result<Vec<ProviderConfig>, ConfigError> {
        resolve_chain("standard", &self.standard)
    }

    pub fn reasoning_chain(&self) -> Result<Vec<ProviderConfig>, ConfigError> {
        resolve_chain("reasoning", &self.reasoning)
    }
}

fn resolve_chain(tier: &str, settings: &[ProviderSettings]) -> Result<Vec<ProviderConfig>, ConfigError> {
    if settings.is_empty() {
        return Err(ConfigError::Message(format!("llm.{} needs at least one provider", tier)));
    }
    settings.iter().map(ProviderSettings::resolve).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Tenants and users provisioned at startup on the memory backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub tenants: Vec<SeedTenant>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTenant {
    pub slug: String,
    pub display_name: String,
    pub message_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: Uuid,
    pub slug: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl From<&SeedTenant> for Tenant {
    fn from(seed: &SeedTenant) -> Self {
        Tenant::new(&seed.slug, &seed.display_name, seed.message_limit)
    }
}

impl From<&SeedUser> for User {
    fn from(seed: &SeedUser) -> Self {
        User {
            id: seed.id,
            slug: seed.slug.clone(),
            email: seed.email.clone(),
            display_name: seed.display_name.clone(),
            pfp_url: None,
            is_admin: seed.is_admin,
        }
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. `PARLEY_`-prefixed environment variables, `__` between sections
    ///    (e.g. `PARLEY_SERVER__PORT=8080`)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("PARLEY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let mut cfg: Config = config.try_deserialize()?;

        cfg.jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| ConfigError::Message("JWT_SECRET environment variable is required".to_string()))?;
        if cfg.store.backend == StoreBackend::Mongodb {
            cfg.mongodb_uri = std::env::var("MONGODB_URI")
                .map_err(|_| ConfigError::Message("MONGODB_URI environment variable is required".to_string()))?;
        }

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 3000

        [cors]
        enabled = true
        origins = ["http://localhost:5173"]

        [store]
        backend = "memory"

        [llm]
        max_steps = 8

        [[llm.standard]]
        name = "groq"
        base_url = "https://api.groq.com/openai/v1"
        model = "openai/gpt-oss-120b"
        api_key_env = "PARLEY_TEST_GROQ_KEY"
        extra = { reasoning_format = "parsed" }

        [[llm.reasoning]]
        name = "deepinfra"
        base_url = "https://api.deepinfra.com/v1/openai"
        model = "deepseek-ai/DeepSeek-V3.2"
        api_key_env = "PARLEY_TEST_MISSING_KEY"

        [logging]
        level = "debug"
        format = "json"

        [[seed.tenants]]
        slug = "acme"
        display_name = "Acme"
        message_limit = 500
    "#;

    #[test]
    fn test_config_structure() {
        let config: Config = toml::from_str(TOML).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.request_timeout_secs, 300);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.database, "parley");
        assert_eq!(config.llm.max_steps, 8);
        assert_eq!(config.llm.event_buffer, 100);
        assert_eq!(config.cache.credentials_ttl(), Duration::from_secs(12 * 60 * 60));
        assert_eq!(config.tools.dropbox, parley_tools::providers::DROPBOX_API_BASE);
        assert_eq!(Tenant::from(&config.seed.tenants[0]).message_limit, 500);
    }

    #[test]
    fn test_provider_key_comes_from_env() {
        let config: Config = toml::from_str(TOML).unwrap();

        std::env::set_var("PARLEY_TEST_GROQ_KEY", "gsk-test");
        let chain = config.llm.standard_chain().unwrap();
        assert_eq!(chain[0].api_key, "gsk-test");
        assert_eq!(chain[0].extra["reasoning_format"], "parsed");

        let err = config.llm.reasoning_chain().unwrap_err();
        assert!(err.to_string().contains("PARLEY_TEST_MISSING_KEY"));
    }
}
