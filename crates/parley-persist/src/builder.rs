use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheClient, MemoryCache};
use crate::client::{CacheTtls, PersistClient};
use crate::error::{PersistError, Result};
use crate::trait_client::PersistenceClient;

pub struct PersistClientBuilder {
    store: Option<Arc<dyn PersistenceClient>>,
    mongodb_uri: Option<String>,
    database: Option<String>,
    cache: Option<Arc<dyn CacheClient>>,
    ttls: CacheTtls,
}

impl PersistClientBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            mongodb_uri: None,
            database: None,
            cache: None,
            ttls: CacheTtls::default(),
        }
    }

    /// Use an already constructed store (takes precedence over MongoDB settings).
    pub fn store(mut self, store: Arc<dyn PersistenceClient>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn mongodb_uri(mut self, uri: impl Into<String>) -> Self {
        self.mongodb_uri = Some(uri.into());
        self
    }

    pub fn database(mut self, db: impl Into<String>) -> Self {
        self.database = Some(db.into());
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn credentials_ttl(mut self, ttl: Duration) -> Self {
        self.ttls.credentials = ttl;
        self
    }

    pub fn threads_ttl(mut self, ttl: Duration) -> Self {
        self.ttls.threads = ttl;
        self
    }

    pub fn usage_ttl(mut self, ttl: Duration) -> Self {
        self.ttls.usage = ttl;
        self
    }

    pub async fn build(self) -> Result<PersistClient> {
        let store = match self.store {
            Some(store) => store,
            None => Self::connect(self.mongodb_uri, self.database).await?,
        };
        let cache: Arc<dyn CacheClient> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryCache::new()),
        };

        Ok(PersistClient::new(store, cache, self.ttls))
    }

    #[cfg(feature = "mongodb")]
    async fn connect(uri: Option<String>, database: Option<String>) -> Result<Arc<dyn PersistenceClient>> {
        let uri = uri.ok_or_else(|| PersistError::Internal("mongodb_uri is required".to_string()))?;
        let database = database.ok_or_else(|| PersistError::Internal("database is required".to_string()))?;
        let client = crate::dbs::mongo::MongoPersistenceClient::connect(&uri, &database).await?;
        client.ensure_schema().await?;
        Ok(Arc::new(client))
    }

    #[cfg(not(feature = "mongodb"))]
    async fn connect(_uri: Option<String>, _database: Option<String>) -> Result<Arc<dyn PersistenceClient>> {
        Err(PersistError::Internal(
            "no store configured and the mongodb feature is disabled".to_string(),
        ))
    }
}

impl Default for PersistClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
