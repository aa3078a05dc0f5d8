use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use rowlink_cache::{CachePattern, QueryCache};
use rowlink_core::{Executor, QueryBuilder};
use tracing::info;
use url::Url;

use crate::config::{ClientConfig, ConfigError};
use crate::credentials::{CredentialProvider, NoCredentials, StaticToken};
use crate::dispatch::Dispatcher;
use crate::transport::{ReqwestTransport, Transport};

/// Entry point for building and running queries against one REST endpoint.
///
/// Cheap to clone; clones share the transport, credentials and cache.
///
/// ```ignore
/// let client = Client::new(ClientConfig::new("http://localhost:3000"))?;
/// let users = client
///     .from("users")
///     .select(["id", "name"])
///     .eq("active", true)
///     .limit(10)
///     .execute::<User>()
///     .await?;
/// ```
#[derive(Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    schema: Option<String>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("schema", &self.schema)
            .field("cache", &self.dispatcher.cache())
            .finish()
    }
}

impl Client {
    /// Builds a client with the default reqwest transport.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            credentials: None,
            cache: None,
        }
    }

    /// Starts a read query on `table`, bound to this client and using the
    /// configured schema.
    pub fn from(&self, table: &str) -> QueryBuilder {
        let executor: Arc<dyn Executor> = self.dispatcher.clone();
        let builder = QueryBuilder::with_executor(table, executor);
        match &self.schema {
            Some(schema) => builder.schema(schema),
            None => builder,
        }
    }

    pub fn cache(&self) -> Option<&QueryCache> {
        self.dispatcher.cache()
    }

    /// Drops cached results matching `pattern`. Returns 0 without a cache.
    pub fn invalidate(&self, pattern: &CachePattern) -> usize {
        self.cache().map_or(0, |cache| cache.invalidate(pattern))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// Assembles a [`Client`] with non-default collaborators.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    cache: Option<QueryCache>,
}

impl ClientBuilder {
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the bearer token derived from `api_key`.
    pub fn credentials(mut self, provider: impl CredentialProvider) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Uses an existing cache instead of creating one from the config.
    pub fn cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Client, ConfigError> {
        let config = self.config;
        let base_url = Url::parse(&config.url).map_err(|e| ConfigError::Invalid {
            key: "rowlink.url".to_string(),
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                key: "rowlink.url".to_string(),
                message: "not a base URL".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            headers.insert("apikey", header_value("rowlink.api_key", key)?);
        }
        for (name, value) in &config.headers {
            let key = format!("rowlink.headers.{name}");
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::Invalid {
                    key: key.clone(),
                    message: e.to_string(),
                }
            })?;
            headers.insert(header, header_value(&key, value)?);
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let credentials: Arc<dyn CredentialProvider> = match (self.credentials, &config.api_key) {
            (Some(provider), _) => provider,
            (None, Some(key)) => Arc::new(StaticToken::new(key)),
            (None, None) => Arc::new(NoCredentials),
        };
        let cache = self.cache.or_else(|| config.cache.clone().map(QueryCache::new));

        info!(
            url = %base_url,
            schema = config.schema.as_deref().unwrap_or("default"),
            cache = cache.is_some(),
            "rowlink client ready"
        );

        let mut dispatcher = Dispatcher::new(base_url, transport, credentials)
            .with_default_headers(headers)
            .with_default_timeout(config.timeout);
        if let Some(cache) = cache {
            dispatcher = dispatcher.with_cache(cache);
        }

        Ok(Client {
            dispatcher: Arc::new(dispatcher),
            schema: config.schema,
        })
    }
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}
