use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::config::ClientConfig;
use crate::embedding::EmbeddingFunction;
use crate::error::{ChromaError, Result};
use crate::meta::{ApiPaths, CollectionNames};
use crate::metadata::CollectionMetadata;
use crate::preflight::{PreflightGate, PreflightLimits};
use crate::transport::{Request, Transport};
use crate::types::CollectionModel;

#[cfg(feature = "http")]
use crate::transport::HttpTransport;

/// Builder for configuring and constructing a [`Client`].
///
/// Mirrors the [`ClientConfig`] fields; finish with [`ClientBuilder::build`]
/// for the HTTP transport or [`ClientBuilder::build_with`] for any other.
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
}

struct Inner<T> {
    transport: T,
    config: ClientConfig,
    gate: PreflightGate,
}

/// Client for one tenant/database on a Chroma server.
///
/// Cloning is cheap; clones share the transport and the preflight cache.
pub struct Client<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(feature = "http")]
impl Client<HttpTransport> {
    /// Build a client from a `ClientConfig` using the HTTP transport.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(transport, config))
    }

    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env()?;
        Self::from_config(config)
    }
}

impl Client<()> {
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }
}

#[derive(Deserialize)]
struct Heartbeat {
    #[serde(rename = "nanosecond heartbeat")]
    nanos: u64,
}

#[derive(Serialize)]
struct CreateCollectionBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a CollectionMetadata>,
    get_or_create: bool,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                gate: PreflightGate::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn tenant(&self) -> &str {
        &self.inner.config.tenant
    }

    pub fn database(&self) -> &str {
        &self.inner.config.database
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn preflight_gate(&self) -> &PreflightGate {
        &self.inner.gate
    }

    pub(crate) async fn send(&self, request: Request) -> Result<Vec<u8>> {
        self.inner.transport.send(request).await
    }

    pub(crate) async fn send_json<R: DeserializeOwned>(&self, request: Request) -> Result<R> {
        let body = self.send(request).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Server heartbeat in nanoseconds.
    pub async fn heartbeat(&self) -> Result<u64> {
        let beat: Heartbeat = self.send_json(Request::get(ApiPaths::HEARTBEAT)).await?;
        Ok(beat.nanos)
    }

    pub async fn version(&self) -> Result<String> {
        self.send_json(Request::get(ApiPaths::VERSION)).await
    }

    /// Fetch (once) and return the server's batch limits.
    pub async fn preflight(&self) -> Result<PreflightLimits> {
        let limits = self.inner.gate.ensure(&self.inner.transport).await?;
        Ok(limits.clone())
    }

    pub async fn create_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
        embedding_function: Option<Ef>,
    ) -> Result<Collection<T, Ef>> {
        self.create_collection_impl(name, metadata, embedding_function, false)
            .await
    }

    /// Convenience: get if exists, else create.
    pub async fn get_or_create_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
        embedding_function: Option<Ef>,
    ) -> Result<Collection<T, Ef>> {
        self.create_collection_impl(name, metadata, embedding_function, true)
            .await
    }

    async fn create_collection_impl<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
        embedding_function: Option<Ef>,
        get_or_create: bool,
    ) -> Result<Collection<T, Ef>> {
        CollectionNames::validate(name)?;
        let body = serde_json::to_vec(&CreateCollectionBody {
            name,
            metadata: metadata.as_ref(),
            get_or_create,
        })?;
        let path = ApiPaths::collections(self.tenant(), self.database());
        let model: CollectionModel = self.send_json(Request::post(path, body)).await?;
        tracing::debug!(target: "chroma::ops", collection = %model.name, id = %model.id, "collection ready");
        Ok(Collection::new(self.clone(), model, embedding_function))
    }

    pub async fn get_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        embedding_function: Option<Ef>,
    ) -> Result<Collection<T, Ef>> {
        CollectionNames::validate(name)?;
        let path = ApiPaths::collection(self.tenant(), self.database(), name);
        let model: CollectionModel = match self.send_json(Request::get(path)).await {
            Ok(model) => model,
            Err(ChromaError::NotFound(_)) => {
                return Err(ChromaError::NotFound(format!(
                    "collection not found: {name}"
                )));
            }
            Err(err) => return Err(err),
        };
        Ok(Collection::new(self.clone(), model, embedding_function))
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        CollectionNames::validate(name)?;
        let path = ApiPaths::collection(self.tenant(), self.database(), name);
        self.send(Request::delete(path)).await?;
        Ok(())
    }

    pub async fn list_collections(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<CollectionModel>> {
        let mut path = ApiPaths::collections(self.tenant(), self.database());
        let params: Vec<String> = [("limit", limit), ("offset", offset)]
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| format!("{key}={v}")))
            .collect();
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }
        self.send_json(Request::get(path)).await
    }

    pub async fn count_collections(&self) -> Result<usize> {
        let path = ApiPaths::collections_count(self.tenant(), self.database());
        self.send_json(Request::get(path)).await
    }
}

impl ClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
        }
    }

    /// Populate the builder from `CHROMA_*` environment variables using
    /// [`ClientConfig::from_env`]. Individual fields can still be overridden
    /// afterwards via the other builder methods.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config: ClientConfig::from_env()?,
        })
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.config.tenant = tenant.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.set_token(token);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build a [`Client`] over a caller-supplied transport.
    pub fn build_with<T: Transport>(self, transport: T) -> Result<Client<T>> {
        self.config.validate()?;
        Ok(Client::new(transport, self.config))
    }

    /// Build a [`Client`] over the HTTP transport.
    #[cfg(feature = "http")]
    pub fn build(self) -> Result<Client<HttpTransport>> {
        Client::from_config(self.config)
    }
}
