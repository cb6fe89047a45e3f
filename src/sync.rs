use std::sync::Arc;

use crate::client::Client;
use crate::collection::Collection;
use crate::embedding::EmbeddingFunction;
use crate::error::{ChromaError, Result};
use crate::metadata::CollectionMetadata;
use crate::ops::{DeleteOp, GetOp, MutateOp, QueryOp};
use crate::preflight::PreflightLimits;
use crate::transport::Transport;
use crate::types::{CollectionModel, GetResult, QueryResult};

#[cfg(feature = "http")]
use crate::client::ClientBuilder;
#[cfg(feature = "http")]
use crate::config::ClientConfig;
#[cfg(feature = "http")]
use crate::transport::HttpTransport;

/// Shared inner state for synchronous wrappers.
///
/// Holds a Tokio runtime and the underlying async `Client`.
struct Inner<T> {
    rt: tokio::runtime::Runtime,
    client: Client<T>,
}

/// Blocking/synchronous wrapper around [`Client`].
///
/// This type is only available when the `sync` feature is enabled. It runs all
/// operations on an internal Tokio runtime using `block_on`.
///
/// Note: do not call these blocking APIs from within an existing Tokio runtime,
/// as that can lead to deadlocks. In async contexts, use the async
/// [`Client`] APIs directly instead.
pub struct SyncClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SyncClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| ChromaError::Other(anyhow::Error::new(e)))
}

#[cfg(feature = "http")]
impl SyncClient<HttpTransport> {
    /// Build a synchronous client from a [`ClientConfig`].
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Self::new(Client::from_config(config)?)
    }

    /// Build a synchronous client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Client::from_env()?)
    }

    /// Build a synchronous client from a configured [`ClientBuilder`].
    pub fn from_builder(builder: ClientBuilder) -> Result<Self> {
        Self::new(builder.build()?)
    }
}

impl<T: Transport> SyncClient<T> {
    /// Wrap an async client with a dedicated runtime.
    pub fn new(client: Client<T>) -> Result<Self> {
        let rt = runtime()?;
        Ok(Self {
            inner: Arc::new(Inner { rt, client }),
        })
    }

    pub fn client(&self) -> &Client<T> {
        &self.inner.client
    }

    pub fn heartbeat(&self) -> Result<u64> {
        self.inner.rt.block_on(self.inner.client.heartbeat())
    }

    pub fn version(&self) -> Result<String> {
        self.inner.rt.block_on(self.inner.client.version())
    }

    pub fn preflight(&self) -> Result<PreflightLimits> {
        self.inner.rt.block_on(self.inner.client.preflight())
    }

    // Collection management

    pub fn create_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
        embedding_function: Option<Ef>,
    ) -> Result<SyncCollection<T, Ef>> {
        let collection = self.inner.rt.block_on(self.inner.client.create_collection(
            name,
            metadata,
            embedding_function,
        ))?;
        Ok(self.wrap(collection))
    }

    pub fn get_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        embedding_function: Option<Ef>,
    ) -> Result<SyncCollection<T, Ef>> {
        let collection = self
            .inner
            .rt
            .block_on(self.inner.client.get_collection(name, embedding_function))?;
        Ok(self.wrap(collection))
    }

    pub fn get_or_create_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
        embedding_function: Option<Ef>,
    ) -> Result<SyncCollection<T, Ef>> {
        let collection = self.inner.rt.block_on(
            self.inner
                .client
                .get_or_create_collection(name, metadata, embedding_function),
        )?;
        Ok(self.wrap(collection))
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner
            .rt
            .block_on(self.inner.client.delete_collection(name))
    }

    pub fn list_collections(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<CollectionModel>> {
        self.inner
            .rt
            .block_on(self.inner.client.list_collections(limit, offset))
    }

    pub fn count_collections(&self) -> Result<usize> {
        self.inner.rt.block_on(self.inner.client.count_collections())
    }

    fn wrap<Ef>(&self, collection: Collection<T, Ef>) -> SyncCollection<T, Ef> {
        SyncCollection {
            inner: Arc::clone(&self.inner),
            collection,
        }
    }
}

/// Blocking/synchronous wrapper around [`Collection`].
pub struct SyncCollection<T, Ef = Box<dyn EmbeddingFunction>> {
    inner: Arc<Inner<T>>,
    collection: Collection<T, Ef>,
}

impl<T, Ef> Clone for SyncCollection<T, Ef> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            collection: self.collection.clone(),
        }
    }
}

impl<T: Transport, Ef: EmbeddingFunction + 'static> SyncCollection<T, Ef> {
    pub fn id(&self) -> &str {
        self.collection.id()
    }

    pub fn name(&self) -> &str {
        self.collection.name()
    }

    pub fn metadata(&self) -> Option<&CollectionMetadata> {
        self.collection.metadata()
    }

    pub fn get(&self, op: GetOp) -> Result<GetResult> {
        self.inner.rt.block_on(self.collection.get(op))
    }

    pub fn query(&self, op: QueryOp) -> Result<QueryResult> {
        self.inner.rt.block_on(self.collection.query(op))
    }

    pub fn add(&self, op: MutateOp) -> Result<()> {
        self.inner.rt.block_on(self.collection.add(op))
    }

    pub fn upsert(&self, op: MutateOp) -> Result<()> {
        self.inner.rt.block_on(self.collection.upsert(op))
    }

    pub fn update(&self, op: MutateOp) -> Result<()> {
        self.inner.rt.block_on(self.collection.update(op))
    }

    pub fn delete(&self, op: DeleteOp) -> Result<()> {
        self.inner.rt.block_on(self.collection.delete(op))
    }

    pub fn count(&self) -> Result<usize> {
        self.inner.rt.block_on(self.collection.count())
    }
}
