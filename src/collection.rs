use std::sync::Arc;

use crate::client::Client;
use crate::embedding::EmbeddingFunction;
use crate::error::{ChromaError, Result};
use crate::meta::ApiPaths;
use crate::metadata::CollectionMetadata;
use crate::ops::{DeleteOp, GetOp, MutateOp, MutationKind, Operation, QueryOp, Validated};
use crate::transport::{Request, Transport};
use crate::types::{CollectionModel, Embeddings, GetResult, QueryResult};

/// Handle to one collection.
///
/// Every record operation runs the same pipeline: validate, check the
/// preflight limit, embed missing inputs, serialize, send. A failure at any
/// step before the send leaves the transport untouched.
pub struct Collection<T, Ef = Box<dyn EmbeddingFunction>> {
    client: Client<T>,
    model: CollectionModel,
    embedding_function: Option<Arc<Ef>>,
}

impl<T, Ef> Clone for Collection<T, Ef> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            model: self.model.clone(),
            embedding_function: self.embedding_function.clone(),
        }
    }
}

impl<T: Transport, Ef: EmbeddingFunction + 'static> Collection<T, Ef> {
    pub fn new(client: Client<T>, model: CollectionModel, embedding_function: Option<Ef>) -> Self {
        Self {
            client,
            model,
            embedding_function: embedding_function.map(Arc::new),
        }
    }

    pub fn id(&self) -> &str {
        &self.model.id
    }

    pub fn name(&self) -> &str {
        &self.model.name
    }

    pub fn metadata(&self) -> Option<&CollectionMetadata> {
        self.model.metadata.as_ref()
    }

    pub fn dimension(&self) -> Option<u32> {
        self.model.dimension
    }

    pub fn model(&self) -> &CollectionModel {
        &self.model
    }

    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    fn path(&self, action: &str) -> String {
        ApiPaths::records(
            self.client.tenant(),
            self.client.database(),
            &self.model.id,
            action,
        )
    }

    async fn check_limits<O: Operation>(&self, op: &O) -> Result<()> {
        self.client
            .preflight_gate()
            .satisfies(
                self.client.transport(),
                op.resource_operation(),
                op.batch_size(),
            )
            .await
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let ef = self.embedding_function.as_ref().ok_or_else(|| {
            ChromaError::Embedding(format!(
                "collection `{}` has no embedding function; provide embeddings or set embedding_function",
                self.model.name
            ))
        })?;
        let embeddings = ef.embed_documents(texts).await?;
        // Collections created without a dimension fall back to the function's own.
        let dimension = self
            .model
            .dimension
            .map_or_else(|| ef.dimension(), |d| d as usize);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(ChromaError::InvalidInput(format!(
                "embedding dimension {} does not match expected dimension {dimension}",
                bad.len()
            )));
        }
        Ok(embeddings)
    }

    pub async fn get(&self, op: GetOp) -> Result<GetResult> {
        let op = op.validate()?;
        self.check_limits(&*op).await?;
        let body = op.to_json()?;
        self.client.send_json(Request::post(self.path("get"), body)).await
    }

    /// Similarity query; query texts are embedded with the collection's
    /// embedding function when no query embeddings are given.
    pub async fn query(&self, op: QueryOp) -> Result<QueryResult> {
        let mut op = op.validate()?;
        self.check_limits(&*op).await?;
        if let Some(texts) = op.pending_texts().map(<[String]>::to_vec) {
            let embeddings = self.embed(&texts).await?;
            op = op.with_query_embeddings(embeddings)?;
        }
        let body = op.to_json()?;
        self.client
            .send_json(Request::post(self.path("query"), body))
            .await
    }

    /// Insert new records; the op's kind is set to add.
    pub async fn add(&self, op: MutateOp) -> Result<()> {
        self.mutate(op.with_kind(MutationKind::Add)).await
    }

    /// Insert or replace records; the op's kind is set to upsert.
    pub async fn upsert(&self, op: MutateOp) -> Result<()> {
        self.mutate(op.with_kind(MutationKind::Upsert)).await
    }

    /// Change existing records; the op's kind is set to update.
    pub async fn update(&self, op: MutateOp) -> Result<()> {
        self.mutate(op.with_kind(MutationKind::Update)).await
    }

    async fn mutate(&self, op: MutateOp) -> Result<()> {
        let kind = op.kind();
        let op = op.validate()?;
        self.check_limits(&*op).await?;
        let op = self.embed_pending(op).await?;

        tracing::debug!(
            target: "chroma::ops",
            collection = %self.model.name,
            op = kind.as_str(),
            rows = op.ids().len(),
            "sending mutation"
        );
        let body = op.to_json()?;
        self.client
            .send(Request::post(self.path(kind.as_str()), body))
            .await?;
        Ok(())
    }

    async fn embed_pending(&self, op: Validated<MutateOp>) -> Result<Validated<MutateOp>> {
        let pending = op.pending_documents();
        if pending.is_empty() {
            return Ok(op);
        }
        let (rows, texts): (Vec<usize>, Vec<String>) = pending
            .into_iter()
            .map(|(row, text)| (row, text.to_string()))
            .unzip();
        let embeddings = self.embed(&texts).await?;
        op.with_embeddings(&rows, embeddings)
    }

    pub async fn delete(&self, op: DeleteOp) -> Result<()> {
        let op = op.validate()?;
        self.check_limits(&*op).await?;
        let body = op.to_json()?;
        self.client
            .send(Request::post(self.path("delete"), body))
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        self.client.send_json(Request::get(self.path("count"))).await
    }
}
