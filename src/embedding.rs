use async_trait::async_trait;

use crate::error::Result;
use crate::types::Embeddings;

/// Embedding generation abstraction to allow custom models.
///
/// Collections call it for documents and query texts that arrive without
/// embeddings.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings>;
    fn dimension(&self) -> usize;
}

/// Convenience impl so that `Box<dyn EmbeddingFunction>` can be used
/// as the generic parameter for `Collection<T, Ef>`.
#[async_trait]
impl EmbeddingFunction for Box<dyn EmbeddingFunction> {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings> {
        (**self).embed_documents(docs).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}
