use crate::metadata::DocumentMetadata;
use crate::types::{Document, Embedding};

/// A single row-oriented record that a mutation expands into its parallel
/// `ids`/`documents`/`metadatas`/`embeddings` arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub id: String,
    pub document: Option<Document>,
    pub embedding: Option<Embedding>,
    pub metadata: Option<DocumentMetadata>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn document(mut self, document: impl Into<Document>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// A record needs an id and at least one of document or embedding.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.is_empty() {
            return Err("record id is empty".into());
        }
        if self.document.is_none() && self.embedding.is_none() {
            return Err(format!(
                "record `{}` needs a document or an embedding",
                self.id
            ));
        }
        if matches!(&self.embedding, Some(e) if e.is_empty()) {
            return Err(format!("record `{}` has an empty embedding", self.id));
        }
        Ok(())
    }
}
