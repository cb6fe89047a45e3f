use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::{CollectionMetadata, DocumentMetadata};

pub type Document = String;
pub type Documents = Vec<Document>;
pub type Embedding = Vec<f32>;
pub type Embeddings = Vec<Embedding>;

/// Selects which fields to include in query/get responses. Ids are always
/// returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeField {
    Documents,
    Metadatas,
    Embeddings,
    Distances,
    Uris,
}

impl IncludeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncludeField::Documents => "documents",
            IncludeField::Metadatas => "metadatas",
            IncludeField::Embeddings => "embeddings",
            IncludeField::Distances => "distances",
            IncludeField::Uris => "uris",
        }
    }
}

impl fmt::Display for IncludeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result shape for similarity queries: one inner list per query input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<Document>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<DocumentMetadata>>>>,
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<Embedding>>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub uris: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub include: Vec<IncludeField>,
}

/// Result shape for get calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    pub ids: Vec<String>,
    #[serde(default)]
    pub documents: Option<Vec<Option<Document>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Option<DocumentMetadata>>>,
    #[serde(default)]
    pub embeddings: Option<Vec<Embedding>>,
    #[serde(default)]
    pub uris: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub include: Vec<IncludeField>,
}

impl GetResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Collection description returned by the collection endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Option<CollectionMetadata>,
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}
