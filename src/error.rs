use thiserror::Error;

use crate::preflight::{OperationKind, Resource};

/// Common result type used across the SDK.
pub type Result<T> = std::result::Result<T, ChromaError>;

/// Unified error enum surfaced by all public APIs.
#[derive(Error, Debug)]
pub enum ChromaError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A raw JSON value matched none of the scalar variants.
    #[error("failed to decode value for key `{key}`: {reason}")]
    Decode { key: String, reason: String },
    /// A filter node was built with an operand of the wrong shape.
    #[error("invalid filter construction: {0}")]
    Construction(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(
        "{resource} {operation} limit exceeded: expected fewer than {limit} items but got {observed}"
    )]
    LimitExceeded {
        resource: Resource,
        operation: OperationKind,
        limit: usize,
        observed: usize,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChromaError {
    pub(crate) fn decode(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ChromaError::Decode {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Structural invariant violations detected before an operation is sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("limit must be greater than 0")]
    InvalidLimit,
    #[error("offset must be greater than or equal to 0")]
    InvalidOffset,
    #[error("n_results must be greater than 0")]
    InvalidNResults,
    #[error("at least one include option is required")]
    EmptyInclude,
    #[error("include `{0}` is not supported for get")]
    UnsupportedInclude(&'static str),
    #[error("at least one query embedding or query text is required")]
    MissingQuery,
    #[error("query embeddings and query texts are mutually exclusive")]
    AmbiguousQuery,
    #[error("at least one {0} is required")]
    EmptyOption(&'static str),
    #[error("at least one id or record is required")]
    MissingIds,
    #[error("duplicate id found: {0}")]
    DuplicateId(String),
    #[error("{field} ({actual}) must match the number of ids ({expected})")]
    LengthMismatch {
        field: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },
    #[error("nothing to {0}: provide documents, embeddings or metadatas")]
    EmptyPayload(&'static str),
    #[error("documents or embeddings are required for every record to add")]
    MissingContent,
    #[error("at least one filter is required: ids, where or where_document")]
    MissingDeleteFilter,
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid collection name: {0}")]
    InvalidCollectionName(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ChromaError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => ChromaError::Http {
                status: status.as_u16(),
                body: value.to_string(),
            },
            None => ChromaError::Connection(value.to_string()),
        }
    }
}
