//! Chroma Rust SDK: typed metadata and filters, validated operation builders
//! and a preflight-gated client over a pluggable transport.

pub mod client;
pub mod collection;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filters;
pub mod ids;
pub mod meta;
pub mod metadata;
pub mod ops;
pub mod preflight;
pub mod record;
pub mod transport;
pub mod types;

#[cfg(feature = "sync")]
pub mod sync;

pub use crate::client::{Client, ClientBuilder};
pub use crate::collection::Collection;
pub use crate::config::ClientConfig;
pub use crate::embedding::EmbeddingFunction;
pub use crate::error::{ChromaError, Result, ValidationError};
pub use crate::filters::{DocFilter, Filter, ScalarList, WhereOperator};
pub use crate::ids::{IdGenerator, Sha256Generator, UuidGenerator};
pub use crate::meta::{ApiPaths, CollectionNames};
pub use crate::metadata::{
    CollectionMetadata, DocumentMetadata, Int32, Int64, IntWidth, MetadataMap, ScalarValue,
};
pub use crate::ops::{
    DeleteOp, GetOp, MutateOp, MutationKind, OpBuilder, Operation, QueryOp, Validated,
};
pub use crate::preflight::{
    OperationKind, PreflightGate, PreflightLimits, Resource, ResourceOperation,
};
pub use crate::record::Record;
pub use crate::transport::{Method, Request, Transport};
pub use crate::types::{
    CollectionModel, Document, Documents, Embedding, Embeddings, GetResult, IncludeField,
    QueryResult,
};

#[cfg(feature = "http")]
pub use crate::transport::HttpTransport;

#[cfg(feature = "sync")]
pub use crate::sync::{SyncClient, SyncCollection};
