//! Get / Query / Add / Upsert / Update / Delete operations.
//!
//! Each operation is assembled through an [`OpBuilder`]: setters run in call
//! order and the first failing setter short-circuits the rest. A built
//! operation must then pass `validate()`, which yields a [`Validated`] wrapper;
//! only the wrapper can be serialized into a request body.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ChromaError, Result, ValidationError};
use crate::filters::{DocFilter, Filter};
use crate::ids::IdGenerator;
use crate::metadata::DocumentMetadata;
use crate::preflight::{OperationKind, ResourceOperation};
use crate::record::Record;
use crate::types::{Document, Embedding, IncludeField};

pub const DEFAULT_N_RESULTS: i64 = 10;

fn default_get_include() -> Vec<IncludeField> {
    vec![IncludeField::Documents, IncludeField::Metadatas]
}

fn default_query_include() -> Vec<IncludeField> {
    vec![
        IncludeField::Documents,
        IncludeField::Metadatas,
        IncludeField::Distances,
    ]
}

fn default_n_results() -> i64 {
    DEFAULT_N_RESULTS
}

/// An operation that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Validated<T>(T);

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Validated<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Validated<T>
where
    Validated<T>: Serialize,
{
    /// Request body bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn to_json_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// What every operation reports to the preflight gate.
pub trait Operation {
    fn resource_operation(&self) -> ResourceOperation;

    /// Count compared against the preflight limit.
    fn batch_size(&self) -> usize;
}

/// `where` / `where_document` fragment shared by get, query and delete.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterFragment {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_meta: Option<Filter>,
    #[serde(rename = "where_document", default, skip_serializing_if = "Option::is_none")]
    pub where_doc: Option<DocFilter>,
}

impl FilterFragment {
    pub fn is_empty(&self) -> bool {
        self.where_meta.is_none() && self.where_doc.is_none()
    }

    fn validate(&self) -> Result<()> {
        if let Some(filter) = &self.where_meta {
            filter.validate()?;
        }
        if let Some(filter) = &self.where_doc {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Operations that accept `where` / `where_document`.
pub trait FilterFragmentOp {
    fn filters_mut(&mut self) -> &mut FilterFragment;
}

/// Operations that accept an id restriction.
pub trait IdFragmentOp {
    fn ids_mut(&mut self) -> &mut Vec<String>;
}

/// Accumulates setter calls for an operation of type `T`.
#[derive(Debug)]
pub struct OpBuilder<T> {
    op: T,
    error: Option<ChromaError>,
}

impl<T> OpBuilder<T> {
    fn new(op: T) -> Self {
        Self { op, error: None }
    }

    fn apply(mut self, f: impl FnOnce(&mut T) -> Result<()>) -> Self {
        if self.error.is_none() {
            if let Err(err) = f(&mut self.op) {
                tracing::debug!(target: "chroma::ops", error = %err, "builder option rejected");
                self.error = Some(err);
            }
        }
        self
    }

    /// The assembled operation, or the first setter error.
    pub fn build(self) -> Result<T> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.op),
        }
    }
}

impl<T: FilterFragmentOp> OpBuilder<T> {
    pub fn where_meta(self, filter: Filter) -> Self {
        self.apply(|op| {
            op.filters_mut().where_meta = Some(filter);
            Ok(())
        })
    }

    pub fn where_doc(self, filter: DocFilter) -> Self {
        self.apply(|op| {
            op.filters_mut().where_doc = Some(filter);
            Ok(())
        })
    }
}

impl<T: IdFragmentOp> OpBuilder<T> {
    /// Append ids; an empty list is rejected.
    pub fn ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(|op| {
            let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
            if ids.is_empty() {
                return Err(ValidationError::EmptyOption("id").into());
            }
            op.ids_mut().extend(ids);
            Ok(())
        })
    }
}

fn non_empty<T>(items: Vec<T>, what: &'static str) -> Result<Vec<T>> {
    if items.is_empty() {
        return Err(ValidationError::EmptyOption(what).into());
    }
    Ok(items)
}

fn rejected<T>(op: &'static str, err: ChromaError) -> Result<T> {
    tracing::debug!(target: "chroma::ops", op, error = %err, "operation failed validation");
    Err(err)
}

// ---------------------------------------------------------------------------
// Get

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GetOp {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(flatten)]
    filters: FilterFragment,
    #[serde(default = "default_get_include")]
    include: Vec<IncludeField>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

impl Default for GetOp {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            filters: FilterFragment::default(),
            include: default_get_include(),
            limit: None,
            offset: None,
        }
    }
}

impl GetOp {
    pub fn builder() -> OpBuilder<GetOp> {
        OpBuilder::new(Self::default())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn filters(&self) -> &FilterFragment {
        &self.filters
    }

    pub fn include(&self) -> &[IncludeField] {
        &self.include
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn validate(self) -> Result<Validated<Self>> {
        match self.check() {
            Ok(()) => Ok(Validated(self)),
            Err(err) => rejected("get", err),
        }
    }

    fn check(&self) -> Result<()> {
        if matches!(self.limit, Some(limit) if limit <= 0) {
            return Err(ValidationError::InvalidLimit.into());
        }
        if matches!(self.offset, Some(offset) if offset < 0) {
            return Err(ValidationError::InvalidOffset.into());
        }
        if self.include.is_empty() {
            return Err(ValidationError::EmptyInclude.into());
        }
        if self.include.contains(&IncludeField::Distances) {
            return Err(ValidationError::UnsupportedInclude(IncludeField::Distances.as_str()).into());
        }
        self.filters.validate()
    }
}

impl OpBuilder<GetOp> {
    /// Replace the projection.
    pub fn include(self, fields: impl IntoIterator<Item = IncludeField>) -> Self {
        self.apply(|op| {
            op.include = fields.into_iter().collect();
            Ok(())
        })
    }

    pub fn limit(self, limit: i64) -> Self {
        self.apply(|op| {
            op.limit = Some(limit);
            Ok(())
        })
    }

    pub fn offset(self, offset: i64) -> Self {
        self.apply(|op| {
            op.offset = Some(offset);
            Ok(())
        })
    }
}

impl FilterFragmentOp for GetOp {
    fn filters_mut(&mut self) -> &mut FilterFragment {
        &mut self.filters
    }
}

impl IdFragmentOp for GetOp {
    fn ids_mut(&mut self) -> &mut Vec<String> {
        &mut self.ids
    }
}

impl Operation for GetOp {
    fn resource_operation(&self) -> ResourceOperation {
        ResourceOperation::collection(OperationKind::Read)
    }

    fn batch_size(&self) -> usize {
        self.ids.len()
    }
}

#[derive(Serialize)]
struct GetWire<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    ids: &'a [String],
    #[serde(flatten)]
    filters: &'a FilterFragment,
    include: &'a [IncludeField],
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
}

impl Serialize for Validated<GetOp> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        GetWire {
            ids: &self.0.ids,
            filters: &self.0.filters,
            include: &self.0.include,
            limit: self.0.limit,
            offset: self.0.offset,
        }
        .serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Query

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QueryOp {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(flatten)]
    filters: FilterFragment,
    #[serde(default)]
    query_embeddings: Vec<Embedding>,
    #[serde(default)]
    query_texts: Vec<String>,
    #[serde(default = "default_n_results")]
    n_results: i64,
    #[serde(default = "default_query_include")]
    include: Vec<IncludeField>,
}

impl Default for QueryOp {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            filters: FilterFragment::default(),
            query_embeddings: Vec::new(),
            query_texts: Vec::new(),
            n_results: DEFAULT_N_RESULTS,
            include: default_query_include(),
        }
    }
}

impl QueryOp {
    pub fn builder() -> OpBuilder<QueryOp> {
        OpBuilder::new(Self::default())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn filters(&self) -> &FilterFragment {
        &self.filters
    }

    pub fn query_embeddings(&self) -> &[Embedding] {
        &self.query_embeddings
    }

    pub fn query_texts(&self) -> &[String] {
        &self.query_texts
    }

    pub fn n_results(&self) -> i64 {
        self.n_results
    }

    pub fn include(&self) -> &[IncludeField] {
        &self.include
    }

    pub fn validate(self) -> Result<Validated<Self>> {
        match self.check() {
            Ok(()) => Ok(Validated(self)),
            Err(err) => rejected("query", err),
        }
    }

    fn check(&self) -> Result<()> {
        if self.query_embeddings.is_empty() && self.query_texts.is_empty() {
            return Err(ValidationError::MissingQuery.into());
        }
        if !self.query_embeddings.is_empty() && !self.query_texts.is_empty() {
            return Err(ValidationError::AmbiguousQuery.into());
        }
        if self.n_results <= 0 {
            return Err(ValidationError::InvalidNResults.into());
        }
        if self.include.is_empty() {
            return Err(ValidationError::EmptyInclude.into());
        }
        self.filters.validate()
    }
}

impl Validated<QueryOp> {
    /// Texts still waiting for embeddings; `None` once embeddings are present.
    pub fn pending_texts(&self) -> Option<&[String]> {
        if self.0.query_embeddings.is_empty() {
            Some(&self.0.query_texts)
        } else {
            None
        }
    }

    /// Supply the embeddings computed for [`Self::pending_texts`].
    pub fn with_query_embeddings(mut self, embeddings: Vec<Embedding>) -> Result<Self> {
        if embeddings.len() != self.0.query_texts.len() {
            return Err(ChromaError::Embedding(format!(
                "embedding function returned {} embeddings for {} query texts",
                embeddings.len(),
                self.0.query_texts.len()
            )));
        }
        self.0.query_embeddings = embeddings;
        Ok(self)
    }
}

impl OpBuilder<QueryOp> {
    pub fn query_texts<I, S>(self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(|op| {
            let texts = non_empty(texts.into_iter().map(Into::into).collect(), "query text")?;
            op.query_texts.extend(texts);
            Ok(())
        })
    }

    pub fn query_embeddings(self, embeddings: Vec<Embedding>) -> Self {
        self.apply(|op| {
            op.query_embeddings.extend(non_empty(embeddings, "query embedding")?);
            Ok(())
        })
    }

    pub fn n_results(self, n_results: i64) -> Self {
        self.apply(|op| {
            op.n_results = n_results;
            Ok(())
        })
    }

    /// Replace the projection.
    pub fn include(self, fields: impl IntoIterator<Item = IncludeField>) -> Self {
        self.apply(|op| {
            op.include = fields.into_iter().collect();
            Ok(())
        })
    }
}

impl FilterFragmentOp for QueryOp {
    fn filters_mut(&mut self) -> &mut FilterFragment {
        &mut self.filters
    }
}

impl IdFragmentOp for QueryOp {
    fn ids_mut(&mut self) -> &mut Vec<String> {
        &mut self.ids
    }
}

impl Operation for QueryOp {
    fn resource_operation(&self) -> ResourceOperation {
        ResourceOperation::collection(OperationKind::Query)
    }

    fn batch_size(&self) -> usize {
        self.query_embeddings.len().max(self.query_texts.len())
    }
}

#[derive(Serialize)]
struct QueryWire<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    ids: &'a [String],
    #[serde(flatten)]
    filters: &'a FilterFragment,
    query_embeddings: &'a [Embedding],
    n_results: i64,
    include: &'a [IncludeField],
}

impl Serialize for Validated<QueryOp> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.query_embeddings.is_empty() {
            return Err(S::Error::custom(
                "query texts must be embedded before the query is sent",
            ));
        }
        QueryWire {
            ids: &self.0.ids,
            filters: &self.0.filters,
            query_embeddings: &self.0.query_embeddings,
            n_results: self.0.n_results,
            include: &self.0.include,
        }
        .serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Add / Upsert / Update

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MutationKind {
    #[default]
    Add,
    Upsert,
    Update,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Add => "add",
            MutationKind::Upsert => "upsert",
            MutationKind::Update => "update",
        }
    }

    pub fn operation(&self) -> OperationKind {
        match self {
            MutationKind::Add | MutationKind::Upsert => OperationKind::Create,
            MutationKind::Update => OperationKind::Update,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Id generator slot; compared by identity.
#[derive(Clone, Default)]
struct IdSource(Option<Arc<dyn IdGenerator>>);

impl fmt::Debug for IdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("IdSource(generator)"),
            None => f.write_str("IdSource(none)"),
        }
    }
}

impl PartialEq for IdSource {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Payload of add, upsert and update: index-aligned parallel arrays plus
/// records that are expanded into them during validation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct MutateOp {
    #[serde(skip)]
    kind: MutationKind,
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<Document>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<DocumentMetadata>>>,
    #[serde(default)]
    embeddings: Option<Vec<Option<Embedding>>>,
    #[serde(skip)]
    records: Vec<Record>,
    #[serde(skip)]
    id_source: IdSource,
}

impl MutateOp {
    pub fn builder(kind: MutationKind) -> OpBuilder<MutateOp> {
        OpBuilder::new(Self {
            kind,
            ..Self::default()
        })
    }

    /// Kind of a deserialized op defaults to `Add`.
    pub fn with_kind(mut self, kind: MutationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn documents(&self) -> Option<&[Option<Document>]> {
        self.documents.as_deref()
    }

    pub fn metadatas(&self) -> Option<&[Option<DocumentMetadata>]> {
        self.metadatas.as_deref()
    }

    pub fn embeddings(&self) -> Option<&[Option<Embedding>]> {
        self.embeddings.as_deref()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn validate(mut self) -> Result<Validated<Self>> {
        match self.prepare() {
            Ok(()) => Ok(Validated(self)),
            Err(err) => rejected(self.kind.as_str(), err),
        }
    }

    fn row_count(&self) -> usize {
        let docs = self.documents.as_ref().map_or(0, Vec::len);
        let embs = self.embeddings.as_ref().map_or(0, Vec::len);
        docs.max(embs)
    }

    fn prepare(&mut self) -> Result<()> {
        // An empty parallel array carries nothing; treat it as absent.
        if self.documents.as_ref().is_some_and(Vec::is_empty) {
            self.documents = None;
        }
        if self.metadatas.as_ref().is_some_and(Vec::is_empty) {
            self.metadatas = None;
        }
        if self.embeddings.as_ref().is_some_and(Vec::is_empty) {
            self.embeddings = None;
        }

        if self.ids.is_empty() && self.kind != MutationKind::Update {
            if let Some(generator) = self.id_source.0.clone() {
                let rows = self.row_count();
                self.ids = (0..rows)
                    .map(|i| {
                        let document = self
                            .documents
                            .as_ref()
                            .and_then(|docs| docs.get(i))
                            .and_then(|doc| doc.as_deref());
                        generator.generate(document)
                    })
                    .collect();
            }
        }

        if self.ids.is_empty() && self.records.is_empty() {
            return Err(ValidationError::MissingIds.into());
        }

        let expected = self.ids.len();
        check_len("documents", self.documents.as_ref().map(Vec::len), expected)?;
        check_len("metadatas", self.metadatas.as_ref().map(Vec::len), expected)?;
        check_len("embeddings", self.embeddings.as_ref().map(Vec::len), expected)?;

        self.expand_records()?;

        let mut seen = HashSet::with_capacity(self.ids.len());
        for (index, id) in self.ids.iter().enumerate() {
            if id.is_empty() {
                return Err(ValidationError::InvalidRecord {
                    index,
                    reason: "id is empty".into(),
                }
                .into());
            }
            if !seen.insert(id.as_str()) {
                return Err(ValidationError::DuplicateId(id.clone()).into());
            }
        }

        match self.kind {
            MutationKind::Add => {
                for index in 0..self.ids.len() {
                    if !self.has_content(index) {
                        return Err(ValidationError::MissingContent.into());
                    }
                }
            }
            MutationKind::Upsert | MutationKind::Update => {
                if self.documents.is_none() && self.metadatas.is_none() && self.embeddings.is_none()
                {
                    return Err(ValidationError::EmptyPayload(self.kind.as_str()).into());
                }
            }
        }
        Ok(())
    }

    fn has_content(&self, index: usize) -> bool {
        let document = self
            .documents
            .as_ref()
            .is_some_and(|docs| matches!(docs.get(index), Some(Some(_))));
        let embedding = self
            .embeddings
            .as_ref()
            .is_some_and(|embs| matches!(embs.get(index), Some(Some(_))));
        document || embedding
    }

    /// Move records into the parallel arrays, padding arrays that only some
    /// rows populate with `None`.
    fn expand_records(&mut self) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.records);
        for (index, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|reason| ValidationError::InvalidRecord { index, reason })?;
        }

        let prior = self.ids.len();
        let any_document = records.iter().any(|r| r.document.is_some());
        let any_metadata = records.iter().any(|r| r.metadata.is_some());
        let any_embedding = records.iter().any(|r| r.embedding.is_some());
        if any_document {
            self.documents.get_or_insert_with(|| vec![None; prior]);
        }
        if any_metadata {
            self.metadatas.get_or_insert_with(|| vec![None; prior]);
        }
        if any_embedding {
            self.embeddings.get_or_insert_with(|| vec![None; prior]);
        }

        for record in records {
            self.ids.push(record.id);
            if let Some(documents) = self.documents.as_mut() {
                documents.push(record.document);
            }
            if let Some(metadatas) = self.metadatas.as_mut() {
                metadatas.push(record.metadata);
            }
            if let Some(embeddings) = self.embeddings.as_mut() {
                embeddings.push(record.embedding);
            }
        }
        Ok(())
    }
}

fn check_len(field: &'static str, actual: Option<usize>, expected: usize) -> Result<()> {
    match actual {
        Some(actual) if actual != expected => Err(ValidationError::LengthMismatch {
            field,
            actual,
            expected,
        }
        .into()),
        _ => Ok(()),
    }
}

impl Validated<MutateOp> {
    /// Rows that carry a document but no embedding, with their text.
    pub fn pending_documents(&self) -> Vec<(usize, &str)> {
        let Some(documents) = self.0.documents.as_ref() else {
            return Vec::new();
        };
        documents
            .iter()
            .enumerate()
            .filter_map(|(index, doc)| {
                let missing = self
                    .0
                    .embeddings
                    .as_ref()
                    .is_none_or(|embs| matches!(embs.get(index), Some(None) | None));
                match (doc, missing) {
                    (Some(text), true) => Some((index, text.as_str())),
                    _ => None,
                }
            })
            .collect()
    }

    /// Fill the rows reported by [`Self::pending_documents`].
    pub fn with_embeddings(mut self, rows: &[usize], embeddings: Vec<Embedding>) -> Result<Self> {
        if rows.len() != embeddings.len() {
            return Err(ChromaError::Embedding(format!(
                "embedding function returned {} embeddings for {} documents",
                embeddings.len(),
                rows.len()
            )));
        }
        let total = self.0.ids.len();
        let slots = self.0.embeddings.get_or_insert_with(|| vec![None; total]);
        for (&row, embedding) in rows.iter().zip(embeddings) {
            let slot = slots.get_mut(row).ok_or_else(|| {
                ChromaError::InvalidInput(format!("row {row} is out of range for {total} ids"))
            })?;
            *slot = Some(embedding);
        }
        Ok(self)
    }
}

impl OpBuilder<MutateOp> {
    pub fn documents<I, S>(self, documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Document>,
    {
        self.apply(|op| {
            let documents = non_empty(
                documents.into_iter().map(|d| Some(d.into())).collect(),
                "document",
            )?;
            op.documents.get_or_insert_with(Vec::new).extend(documents);
            Ok(())
        })
    }

    pub fn metadatas(self, metadatas: Vec<DocumentMetadata>) -> Self {
        self.apply(|op| {
            let metadatas = non_empty(metadatas.into_iter().map(Some).collect(), "metadata")?;
            op.metadatas.get_or_insert_with(Vec::new).extend(metadatas);
            Ok(())
        })
    }

    pub fn embeddings(self, embeddings: Vec<Embedding>) -> Self {
        self.apply(|op| {
            let embeddings = non_empty(embeddings.into_iter().map(Some).collect(), "embedding")?;
            op.embeddings.get_or_insert_with(Vec::new).extend(embeddings);
            Ok(())
        })
    }

    pub fn records(self, records: impl IntoIterator<Item = Record>) -> Self {
        self.apply(|op| {
            op.records.extend(non_empty(records.into_iter().collect(), "record")?);
            Ok(())
        })
    }

    /// Generate ids for rows when no ids are supplied. Ignored for update.
    pub fn id_generator(self, generator: impl IdGenerator + 'static) -> Self {
        self.apply(|op| {
            op.id_source = IdSource(Some(Arc::new(generator)));
            Ok(())
        })
    }
}

impl IdFragmentOp for MutateOp {
    fn ids_mut(&mut self) -> &mut Vec<String> {
        &mut self.ids
    }
}

impl Operation for MutateOp {
    fn resource_operation(&self) -> ResourceOperation {
        ResourceOperation::collection(self.kind.operation())
    }

    fn batch_size(&self) -> usize {
        self.ids.len() + self.records.len()
    }
}

#[derive(Serialize)]
struct MutateWire<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<&'a [Option<Document>]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadatas: Option<&'a [Option<DocumentMetadata>]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embeddings: Option<&'a [Option<Embedding>]>,
}

impl Serialize for Validated<MutateOp> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        MutateWire {
            ids: &self.0.ids,
            documents: self.0.documents(),
            metadatas: self.0.metadatas(),
            embeddings: self.0.embeddings(),
        }
        .serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Delete

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DeleteOp {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(flatten)]
    filters: FilterFragment,
}

impl DeleteOp {
    pub fn builder() -> OpBuilder<DeleteOp> {
        OpBuilder::new(Self::default())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn filters(&self) -> &FilterFragment {
        &self.filters
    }

    pub fn validate(self) -> Result<Validated<Self>> {
        match self.check() {
            Ok(()) => Ok(Validated(self)),
            Err(err) => rejected("delete", err),
        }
    }

    fn check(&self) -> Result<()> {
        if self.ids.is_empty() && self.filters.is_empty() {
            return Err(ValidationError::MissingDeleteFilter.into());
        }
        self.filters.validate()
    }
}

impl FilterFragmentOp for DeleteOp {
    fn filters_mut(&mut self) -> &mut FilterFragment {
        &mut self.filters
    }
}

impl IdFragmentOp for DeleteOp {
    fn ids_mut(&mut self) -> &mut Vec<String> {
        &mut self.ids
    }
}

impl Operation for DeleteOp {
    fn resource_operation(&self) -> ResourceOperation {
        ResourceOperation::collection(OperationKind::Delete)
    }

    fn batch_size(&self) -> usize {
        self.ids.len()
    }
}

#[derive(Serialize)]
struct DeleteWire<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    ids: &'a [String],
    #[serde(flatten)]
    filters: &'a FilterFragment,
}

impl Serialize for Validated<DeleteOp> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        DeleteWire {
            ids: &self.0.ids,
            filters: &self.0.filters,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Sha256Generator;
    use serde_json::json;

    fn validation_error(err: ChromaError) -> ValidationError {
        match err {
            ChromaError::Validation(inner) => inner,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn get_limit_must_be_positive() {
        let err = GetOp::builder().limit(0).build().unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("limit"));
        assert_eq!(validation_error(err), ValidationError::InvalidLimit);

        assert!(GetOp::builder().limit(5).build().unwrap().validate().is_ok());
    }

    #[test]
    fn get_defaults_and_projection_rules() {
        let op = GetOp::builder().build().unwrap();
        assert_eq!(op.include(), &[IncludeField::Documents, IncludeField::Metadatas]);
        assert!(op.clone().validate().is_ok());

        let err = GetOp::builder().include([]).build().unwrap().validate().unwrap_err();
        assert_eq!(validation_error(err), ValidationError::EmptyInclude);

        let err = GetOp::builder()
            .include([IncludeField::Distances])
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(
            validation_error(err),
            ValidationError::UnsupportedInclude("distances")
        );

        let err = GetOp::builder().offset(-1).build().unwrap().validate().unwrap_err();
        assert_eq!(validation_error(err), ValidationError::InvalidOffset);
    }

    #[test]
    fn get_validates_nested_filters() {
        let op = GetOp::builder()
            .where_meta(Filter::and([]))
            .build()
            .unwrap();
        let err = op.validate().unwrap_err();
        assert!(matches!(validation_error(err), ValidationError::InvalidFilter(_)));
    }

    #[test]
    fn first_failing_option_short_circuits() {
        let err = GetOp::builder()
            .ids(Vec::<String>::new())
            .ids(["a"])
            .build()
            .unwrap_err();
        assert_eq!(validation_error(err), ValidationError::EmptyOption("id"));
    }

    #[test]
    fn validated_get_wire_shape() {
        let op = GetOp::builder()
            .ids(["a", "b"])
            .where_meta(Filter::eq("lang", "en"))
            .limit(5)
            .build()
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(
            op.to_json_value().unwrap(),
            json!({
                "ids": ["a", "b"],
                "where": {"lang": {"$eq": "en"}},
                "include": ["documents", "metadatas"],
                "limit": 5
            })
        );
        assert_eq!(op.batch_size(), 2);
        assert_eq!(
            op.resource_operation(),
            ResourceOperation::collection(OperationKind::Read)
        );
    }

    #[test]
    fn get_decodes_from_wire_shape() {
        let raw = json!({
            "ids": ["a"],
            "where": {"n": {"$gt": 1}},
            "where_document": {"$contains": "x"},
            "limit": 3
        });
        let op: GetOp = serde_json::from_value(raw).unwrap();
        assert_eq!(op.ids(), &["a".to_string()]);
        assert_eq!(op.filters().where_meta, Some(Filter::gt("n", 1)));
        assert_eq!(op.filters().where_doc, Some(DocFilter::contains("x")));
        assert_eq!(op.include(), &default_get_include()[..]);
        assert_eq!(op.limit(), Some(3));
    }

    #[test]
    fn query_defaults_and_rules() {
        let op = QueryOp::builder().build().unwrap();
        assert_eq!(op.n_results(), 10);
        assert_eq!(
            validation_error(op.validate().unwrap_err()),
            ValidationError::MissingQuery
        );

        let err = QueryOp::builder()
            .query_texts(["hello"])
            .query_embeddings(vec![vec![0.1, 0.2]])
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(validation_error(err), ValidationError::AmbiguousQuery);

        let err = QueryOp::builder()
            .query_texts(["hello"])
            .n_results(0)
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(validation_error(err), ValidationError::InvalidNResults);
    }

    #[test]
    fn query_texts_must_be_embedded_before_serialization() {
        let op = QueryOp::builder()
            .query_texts(["hello", "world"])
            .build()
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(op.pending_texts().map(<[String]>::len), Some(2));
        assert!(op.to_json().is_err());

        assert!(op.clone().with_query_embeddings(vec![vec![0.1]]).is_err());

        let op = op
            .with_query_embeddings(vec![vec![0.1, 0.2], vec![0.3, 0.4]])
            .unwrap();
        assert!(op.pending_texts().is_none());
        let value = op.to_json_value().unwrap();
        assert_eq!(value["n_results"], json!(10));
        assert_eq!(value["include"], json!(["documents", "metadatas", "distances"]));
        assert!(value.get("query_texts").is_none());
    }

    #[test]
    fn mutate_lengths_must_match_ids() {
        let err = MutateOp::builder(MutationKind::Add)
            .ids(["1", "2"])
            .documents(["x"])
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(
            validation_error(err),
            ValidationError::LengthMismatch {
                field: "documents",
                actual: 1,
                expected: 2
            }
        );

        let op = MutateOp::builder(MutationKind::Add)
            .ids(["1", "2"])
            .documents(["x", "y"])
            .build()
            .unwrap();
        assert!(op.validate().is_ok());
    }

    #[test]
    fn mutate_requires_ids_and_payload() {
        let err = MutateOp::builder(MutationKind::Add)
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(validation_error(err), ValidationError::MissingIds);

        let err = MutateOp::builder(MutationKind::Update)
            .ids(["1"])
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(validation_error(err), ValidationError::EmptyPayload("update"));

        let err = MutateOp::builder(MutationKind::Add)
            .ids(["1"])
            .metadatas(vec![DocumentMetadata::new()])
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(validation_error(err), ValidationError::MissingContent);

        let op = MutateOp::builder(MutationKind::Update)
            .ids(["1"])
            .metadatas(vec![DocumentMetadata::new()])
            .build()
            .unwrap();
        assert!(op.validate().is_ok());
    }

    #[test]
    fn empty_parallel_arrays_count_as_absent() {
        let raw = json!({"ids": ["a"], "documents": [], "embeddings": [[0.1]]});
        let op: MutateOp = serde_json::from_value(raw).unwrap();
        let op = op.validate().unwrap();
        assert!(op.documents().is_none());
        assert_eq!(
            op.to_json_value().unwrap(),
            json!({"ids": ["a"], "embeddings": [[0.1f32]]})
        );

        let raw = json!({"ids": ["a"], "documents": [], "metadatas": []});
        let op: MutateOp = serde_json::from_value(raw).unwrap();
        let err = op.with_kind(MutationKind::Upsert).validate().unwrap_err();
        assert_eq!(validation_error(err), ValidationError::EmptyPayload("upsert"));
    }

    #[test]
    fn mutate_rejects_duplicate_ids() {
        let err = MutateOp::builder(MutationKind::Upsert)
            .ids(["a", "a"])
            .documents(["x", "y"])
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(validation_error(err), ValidationError::DuplicateId("a".into()));
    }

    #[test]
    fn records_expand_into_parallel_arrays() {
        let mut metadata = DocumentMetadata::new();
        metadata.set_int("page", 3);
        let op = MutateOp::builder(MutationKind::Add)
            .ids(["a"])
            .documents(["first"])
            .records([
                Record::new("b").embedding(vec![1.0, 2.0]).metadata(metadata.clone()),
                Record::new("c").document("third"),
            ])
            .build()
            .unwrap()
            .validate()
            .unwrap();

        assert_eq!(op.ids(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(
            op.documents().unwrap(),
            &[Some("first".to_string()), None, Some("third".to_string())]
        );
        assert_eq!(op.metadatas().unwrap(), &[None, Some(metadata), None]);
        assert_eq!(op.embeddings().unwrap(), &[None, Some(vec![1.0, 2.0]), None]);
        assert!(op.records().is_empty());
        assert_eq!(op.pending_documents(), vec![(0, "first"), (2, "third")]);
    }

    #[test]
    fn invalid_record_reports_its_index() {
        let err = MutateOp::builder(MutationKind::Add)
            .records([Record::new("a").document("x"), Record::new("b")])
            .build()
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(
            validation_error(err),
            ValidationError::InvalidRecord { index: 1, .. }
        ));
    }

    #[test]
    fn id_generator_fills_missing_ids() {
        let op = MutateOp::builder(MutationKind::Add)
            .documents(["hello", "world"])
            .id_generator(Sha256Generator)
            .build()
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(op.ids().len(), 2);
        assert_eq!(
            op.ids()[0],
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn embeddings_fill_pending_rows() {
        let op = MutateOp::builder(MutationKind::Add)
            .ids(["a", "b"])
            .documents(["x", "y"])
            .build()
            .unwrap()
            .validate()
            .unwrap();
        let rows: Vec<usize> = op.pending_documents().into_iter().map(|(i, _)| i).collect();
        let op = op
            .with_embeddings(&rows, vec![vec![0.5], vec![0.25]])
            .unwrap();
        assert!(op.pending_documents().is_empty());
        assert_eq!(
            op.to_json_value().unwrap(),
            json!({
                "ids": ["a", "b"],
                "documents": ["x", "y"],
                "embeddings": [[0.5], [0.25]]
            })
        );
        assert_eq!(
            op.resource_operation(),
            ResourceOperation::collection(OperationKind::Create)
        );
    }

    #[test]
    fn mutate_decodes_from_wire_shape() {
        let raw = json!({"ids": ["a"], "metadatas": [{"k": "v"}]});
        let op: MutateOp = serde_json::from_value(raw).unwrap();
        let op = op.with_kind(MutationKind::Update);
        assert_eq!(op.kind(), MutationKind::Update);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn delete_needs_a_selector() {
        let err = DeleteOp::builder().build().unwrap().validate().unwrap_err();
        assert_eq!(validation_error(err), ValidationError::MissingDeleteFilter);

        let op = DeleteOp::builder().ids(["1"]).build().unwrap().validate().unwrap();
        assert_eq!(op.to_json_value().unwrap(), json!({"ids": ["1"]}));

        let op = DeleteOp::builder()
            .where_doc(DocFilter::not_contains("spam"))
            .build()
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(
            op.to_json_value().unwrap(),
            json!({"where_document": {"$not_contains": "spam"}})
        );
    }
}
