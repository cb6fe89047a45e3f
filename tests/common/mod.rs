#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use async_trait::async_trait;
use chroma_rs::{
    ApiPaths, ChromaError, Client, ClientConfig, Collection, CollectionModel, EmbeddingFunction,
    Embeddings, Request, Transport,
};
use serde_json::{Value, json};

pub const TENANT: &str = "default_tenant";
pub const DATABASE: &str = "default_database";
pub const COLLECTION_ID: &str = "c1";
pub const PREFLIGHT: &str = "pre-flight-checks";

/// Load ClientConfig from environment when `CHROMA_INTEGRATION=1` is set.
/// Returns None and prints a SKIP message otherwise.
pub fn load_config_for_integration() -> Option<ClientConfig> {
    if std::env::var("CHROMA_INTEGRATION").ok().as_deref() != Some("1") {
        eprintln!("SKIP: set CHROMA_INTEGRATION=1 and CHROMA_* env vars to run integration tests");
        return None;
    }
    ClientConfig::from_env().ok()
}

/// Millisecond timestamp string used to make collection names unique.
pub fn ts_suffix() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    ts.to_string()
}

#[derive(Clone, Debug)]
enum Reply {
    Body(Vec<u8>),
    Status(u16),
}

/// Scripted transport that records every request.
///
/// Each path has a queue of replies; the last reply repeats once the queue is
/// down to one entry. Unscripted paths answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<Request>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that advertises `{"max_batch_size": max}`.
    pub fn with_batch_limit(max: usize) -> Self {
        Self::new().respond(PREFLIGHT, json!({ "max_batch_size": max }))
    }

    pub fn respond(self, path: impl Into<String>, body: Value) -> Self {
        self.push(path.into(), Reply::Body(body.to_string().into_bytes()));
        self
    }

    pub fn fail(self, path: impl Into<String>, status: u16) -> Self {
        self.push(path.into(), Reply::Status(status));
        self
    }

    /// Hold replies on `path` for `delay`.
    pub fn delay(self, path: impl Into<String>, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(path.into(), delay);
        self
    }

    fn push(&self, path: String, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(path)
            .or_default()
            .push_back(reply);
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// JSON body of the last request sent to `path`.
    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.path == path)
            .and_then(|r| r.body.as_ref())
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> chroma_rs::Result<Vec<u8>> {
        let path = request.path.clone();
        self.requests.lock().unwrap().push(request);

        let delay = self.delays.lock().unwrap().get(&path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(ChromaError::Http {
                status,
                body: format!("scripted failure for {path}"),
            }),
            None => Err(ChromaError::NotFound(path)),
        }
    }
}

pub fn records_path(action: &str) -> String {
    ApiPaths::records(TENANT, DATABASE, COLLECTION_ID, action)
}

pub fn client(transport: MockTransport) -> Client<MockTransport> {
    Client::new(transport, ClientConfig::new("http://mock"))
}

pub fn collection_model() -> CollectionModel {
    CollectionModel {
        id: COLLECTION_ID.into(),
        name: "docs".into(),
        metadata: None,
        dimension: Some(3),
        tenant: Some(TENANT.into()),
        database: Some(DATABASE.into()),
    }
}

/// Collection handle over a mock transport, with an optional embedding function.
pub fn collection<Ef: EmbeddingFunction + 'static>(
    transport: MockTransport,
    embedding_function: Option<Ef>,
) -> Collection<MockTransport, Ef> {
    Collection::new(client(transport), collection_model(), embedding_function)
}

/// Dummy embedding function to satisfy type parameters; not used in these tests.
pub struct DummyEmbedding;

#[async_trait]
impl EmbeddingFunction for DummyEmbedding {
    async fn embed_documents(&self, _docs: &[String]) -> Result<Embeddings, ChromaError> {
        Err(ChromaError::Embedding(
            "DummyEmbedding should not be called".into(),
        ))
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Simple embedding function that returns a constant vector of the given dimension.
pub struct ConstantEmbedding {
    pub value: f32,
    pub dim: usize,
}

#[async_trait]
impl EmbeddingFunction for ConstantEmbedding {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings, ChromaError> {
        let mut out = Vec::with_capacity(docs.len());
        for _ in docs {
            out.push(vec![self.value; self.dim]);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Embedding function whose output width differs from the dimension it reports.
pub struct MisreportedEmbedding {
    pub reported: usize,
    pub produced: usize,
}

#[async_trait]
impl EmbeddingFunction for MisreportedEmbedding {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings, ChromaError> {
        Ok(docs.iter().map(|_| vec![0.5; self.produced]).collect())
    }

    fn dimension(&self) -> usize {
        self.reported
    }
}
