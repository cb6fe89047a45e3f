//! Client-level endpoints over the mock transport.

use anyhow::Result;
use chroma_rs::{ApiPaths, ChromaError, Client, CollectionMetadata, Method, ValidationError};
use serde_json::json;

mod common;
use common::{COLLECTION_ID, DATABASE, DummyEmbedding, MockTransport, TENANT, client};

fn model(name: &str) -> serde_json::Value {
    json!({
        "id": COLLECTION_ID,
        "name": name,
        "metadata": {"hnsw:space": "cosine", "shards": 2},
        "dimension": 3,
        "tenant": TENANT,
        "database": DATABASE
    })
}

#[tokio::test]
async fn heartbeat_and_version() -> Result<()> {
    let transport = MockTransport::new()
        .respond(
            ApiPaths::HEARTBEAT,
            json!({"nanosecond heartbeat": 1_700_000_000_000_000_000u64}),
        )
        .respond(ApiPaths::VERSION, json!("1.0.0"));
    let client = client(transport);

    assert_eq!(client.heartbeat().await?, 1_700_000_000_000_000_000);
    assert_eq!(client.version().await?, "1.0.0");
    assert_eq!(client.transport().total_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn create_collection_posts_name_and_metadata() -> Result<()> {
    let collections = ApiPaths::collections(TENANT, DATABASE);
    let transport = MockTransport::new().respond(collections.clone(), model("docs"));
    let client = client(transport);

    let mut metadata = CollectionMetadata::new();
    metadata.set_string("hnsw:space", "cosine").set_int("shards", 2);
    let coll = client
        .create_collection("docs", Some(metadata.clone()), None::<DummyEmbedding>)
        .await?;

    assert_eq!(coll.id(), COLLECTION_ID);
    assert_eq!(coll.name(), "docs");
    assert_eq!(coll.dimension(), Some(3));
    assert_eq!(coll.metadata(), Some(&metadata));
    assert_eq!(
        client.transport().last_body(&collections),
        Some(json!({
            "name": "docs",
            "metadata": {"hnsw:space": "cosine", "shards": 2},
            "get_or_create": false
        }))
    );

    client
        .get_or_create_collection("docs", None, None::<DummyEmbedding>)
        .await?;
    assert_eq!(
        client.transport().last_body(&collections),
        Some(json!({"name": "docs", "get_or_create": true}))
    );
    Ok(())
}

#[tokio::test]
async fn get_collection_maps_not_found() -> Result<()> {
    let found = ApiPaths::collection(TENANT, DATABASE, "docs");
    let transport = MockTransport::new().respond(found.clone(), model("docs"));
    let client = client(transport);

    let coll = client.get_collection("docs", None::<DummyEmbedding>).await?;
    assert_eq!(coll.name(), "docs");

    let err = client
        .get_collection("missing", None::<DummyEmbedding>)
        .await
        .err()
        .expect("missing collection");
    match err {
        ChromaError::NotFound(message) => assert_eq!(message, "collection not found: missing"),
        other => panic!("unexpected error: {other:?}"),
    }

    let request = client
        .transport()
        .requests()
        .into_iter()
        .find(|r| r.path == found)
        .expect("get request");
    assert_eq!(request.method, Method::Get);
    Ok(())
}

#[tokio::test]
async fn invalid_names_never_reach_the_server() -> Result<()> {
    let client = client(MockTransport::new());

    for name in ["ab", "-docs", "docs-", "my..docs", "has space"] {
        let err = client
            .create_collection(name, None, None::<DummyEmbedding>)
            .await
            .err()
            .expect("invalid name");
        assert!(matches!(
            err,
            ChromaError::Validation(ValidationError::InvalidCollectionName(_))
        ));
    }
    assert!(client.delete_collection("x").await.is_err());
    assert_eq!(client.transport().total_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn delete_collection_uses_delete_method() -> Result<()> {
    let path = ApiPaths::collection(TENANT, DATABASE, "docs");
    let client = client(MockTransport::new().respond(path.clone(), json!(null)));

    client.delete_collection("docs").await?;
    let requests = client.transport().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Delete);
    assert_eq!(requests[0].path, path);
    Ok(())
}

#[tokio::test]
async fn list_and_count_collections() -> Result<()> {
    let base = ApiPaths::collections(TENANT, DATABASE);
    let paged = format!("{base}?limit=5&offset=10");
    let transport = MockTransport::new()
        .respond(base.clone(), json!([model("docs")]))
        .respond(paged.clone(), json!([]))
        .respond(ApiPaths::collections_count(TENANT, DATABASE), json!(1));
    let client = client(transport);

    let all = client.list_collections(None, None).await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "docs");

    assert!(client.list_collections(Some(5), Some(10)).await?.is_empty());
    assert_eq!(client.transport().calls_to(&paged), 1);

    assert_eq!(client.count_collections().await?, 1);
    Ok(())
}

#[tokio::test]
async fn builder_validates_config_before_building() -> Result<()> {
    let err = Client::builder("")
        .build_with(MockTransport::new())
        .err()
        .expect("empty base url");
    assert!(matches!(err, ChromaError::Config(_)));

    let client = Client::builder("http://mock")
        .tenant("acme")
        .database("prod")
        .build_with(MockTransport::new().respond(
            ApiPaths::collections_count("acme", "prod"),
            json!(0),
        ))?;
    assert_eq!(client.count_collections().await?, 0);
    Ok(())
}

/// Live server check; requires `CHROMA_INTEGRATION=1` and `CHROMA_URL`.
#[cfg(feature = "http")]
#[tokio::test]
async fn live_heartbeat() -> Result<()> {
    let Some(config) = common::load_config_for_integration() else {
        return Ok(());
    };
    let client = Client::from_config(config)?;
    assert!(client.heartbeat().await? > 0);

    let name = format!("chroma_rs_{}", common::ts_suffix());
    let coll = client
        .get_or_create_collection(&name, None, None::<DummyEmbedding>)
        .await?;
    assert_eq!(coll.count().await?, 0);
    client.delete_collection(&name).await?;
    Ok(())
}
