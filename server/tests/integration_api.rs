use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use corpus_core::{Corpus, CorpusLoader, FsCache, PathSource, RawDocument};
use http_body_util::BodyExt;
use serde_json::Value;
use server::{build_app, AppState, Reloader};
use std::fs;
use tempfile::tempdir;
use tower::ServiceExt;

fn tiny_corpus() -> Corpus {
    Corpus::build(vec![
        RawDocument::new("docA", "the quick fox"),
        RawDocument::new("docB", "the quick dog"),
        RawDocument::new("docC", "a lazy dog sleeps"),
    ])
    .unwrap()
    .0
}

fn app() -> Router {
    build_app(AppState::new(tiny_corpus(), Some("secret".into())))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(app(), Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn jaccard_ranks_documents() {
    let (status, json) = get(app(), "/jaccard/docA").await;
    assert_eq!(status, StatusCode::OK);
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["document_id"], "docA");
    assert_eq!(rows[0]["similarity"].as_f64().unwrap(), 1.0);
    assert_eq!(rows[1]["document_id"], "docB");
    assert!((rows[1]["similarity"].as_f64().unwrap() - 1.0 / 3.0).abs() < 1e-12);

    let (_, json) = get(app(), "/jaccard/docA?exclude_self=true&limit=1").await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["document_id"], "docB");
}

#[tokio::test]
async fn similar_words_and_not_found() {
    let (status, json) = get(app(), "/similar?keyword=Fox&n=2").await;
    assert_eq!(status, StatusCode::OK);
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["token"], "fox");
    assert_eq!(rows[0]["pct_of_keyword_docs"].as_f64().unwrap(), 100.0);

    let (status, json) = get(app(), "/similar?keyword=%20FOX%20&n=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap()[0]["token"], "fox");

    let (status, json) = get(app(), "/similar?keyword=nonexistent_xyz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nonexistent_xyz"));

    let (status, _) = get(app(), "/doc/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn projection_and_stats() {
    let (status, json) = get(app(), "/projection").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json.as_array().unwrap().iter().map(|p| p["document_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["docA", "docB", "docC"]);

    let (_, stats) = get(app(), "/stats").await;
    assert_eq!(stats["document_count"], 3);
    assert_eq!(stats["distinct_token_count"], 5);

    let (_, lengths) = get(app(), "/stats/token-lengths").await;
    assert_eq!(lengths["3"], 3);

    let (_, common) = get(app(), "/stats/common-tokens?n=1").await;
    assert_eq!(common[0]["token"], "dog");

    let (_, cdf) = get(app(), "/stats/document-lengths").await;
    assert_eq!(cdf.as_array().unwrap().last().unwrap()["cumulative_fraction"], 1.0);

    let (status, doc) = get(app(), "/doc/docC").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["filtered_tokens"], serde_json::json!(["lazy", "dog", "sleeps"]));
}

#[tokio::test]
async fn reload_requires_token_and_swaps_corpus() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.jsonl");
    fs::write(&input, "{\"id\": \"x1\", \"description\": \"ward nurse\"}\n").unwrap();

    let state = AppState::new(tiny_corpus(), Some("secret".into())).with_reloader(Reloader {
        loader: CorpusLoader::new(Box::new(FsCache::new(dir.path().join("cache")))),
        corpus_id: "test".into(),
        source: Box::new(PathSource::new(&input)),
    });
    let app = build_app(state.clone());

    let (status, _) = send(app.clone(), Request::post("/corpus/reload").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::post("/corpus/reload").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, body) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["documents"], 1);
    assert_eq!(state.current().documents()[0].id, "x1");

    let (status, _) = get(app, "/doc/x1").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reload_without_source_is_not_implemented() {
    let req = Request::post("/corpus/reload").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, _) = send(app(), req).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}
