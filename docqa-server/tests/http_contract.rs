use std::sync::Arc;

use docqa_rag::{
    EchoGenerationProvider, HashEmbeddingProvider, InMemoryVectorStore, RagConfig, RagService,
};
use docqa_server::{AnswerFormat, AppState, app_router};
use serde_json::{Value, json};

fn service(max_prompt_chars: usize) -> Arc<RagService> {
    let config = RagConfig::builder()
        .chunk_size(128)
        .chunk_overlap(16)
        .top_k(2)
        .max_prompt_chars(max_prompt_chars)
        .build()
        .expect("valid config");
    Arc::new(
        RagService::builder()
            .collection("docs")
            .config(config)
            .embedding_provider(Arc::new(HashEmbeddingProvider::new(256)))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .generation_provider(Arc::new(EchoGenerationProvider))
            .build()
            .expect("service"),
    )
}

async fn spawn_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    state.service.ensure_collection().await.expect("collection");
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    (format!("http://{}", addr), handle)
}

async fn index_memo(client: &reqwest::Client, base: &str) {
    let response = client
        .post(format!("{}/index", base))
        .json(&json!({"documents": [
            {"id": "memo.txt", "text": "The project deadline is Friday.\nShip the release notes too."},
            {"id": "lunch.txt", "text": "Lunch is served at noon in the cafeteria."}
        ]}))
        .send()
        .await
        .expect("index response");
    assert!(response.status().is_success());
    let report: Value = response.json().await.expect("report json");
    assert_eq!(report["documents_processed"], 2);
    assert_eq!(report["failures"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn root_and_health_respond() {
    let (base, handle) = spawn_server(AppState::new(service(24_000))).await;
    let client = reqwest::Client::new();

    let root: Value = client.get(&base).send().await.expect("root").json().await.expect("root json");
    assert_eq!(root["message"], "docqa is running");

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .expect("health")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["status"], "ok");
    assert_eq!(health["index_ready"], false);
    assert_eq!(health["collection"], "docs");

    handle.abort();
}

#[tokio::test]
async fn query_before_indexing_is_index_not_ready() {
    let (base, handle) = spawn_server(AppState::new(service(24_000))).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/query", base))
        .json(&json!({"question": "When is the project due?"}))
        .send()
        .await
        .expect("query response");
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["error_kind"], "index_not_ready");
    assert_eq!(body["retryable"], true);

    handle.abort();
}

#[tokio::test]
async fn indexed_documents_ground_the_answer() {
    let (base, handle) = spawn_server(AppState::new(service(24_000))).await;
    let client = reqwest::Client::new();
    index_memo(&client, &base).await;

    let response = client
        .post(format!("{}/query", base))
        .json(&json!({"question": "When is the project deadline?", "top_k": 1}))
        .send()
        .await
        .expect("query response");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("answer json");
    assert_eq!(body["context_found"], true);
    assert!(body["answer"].as_str().expect("answer").contains("The project deadline is Friday."));
    assert_eq!(body["sources"][0]["document_id"], "memo.txt");
    assert_eq!(body["sources"].as_array().map(Vec::len), Some(1));

    handle.abort();
}

#[tokio::test]
async fn html_format_replaces_newlines() {
    let state = AppState::new(service(24_000)).with_answer_format(AnswerFormat::Html);
    let (base, handle) = spawn_server(state).await;
    let client = reqwest::Client::new();
    index_memo(&client, &base).await;

    let body: Value = client
        .post(format!("{}/query", base))
        .json(&json!({"question": "project deadline release notes", "top_k": 1}))
        .send()
        .await
        .expect("query response")
        .json()
        .await
        .expect("answer json");
    let answer = body["answer"].as_str().expect("answer");
    assert!(answer.contains("<br>"));
    assert!(!answer.contains('\n'));

    handle.abort();
}

#[tokio::test]
async fn invalid_requests_get_structured_errors() {
    let (base, handle) = spawn_server(AppState::new(service(24_000))).await;
    let client = reqwest::Client::new();
    index_memo(&client, &base).await;

    let empty = client
        .post(format!("{}/query", base))
        .json(&json!({"question": "   "}))
        .send()
        .await
        .expect("query response");
    assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = empty.json().await.expect("error json");
    assert_eq!(body["error_kind"], "invalid_request");
    assert_eq!(body["retryable"], false);

    let malformed = client
        .post(format!("{}/query", base))
        .json(&json!({"prompt": "wrong field"}))
        .send()
        .await
        .expect("query response");
    assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);

    handle.abort();
}

#[tokio::test]
async fn oversized_context_is_reported_not_truncated() {
    let (base, handle) = spawn_server(AppState::new(service(300))).await;
    let client = reqwest::Client::new();
    index_memo(&client, &base).await;

    let response = client
        .post(format!("{}/query", base))
        .json(&json!({"question": "project deadline lunch"}))
        .send()
        .await
        .expect("query response");
    assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["error_kind"], "context_too_large");

    handle.abort();
}

#[tokio::test]
async fn deleted_documents_stop_matching() {
    let (base, handle) = spawn_server(AppState::new(service(24_000))).await;
    let client = reqwest::Client::new();
    index_memo(&client, &base).await;

    let response = client
        .delete(format!("{}/documents/memo.txt", base))
        .send()
        .await
        .expect("delete response");
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let body: Value = client
        .post(format!("{}/query", base))
        .json(&json!({"question": "When is the project deadline?", "top_k": 2}))
        .send()
        .await
        .expect("query response")
        .json()
        .await
        .expect("answer json");
    let sources = body["sources"].as_array().expect("sources");
    assert!(sources.iter().all(|s| s["document_id"] != "memo.txt"));

    handle.abort();
}
