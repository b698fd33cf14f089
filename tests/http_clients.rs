use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_harness::backend::{BackendCommands, HttpBackendCommands};
use chat_harness::config::{BackendConfig, Config, EmbeddingConfig, LlmConfig};
use chat_harness::embedding::{EmbeddingProvider, OpenAIProvider};
use chat_harness::error::GenerationError;
use chat_harness::filters::FilterSet;
use chat_harness::intent::{
    Classifier, ClassifyContext, FollowUpMode, Intent, KeywordClassifier, RemoteClassifier,
};
use chat_harness::llm::{ChatMessage, CompletionRequest, LanguageModel, OpenAiChatModel};
use chat_harness::notify::ChannelNotifier;
use chat_harness::orchestrator::{ChatSession, Services, SessionOptions, TurnOutcome};
use chat_harness::retrieval::{HttpRetrievalGateway, RetrievalGateway, SearchParams};
use chat_harness::state::{abort_pair, AbortSignal};
use chat_harness::store::MemoryChatStore;

fn backend_config(server: &MockServer) -> BackendConfig {
    BackendConfig {
        url: format!("{}/api", server.uri()),
        timeout_secs: 5,
        ..BackendConfig::default()
    }
}

fn embedding_config(server: &MockServer, max_retries: u32) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "openai".to_string(),
        model: Some("text-embedding-3-small".to_string()),
        dims: Some(3),
        url: format!("{}/v1", server.uri()),
        max_retries,
        timeout_secs: 5,
    }
}

fn llm_config(server: &MockServer) -> LlmConfig {
    LlmConfig {
        base_url: format!("{}/v1", server.uri()),
        model: "gpt-test".to_string(),
        max_tokens: None,
        timeout_secs: 5,
    }
}

fn sse(events: &[&str]) -> String {
    events
        .iter()
        .map(|e| format!("data: {}\n\n", e))
        .collect::<String>()
}

fn delta(text: &str) -> String {
    json!({ "choices": [{ "delta": { "content": text }, "finish_reason": null }] }).to_string()
}

fn completion_request(text: &str) -> CompletionRequest {
    CompletionRequest {
        model: "gpt-test".to_string(),
        messages: vec![ChatMessage::user(text)],
        temperature: 0.5,
        max_tokens: None,
    }
}

// ============ Retrieval gateway ============

#[tokio::test]
async fn test_search_posts_user_and_filters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/file_ops/search_docs"))
        .and(body_partial_json(json!({
            "user_id": "u1",
            "collection_filter": ["legal"],
            "top_k": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retrieved_chunks": [
                { "content": "Clause 9: termination", "score": 0.82,
                  "metadata": { "file_name": "acme.pdf", "file_id": "f-1" } },
                { "content": "Clause 2: term", "score": 0.91,
                  "metadata": { "file_name": "acme.pdf", "file_id": "f-1" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpRetrievalGateway::new(&backend_config(&server)).unwrap();
    let filters = FilterSet {
        collections: vec!["legal".to_string()],
        ..FilterSet::default()
    };
    let params = SearchParams::new(vec![0.1, 0.2], "u1", filters, Some(5)).unwrap();

    let chunks = gateway.search(&params).await.unwrap();

    // Backend order is kept as returned
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].score, 0.82);
    assert_eq!(chunks[0].metadata.file_id.as_deref(), Some("f-1"));
}

#[tokio::test]
async fn test_search_omits_absent_filters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/file_ops/search_docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "retrieved_chunks": [] })))
        .mount(&server)
        .await;

    let gateway = HttpRetrievalGateway::new(&backend_config(&server)).unwrap();
    let params = SearchParams::new(vec![0.5], "u1", FilterSet::default(), None).unwrap();
    gateway.search(&params).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 2, "only embedding and user_id: {:?}", keys);
    assert!(body.get("file_name_filter").is_none());
}

#[tokio::test]
async fn test_search_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/file_ops/search_docs"))
        .respond_with(ResponseTemplate::new(503).set_body_string("index rebuilding"))
        .mount(&server)
        .await;

    let gateway = HttpRetrievalGateway::new(&backend_config(&server)).unwrap();
    let params = SearchParams::new(vec![0.5], "u1", FilterSet::default(), None).unwrap();
    let err = gateway.search(&params).await.unwrap_err();

    assert_eq!(err.status, Some(503));
    assert!(err.message.contains("index rebuilding"));
}

#[tokio::test]
async fn test_search_transport_error_has_no_status() {
    let config = BackendConfig {
        url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..BackendConfig::default()
    };
    let gateway = HttpRetrievalGateway::new(&config).unwrap();
    let params = SearchParams::new(vec![0.5], "u1", FilterSet::default(), None).unwrap();
    let err = gateway.search(&params).await.unwrap_err();
    assert_eq!(err.status, None);
}

// ============ Backend commands ============

#[tokio::test]
async fn test_backend_commands_hit_configured_paths() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/background_ingest_all"))
        .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/run_score_test"))
        .respond_with(ResponseTemplate::new(500).set_body_string("scorer crashed"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackendCommands::new(&backend_config(&server)).unwrap();

    assert_eq!(backend.trigger_ingestion().await.unwrap(), "queued");
    let err = backend.run_score_test().await.unwrap_err();
    assert!(err.to_string().contains("500"));
    assert!(err.to_string().contains("scorer crashed"));
}

// ============ Embeddings ============

#[tokio::test]
async fn test_embedding_request_and_parse() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "termination clause"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.25, -0.5, 1.0] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAIProvider::with_api_key(&embedding_config(&server, 0), "sk-test").unwrap();
    let vec = provider.embed("termination clause").await.unwrap();
    assert_eq!(vec, vec![0.25, -0.5, 1.0]);
}

#[tokio::test]
async fn test_embedding_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [1.0, 0.0, 0.0] }]
        })))
        .mount(&server)
        .await;

    let provider = OpenAIProvider::with_api_key(&embedding_config(&server, 1), "sk-test").unwrap();
    assert_eq!(provider.embed("q").await.unwrap(), vec![1.0, 0.0, 0.0]);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_embedding_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAIProvider::with_api_key(&embedding_config(&server, 3), "sk-bad").unwrap();
    let err = provider.embed("q").await.unwrap_err();
    assert!(err.to_string().contains("401"));
}

// ============ Chat completions ============

#[tokio::test]
async fn test_completion_streams_deltas() {
    let server = MockServer::start().await;
    let body = sse(&[&delta("Hello"), &delta(", world"), "[DONE]"]);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-test", "stream": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let model = OpenAiChatModel::with_api_key(&llm_config(&server), None).unwrap();
    let mut seen = Vec::new();
    let completion = model
        .complete(
            &completion_request("hi"),
            &AbortSignal::never(),
            &mut |d: &str| seen.push(d.to_string()),
        )
        .await
        .unwrap();

    assert_eq!(completion.content, "Hello, world");
    assert!(!completion.stopped);
    assert_eq!(seen, vec!["Hello", ", world"]);
}

#[tokio::test]
async fn test_completion_sends_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-live"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[&delta("ok"), "[DONE]"])))
        .expect(1)
        .mount(&server)
        .await;

    let model =
        OpenAiChatModel::with_api_key(&llm_config(&server), Some("sk-live".to_string())).unwrap();
    let completion = model
        .complete(&completion_request("hi"), &AbortSignal::never(), &mut |_: &str| {})
        .await
        .unwrap();
    assert_eq!(completion.content, "ok");
}

#[tokio::test]
async fn test_completion_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let model = OpenAiChatModel::with_api_key(&llm_config(&server), None).unwrap();
    let err = model
        .complete(&completion_request("hi"), &AbortSignal::never(), &mut |_: &str| {})
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GenerationError::Api {
            status: 429,
            message: "slow down".to_string()
        }
    );
}

#[tokio::test]
async fn test_completion_abort_while_waiting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sse(&[&delta("late"), "[DONE]"]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let model = OpenAiChatModel::with_api_key(&llm_config(&server), None).unwrap();
    let (handle, signal) = abort_pair();
    let request = completion_request("hi");
    let mut ignore = |_: &str| {};
    let (result, _) = tokio::join!(
        model.complete(&request, &signal, &mut ignore),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.abort();
        }
    );

    let completion = result.unwrap();
    assert!(completion.stopped);
    assert!(completion.content.is_empty());
}

// ============ Intent service ============

#[tokio::test]
async fn test_intent_endpoint_with_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/intent"))
        .and(body_partial_json(json!({
            "message": "what about the second one?",
            "previousSummary": "Found 3 contracts"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "intent": "follow_up" })))
        .expect(1)
        .mount(&server)
        .await;

    let classifier =
        RemoteClassifier::with_endpoint(&server.uri(), Duration::from_secs(5), FollowUpMode::Remote)
            .unwrap();
    let ctx = ClassifyContext {
        last_summary: Some("Found 3 contracts".to_string()),
        has_prior_chunks: true,
    };
    assert_eq!(
        classifier.classify("what about the second one?", &ctx).await,
        Intent::FollowUp
    );
}

#[tokio::test]
async fn test_intent_endpoint_failure_defaults_to_general_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/intent"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let classifier = RemoteClassifier::with_endpoint(
        &server.uri(),
        Duration::from_secs(5),
        FollowUpMode::Heuristic,
    )
    .unwrap();
    let intent = classifier
        .classify("summarise the onboarding guide", &ClassifyContext::default())
        .await;
    assert_eq!(intent, Intent::GeneralChat);
}

#[tokio::test]
async fn test_intent_endpoint_not_called_for_reserved_commands() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "intent": "general_chat" })))
        .expect(0)
        .mount(&server)
        .await;

    let classifier = RemoteClassifier::with_endpoint(
        &server.uri(),
        Duration::from_secs(5),
        FollowUpMode::Heuristic,
    )
    .unwrap();
    let intent = classifier
        .classify("Run Ingestion", &ClassifyContext::default())
        .await;
    assert_eq!(intent, Intent::RunIngestion);
}

// ============ Full turn over HTTP ============

#[tokio::test]
async fn test_search_turn_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3] }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/file_ops/search_docs"))
        .and(body_partial_json(json!({
            "embedding": [0.1, 0.2, 0.3],
            "user_id": "u1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "retrieved_chunks": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = Config::minimal();
    cfg.chat.user_id = "u1".to_string();
    cfg.backend = backend_config(&server);
    cfg.embedding = embedding_config(&server, 0);
    cfg.llm = llm_config(&server);

    let (notifier, _rx) = ChannelNotifier::new();
    let services = Services {
        classifier: Arc::new(Classifier::Deterministic(KeywordClassifier)),
        embedder: Arc::new(OpenAIProvider::with_api_key(&cfg.embedding, "sk-test").unwrap()),
        retrieval: Arc::new(HttpRetrievalGateway::new(&cfg.backend).unwrap()),
        backend: Arc::new(HttpBackendCommands::new(&cfg.backend).unwrap()),
        model: Arc::new(OpenAiChatModel::with_api_key(&cfg.llm, None).unwrap()),
        store: Arc::new(MemoryChatStore::new()),
        notifier: Arc::new(notifier),
    };
    let session = ChatSession::new(services, SessionOptions::from_config(&cfg), cfg.chat_settings());

    let outcome = session
        .submit("search my contracts for termination clause")
        .await
        .unwrap();

    match outcome {
        TurnOutcome::SearchAnswered { message, .. } => {
            assert_eq!(message.content, "No results found for your search.");
        }
        other => panic!("expected SearchAnswered, got {:?}", other),
    }
}
