//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer `{question, top_k?, filename?}` with a verdict |
//! | `GET`  | `/ask?q=..&top_k=..&filename=..` | Same, from query parameters |
//! | `GET`  | `/health` | `{status, embeddings, model}` |
//! | `GET`  | `/stats` | Store size, models, generation reachability |
//! | `GET`  | `/documents` | Sorted document filenames in the input directory |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must be 3-500 characters" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500). A generation failure
//! is not an HTTP error; it produces a fallback verdict with `_meta.fallback`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use coverage_harness_core::answer::Verdict;
use coverage_harness_core::generation::GenerationService;
use coverage_harness_core::store::Store;

use crate::agent::CoverageAgent;
use crate::config::Config;
use crate::ingest::{file_name, list_documents};
use crate::services::Services;

const MIN_QUESTION_CHARS: usize = 3;
const MAX_QUESTION_CHARS: usize = 500;
const MAX_TOP_K: usize = 30;
const DEFAULT_TOP_K: usize = 10;

/// Shared state for every handler. Service handles are built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<CoverageAgent>,
    pub store: Arc<dyn Store>,
    pub generator: Arc<dyn GenerationService>,
    pub embedding_model: String,
    pub input_dir: PathBuf,
}

/// Build the router with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", get(handle_ask_get).post(handle_ask_post))
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/documents", get(handle_documents))
        .layer(cors)
        .with_state(state)
}

/// `cov serve`: open the store, build the agent, and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::open(config).await?;
    let state = AppState {
        agent: Arc::new(services.agent(config)),
        store: services.store.clone(),
        generator: services.generator.clone(),
        embedding_model: services.embedder.model_name().to_string(),
        input_dir: config.documents.input_dir.clone(),
    };

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "HTTP server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ /ask ============

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AskParams {
    q: Option<String>,
    top_k: Option<usize>,
    filename: Option<String>,
}

/// Validate and run one question.
async fn answer(
    state: &AppState,
    question: &str,
    top_k: Option<usize>,
    filename: Option<String>,
) -> Result<Json<Verdict>, AppError> {
    let question = question.trim();
    let len = question.chars().count();
    if !(MIN_QUESTION_CHARS..=MAX_QUESTION_CHARS).contains(&len) {
        return Err(bad_request(format!(
            "question must be {}-{} characters",
            MIN_QUESTION_CHARS, MAX_QUESTION_CHARS
        )));
    }
    let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
    if !(1..=MAX_TOP_K).contains(&top_k) {
        return Err(bad_request(format!("top_k must be between 1 and {}", MAX_TOP_K)));
    }
    let filename = filename.filter(|f| !f.trim().is_empty());

    let verdict = state
        .agent
        .ask(question, filename.as_deref(), Some(top_k))
        .await
        .map_err(internal)?;
    Ok(Json(verdict))
}

async fn handle_ask_post(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Verdict>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    answer(&state, &req.question, req.top_k, req.filename).await
}

async fn handle_ask_get(
    State(state): State<AppState>,
    Query(params): Query<AskParams>,
) -> Result<Json<Verdict>, AppError> {
    let question = params
        .q
        .ok_or_else(|| bad_request("missing query parameter: q"))?;
    answer(&state, &question, params.top_k, params.filename).await
}

// ============ /health, /stats, /documents ============

#[derive(Serialize)]
struct HealthResponse {
    /// `"ok"`, or `"empty"` when nothing has been ingested.
    status: &'static str,
    embeddings: usize,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let embeddings = state.store.count().await.map_err(internal)?;
    Ok(Json(HealthResponse {
        status: if embeddings > 0 { "ok" } else { "empty" },
        embeddings,
        model: state.generator.model_name().to_string(),
    }))
}

#[derive(Serialize)]
struct StatsResponse {
    total_chunks: usize,
    embedding_model: String,
    generation_model: String,
    generation_available: bool,
    version: &'static str,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let total_chunks = state.store.count().await.map_err(internal)?;
    Ok(Json(StatsResponse {
        total_chunks,
        embedding_model: state.embedding_model.clone(),
        generation_model: state.generator.model_name().to_string(),
        generation_available: state.generator.is_available().await,
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<String>,
}

async fn handle_documents(State(state): State<AppState>) -> Json<DocumentsResponse> {
    let documents = match list_documents(&state.input_dir) {
        Ok(files) => files.iter().map(|p| file_name(p)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "document listing failed");
            Vec::new()
        }
    };
    Json(DocumentsResponse { documents })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use coverage_harness_core::embedding::EmbeddingProvider;
    use coverage_harness_core::generation::{GenerationError, GenerationRequest};
    use coverage_harness_core::models::ChunkMetadata;
    use coverage_harness_core::retrieval::{MultiQueryRetriever, RetrievalOptions};
    use coverage_harness_core::store::memory::InMemoryStore;
    use serde_json::Value;
    use tower::ServiceExt;

    struct FakeLlm;

    #[async_trait]
    impl GenerationService for FakeLlm {
        fn model_name(&self) -> &str {
            "fake-llm"
        }
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            if request.system.is_none() {
                return Ok("[]".to_string());
            }
            Ok(r#"{"covered": "Partial", "confidence": "0.6", "explanation": "Room rent is capped.", "citations": [], "caveats": "Cap applies"}"#.to_string())
        }
        async fn is_available(&self) -> bool {
            false
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    async fn app(populated: bool, input_dir: PathBuf) -> Router {
        let store = Arc::new(InMemoryStore::new());
        if populated {
            let meta = ChunkMetadata {
                filename: "policy.pdf".to_string(),
                page_number: 2,
                page_end: 2,
                section_title: "BENEFITS".to_string(),
                ..Default::default()
            };
            store
                .upsert("policy__chunk_0001", "Room rent is capped at one percent of the sum insured.", &[1.0], &meta)
                .await
                .unwrap();
        }
        let generator: Arc<dyn GenerationService> = Arc::new(FakeLlm);
        let retriever = MultiQueryRetriever::new(
            store.clone(),
            Arc::new(UnitEmbedder),
            generator.clone(),
            RetrievalOptions::default(),
        );
        router(AppState {
            agent: Arc::new(CoverageAgent::new(retriever, generator.clone(), 12_000, 5)),
            store,
            generator,
            embedding_model: "unit".to_string(),
            input_dir,
        })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_ask(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_post_ask_returns_verdict() {
        let (status, body) = send(
            app(true, PathBuf::from("/nonexistent")).await,
            post_ask(serde_json::json!({"question": "Is room rent capped?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["covered"], "Partial");
        assert_eq!(body["confidence"], 0.6);
        assert_eq!(body["caveats"], serde_json::json!(["Cap applies"]));
        assert_eq!(body["citations"][0]["file"], "policy.pdf");
        assert_eq!(body["_meta"]["question"], "Is room rent capped?");
    }

    #[tokio::test]
    async fn test_get_ask_with_query_params() {
        let (status, body) = send(
            app(true, PathBuf::from("/nonexistent")).await,
            get("/ask?q=Is%20room%20rent%20capped%3F&top_k=3&filename=other"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["covered"], "Unknown");
        assert_eq!(body["_meta"]["chunks_retrieved"], 0);
    }

    #[tokio::test]
    async fn test_ask_validation() {
        let dir = PathBuf::from("/nonexistent");
        let (status, body) = send(app(true, dir.clone()).await, post_ask(serde_json::json!({"question": "hi"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");

        let long = "x".repeat(501);
        let (status, _) = send(app(true, dir.clone()).await, post_ask(serde_json::json!({"question": long}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            app(true, dir.clone()).await,
            post_ask(serde_json::json!({"question": "Is dental covered?", "top_k": 31})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"].as_str().unwrap().contains("top_k"));

        let (status, _) = send(app(true, dir.clone()).await, get("/ask")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let bad_json = Request::builder()
            .method("POST")
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app(true, dir).await, bad_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_health_reports_empty_store() {
        let dir = PathBuf::from("/nonexistent");
        let (_, body) = send(app(false, dir.clone()).await, get("/health")).await;
        assert_eq!(body["status"], "empty");
        assert_eq!(body["embeddings"], 0);

        let (_, body) = send(app(true, dir).await, get("/health")).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["embeddings"], 1);
        assert_eq!(body["model"], "fake-llm");
    }

    #[tokio::test]
    async fn test_stats_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zeta.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("Alpha.txt"), "text").unwrap();
        std::fs::write(dir.path().join("skip.csv"), "a,b").unwrap();

        let (_, stats) = send(app(true, dir.path().to_path_buf()).await, get("/stats")).await;
        assert_eq!(stats["total_chunks"], 1);
        assert_eq!(stats["embedding_model"], "unit");
        assert_eq!(stats["generation_available"], false);

        let (_, docs) = send(app(true, dir.path().to_path_buf()).await, get("/documents")).await;
        assert_eq!(docs["documents"], serde_json::json!(["Alpha.txt", "zeta.pdf"]));
    }
}
