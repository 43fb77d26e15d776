use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use corpus_core::{
    CdfPoint, Corpus, CorpusError, CorpusLoader, CorpusStats, DocumentSimilarity, DocumentSource, DocumentSummary,
    ProjectedDocument, SimilarWord, TokenCount, DEFAULT_TOP_N,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound on `n` for list endpoints.
const MAX_TOP_N: usize = 1000;

#[derive(Deserialize)]
pub struct SimilarParams {
    pub keyword: String,
    #[serde(default = "default_n")]
    pub n: usize,
}

#[derive(Deserialize)]
pub struct JaccardParams {
    #[serde(default)]
    pub exclude_self: bool,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct TopParams {
    #[serde(default = "default_n")]
    pub n: usize,
}

fn default_n() -> usize { DEFAULT_TOP_N }

#[derive(Serialize)]
pub struct ReloadResponse {
    pub documents: usize,
    pub tokens: usize,
    pub skipped: Vec<String>,
}

/// Rebuilds the served corpus from its source on request.
pub struct Reloader {
    pub loader: CorpusLoader,
    pub corpus_id: String,
    pub source: Box<dyn DocumentSource + Send + Sync>,
}

#[derive(Clone)]
pub struct AppState {
    corpus: Arc<RwLock<Arc<Corpus>>>,
    reloader: Option<Arc<Reloader>>,
    admin_token: Option<String>,
}

impl AppState {
    pub fn new(corpus: Corpus, admin_token: Option<String>) -> Self {
        Self { corpus: Arc::new(RwLock::new(Arc::new(corpus))), reloader: None, admin_token }
    }

    pub fn with_reloader(mut self, reloader: Reloader) -> Self {
        self.reloader = Some(Arc::new(reloader));
        self
    }

    /// The corpus currently served. Readers keep their snapshot even if a
    /// reload swaps in a new one mid-request.
    pub fn current(&self) -> Arc<Corpus> { self.corpus.read().clone() }
}

/// JSON error body with a status derived from the failure kind.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<CorpusError> for ApiError {
    fn from(err: CorpusError) -> Self {
        let status = match &err {
            CorpusError::NotFound { .. } => StatusCode::NOT_FOUND,
            CorpusError::EmptyCorpus => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "query failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        tracing::error!(error = %message, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats_handler))
        .route("/stats/token-lengths", get(token_lengths_handler))
        .route("/stats/common-tokens", get(common_tokens_handler))
        .route("/stats/document-lengths", get(document_lengths_handler))
        .route("/similar", get(similar_handler))
        .route("/jaccard/:doc_id", get(jaccard_handler))
        .route("/projection", get(projection_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/corpus/reload", post(reload_handler))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// CORS_ALLOW_ORIGIN (comma-separated) or any origin by default.
fn cors_layer() -> CorsLayer {
    let any = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                any
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => any,
    }
}

async fn stats_handler(State(state): State<AppState>) -> Json<CorpusStats> {
    Json(state.current().corpus_stats())
}

async fn token_lengths_handler(State(state): State<AppState>) -> Json<BTreeMap<usize, u64>> {
    Json(state.current().token_length_distribution())
}

async fn common_tokens_handler(State(state): State<AppState>, Query(params): Query<TopParams>) -> Json<Vec<TokenCount>> {
    Json(state.current().most_common_tokens(params.n.min(MAX_TOP_N)))
}

async fn document_lengths_handler(State(state): State<AppState>) -> Json<Vec<CdfPoint>> {
    Json(state.current().document_length_cdf())
}

async fn similar_handler(State(state): State<AppState>, Query(params): Query<SimilarParams>) -> ApiResult<Vec<SimilarWord>> {
    let corpus = state.current();
    Ok(Json(corpus.query().similar_words(&params.keyword, params.n.min(MAX_TOP_N))?))
}

async fn jaccard_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Query(params): Query<JaccardParams>,
) -> ApiResult<Vec<DocumentSimilarity>> {
    let corpus = state.current();
    let query = corpus.query();
    let mut rows = if params.exclude_self {
        query.jaccard_similarity_to_others(&doc_id)?
    } else {
        query.jaccard_similarity(&doc_id)?
    };
    if let Some(limit) = params.limit {
        rows.truncate(limit);
    }
    Ok(Json(rows))
}

async fn projection_handler(State(state): State<AppState>) -> ApiResult<Vec<ProjectedDocument>> {
    let corpus = state.current();
    let points = tokio::task::spawn_blocking(move || corpus.query().project_2d())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    Ok(Json(points))
}

async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> ApiResult<DocumentSummary> {
    Ok(Json(state.current().document_summary(&doc_id)?))
}

async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<ReloadResponse> {
    authorize(&state, &headers)?;
    let reloader = state
        .reloader
        .clone()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_IMPLEMENTED, "no corpus source configured"))?;

    let loaded = tokio::task::spawn_blocking(move || reloader.loader.rebuild(&reloader.corpus_id, reloader.source.as_ref()))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    let skipped = loaded.report.map(|r| r.skipped.into_iter().map(|s| s.document_id).collect()).unwrap_or_default();
    let response = ReloadResponse {
        documents: loaded.corpus.documents().len(),
        tokens: loaded.corpus.lexicon().token_count(),
        skipped,
    };
    *state.corpus.write() = Arc::new(loaded.corpus);
    tracing::info!(documents = response.documents, tokens = response.tokens, "corpus reloaded");
    Ok(Json(response))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
