use anyhow::{bail, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use mmdb_core::{
    ColumnSpec, CsvDirectory, Engine, EngineConfig, EngineError, ErrorKind, IndexRegistry, IndexStatus, RowSource,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<i64>,
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

fn default_file_name() -> String { "spotify_songs".to_string() }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub file_name: String,
    pub took_s: f64,
    /// Milliseconds, the field the web front end reads.
    pub execution_time: f64,
    pub total_hits: usize,
    pub result_count: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    /// Display columns keyed by header name, kept apart from the hit's own keys.
    pub fields: BTreeMap<String, String>,
    pub snippet: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub file: String,
    pub doc_id_idx: i64,
    pub text_column_idx: i64,
    /// Extra columns carried into results as display fields.
    #[serde(default)]
    pub field_idxs: Vec<i64>,
}

#[derive(Serialize)]
pub struct BuildResponse {
    pub success: bool,
    pub message: String,
    pub corpus_name: String,
    pub doc_count: usize,
    pub term_count: usize,
    pub malformed_row_count: usize,
    pub build_time_ms: f64,
}

/// Engine failures rendered as JSON with a status matching their kind.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// Request body or query string that could not be decoded.
    BadRequest(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self { ApiError::Engine(err) }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Engine(err) => {
                let status = match err {
                    EngineError::CorpusNotFound(_) | EngineError::IndexNotFound(_) => StatusCode::NOT_FOUND,
                    EngineError::BuildInProgress(_) | EngineError::Cancelled(_) => StatusCode::CONFLICT,
                    EngineError::DuplicateDocumentId { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    _ if err.kind() == ErrorKind::Input => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "InvalidRequest", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal", msg.clone()),
        };
        if status.is_server_error() {
            tracing::error!(kind, %message, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message, "kind": kind }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

/// Serve CSV corpora found under `data_dir`.
pub fn build_app(data_dir: String, config: EngineConfig) -> Result<Router> {
    let source = CsvDirectory::new(&data_dir);
    if !source.root().is_dir() {
        bail!("data directory {data_dir} does not exist");
    }
    let engine = Engine::new(IndexRegistry::new(), Arc::new(source), config);
    Ok(router(engine))
}

pub fn router(engine: Engine) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sources", get(sources_handler))
        .route("/index", post(build_handler))
        .route("/indexes", get(indexes_handler))
        .route("/index/:corpus/build", delete(cancel_handler))
        .route("/search", get(search_handler))
        .route("/search/text", post(search_json_handler))
        .route("/doc/:corpus/:doc_id", get(doc_handler))
        .with_state(AppState { engine })
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn build_handler(
    State(state): State<AppState>,
    req: Result<Json<BuildRequest>, JsonRejection>,
) -> Result<Json<BuildResponse>, ApiError> {
    let Json(req) = req?;
    let spec = req.field_idxs.iter().fold(ColumnSpec::new(req.doc_id_idx, req.text_column_idx), |s, &c| s.with_field(c));
    let engine = state.engine.clone();
    let file = req.file.trim().to_string();
    // Ingestion blocks on file I/O; keep it off the async workers.
    let summary = tokio::task::spawn_blocking(move || engine.build_index(&file, &spec))
        .await
        .map_err(|e| ApiError::Internal(format!("build task failed: {e}")))??;
    let build_time_ms = summary.build_duration.as_secs_f64() * 1000.0;
    Ok(Json(BuildResponse {
        success: true,
        message: format!("Index built successfully for \"{}\" in {}ms", summary.corpus_name, build_time_ms.round()),
        corpus_name: summary.corpus_name,
        doc_count: summary.doc_count,
        term_count: summary.term_count,
        malformed_row_count: summary.malformed_row_count,
        build_time_ms,
    }))
}

pub async fn search_handler(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params?;
    run_search(&state, params)
}

pub async fn search_json_handler(
    State(state): State<AppState>,
    params: Result<Json<SearchParams>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(params) = params?;
    run_search(&state, params)
}

fn run_search(state: &AppState, params: SearchParams) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let k = params.k.unwrap_or(state.engine.config().default_k as i64);
    let outcome = state.engine.search(&params.file_name, &params.q, k)?;
    let results = outcome
        .results
        .into_iter()
        .map(|d| SearchHit { doc_id: d.doc_id, score: d.score, fields: d.fields, snippet: d.snippet })
        .collect();
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse {
        query: params.q,
        file_name: params.file_name,
        took_s: elapsed.as_secs_f64(),
        execution_time: elapsed.as_secs_f64() * 1000.0,
        total_hits: outcome.total_hits,
        result_count: outcome.result_count,
        results,
    }))
}

pub async fn indexes_handler(State(state): State<AppState>) -> Json<Vec<IndexStatus>> {
    Json(state.engine.registry().list())
}

pub async fn sources_handler(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.engine.source().list_sources()?))
}

pub async fn cancel_handler(State(state): State<AppState>, Path(corpus): Path<String>) -> StatusCode {
    if state.engine.registry().cancel_build(&corpus) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path((corpus, doc_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let artifact = state.engine.registry().get(&corpus)?;
    let resp = match artifact.document(&doc_id) {
        Some(doc) => Json(serde_json::json!({
            "doc_id": doc.doc_id,
            "length": doc.length,
            "fields": doc.fields,
            "text": doc.text,
        }))
        .into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found", "kind": "DocumentNotFound" }))).into_response(),
    };
    Ok(resp)
}
