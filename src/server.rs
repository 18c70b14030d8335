//! JSON HTTP API.
//!
//! Exposes search, redaction and document retrieval over HTTP. The server
//! opens one SQLite pool at startup and shares it across requests.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Tiered search, grouped by year |
//! | `POST` | `/redact` | Redact text with the current blocklist |
//! | `GET`  | `/documents/{id}` | Sanitized document view |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "limit must be between 1 and 100" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use note_vault_core::ranking::ResultPage;
use note_vault_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::documents::DocumentView;
use crate::search::{search_with, SearchParams};
use crate::sqlite_store::SqliteStore;
use crate::terms;

const MAX_LIMIT: usize = 100;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// `None` when the database did not exist at startup.
    store: Option<Arc<SqliteStore>>,
}

/// Builds the router over a freshly opened store.
pub async fn build_router(config: &Config) -> anyhow::Result<Router> {
    let store = match db::open_existing(config).await? {
        Some(pool) => {
            crate::migrate::apply_schema(&pool).await?;
            Some(Arc::new(SqliteStore::new(pool)))
        }
        None => None,
    };

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/search", post(handle_search))
        .route("/redact", post(handle_redact))
        .route("/documents/{id}", get(handle_get_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = build_router(config).await?;
    let bind_addr = &config.server.bind;

    println!("Note Vault server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl AppState {
    fn store(&self) -> Result<&SqliteStore, AppError> {
        self.store
            .as_deref()
            .ok_or_else(|| internal("database unavailable"))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    query: String,
    year: Option<i32>,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
    #[serde(default)]
    all: bool,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<ResultPage>, AppError> {
    if let Some(limit) = body.limit {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(bad_request(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
    }

    let params = SearchParams {
        query: body.query,
        year: body.year,
        offset: body.offset,
        limit: body.limit,
        all: body.all,
    };
    let page = search_with(&state.config, state.store.as_deref(), &params).await;
    Ok(Json(page))
}

// ============ POST /redact ============

#[derive(Debug, Deserialize)]
struct RedactBody {
    text: String,
}

#[derive(Serialize)]
struct RedactResponse {
    text: String,
    redactions: usize,
}

async fn handle_redact(
    State(state): State<AppState>,
    Json(body): Json<RedactBody>,
) -> Result<Json<RedactResponse>, AppError> {
    let store = state.store()?;
    let redactor = terms::load_redactor(store.pool(), &state.config)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let redactions = redactor.spans(&body.text).len();
    Ok(Json(RedactResponse {
        text: redactor.redact(&body.text),
        redactions,
    }))
}

// ============ GET /documents/{id} ============

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, AppError> {
    let store = state.store()?;
    match store.get_document(&id).await {
        Ok(Some(doc)) => Ok(Json(DocumentView::from_document(doc, false))),
        Ok(None) => Err(not_found(format!("document not found: {}", id))),
        Err(e) => Err(internal(e.to_string())),
    }
}
