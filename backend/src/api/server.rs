//! HTTP Server for the orgload API.
//!
//! # API Endpoints
//!
//! | Method | Path                         | Description                     |
//! |--------|------------------------------|---------------------------------|
//! | GET    | `/health`                    | Health check                    |
//! | POST   | `/api/organizations/import`  | Upload a CSV file for import    |
//! | GET    | `/api/organizations`         | List stored organizations       |
//! | GET    | `/api/logs`                  | SSE stream for real-time logs   |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{bulk_insert_response, error_response, rejected_response, ImportResponse};
use crate::config::{ImportOptions, RowErrorPolicy};
use crate::error::{ImportError, ImportResult, ServerError, ServerResult};
use crate::import::{import, ImportOutcome};
use crate::models::StoredOrganization;
use crate::parser::Source;
use crate::store::Store;

type ApiError = (StatusCode, Json<Value>);

/// Shared server state. The store is behind a mutex so imports run one at a time.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
    options: ImportOptions,
}

impl AppState {
    pub fn new(store: Store, options: ImportOptions) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            options,
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut Store) -> T) -> ServerResult<T> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| ServerError::Internal("store lock poisoned".into()))?;
        Ok(f(&mut store))
    }
}

/// Build the router with CORS and all routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/organizations/import", post(import_organizations))
        .route("/api/organizations", get(list_organizations))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, store: Store, options: ImportOptions) -> ServerResult<()> {
    let app = router(AppState::new(store, options));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Orgload server running on http://localhost:{}", port);
    println!("   POST /api/organizations/import - Upload CSV file");
    println!("   GET  /api/organizations        - List organizations");
    println!("   GET  /api/logs                 - SSE log stream");
    println!("   GET  /health                   - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "orgload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "import": "POST /api/organizations/import",
            "list": "GET /api/organizations",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// List every stored organization with its addresses
async fn list_organizations(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredOrganization>>, ApiError> {
    let organizations = tokio::task::spawn_blocking(move || {
        state.with_store(|store| store.list_organizations())
    })
    .await
    .map_err(|e| api_error(ServerError::Internal(e.to_string())))?
    .map_err(api_error)?
    .map_err(|e| api_error(ServerError::Import(e.into())))?;

    Ok(Json(organizations))
}

/// Import endpoint: multipart `file` field
async fn import_organizations(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(ServerError::BadRequest(format!("Multipart error: {}", e))))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| api_error(ServerError::BadRequest(format!("Read error: {}", e))))?
                    .to_vec(),
            );
        }
    }

    let bytes = file_data
        .ok_or_else(|| api_error(ServerError::BadRequest("No file provided".into())))?;

    log_info(format!(
        "📄 New upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let policy = state.options.row_errors;
    let result = tokio::task::spawn_blocking(move || {
        let source = Source::bytes(bytes);
        state.with_store(|store| import(&source, store, &state.options, Utc::now()))
    })
    .await
    .map_err(|e| api_error(ServerError::Internal(e.to_string())))?
    .map_err(api_error)?;

    Ok(import_response(result, policy))
}

/// Map an import result to a status code and JSON body.
fn import_response(result: ImportResult<ImportOutcome>, policy: RowErrorPolicy) -> (StatusCode, Json<Value>) {
    match result {
        Ok(ImportOutcome::Malformed(error)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(rejected_response(std::slice::from_ref(&error))),
        ),
        Ok(ImportOutcome::Processed(summary))
            if policy == RowErrorPolicy::RejectAll && !summary.errors.is_empty() =>
        {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(rejected_response(&summary.errors)),
            )
        }
        Ok(ImportOutcome::Processed(summary)) => {
            let status = if summary.written {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let body = serde_json::to_value(ImportResponse::from(summary))
                .unwrap_or_else(|e| error_response(&e.to_string()));
            (status, Json(body))
        }
        Err(err) => api_error(ServerError::Import(err)),
    }
}

/// Status code and JSON body for a server error.
fn api_error(err: ServerError) -> ApiError {
    log_error(format!("❌ {}", err));

    match &err {
        ServerError::BadRequest(_) => (
            StatusCode::BAD_REQUEST,
            Json(error_response(&err.to_string())),
        ),
        ServerError::Import(ImportError::BulkInsert(bulk)) => {
            (StatusCode::CONFLICT, Json(bulk_insert_response(bulk)))
        }
        ServerError::Import(_) | ServerError::Internal(_) | ServerError::Io(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&err.to_string())),
        ),
    }
}
