//! HTTP routes.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use margin::{NoteCard, Sandbox, ThoughtStream, TreeNode, generate_notes};

use crate::error::{ApiError, ServerError};

/// Interval between SSE keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    sandbox: Sandbox,
    stream: ThoughtStream,
}

impl AppState {
    /// Create handler state.
    pub fn new(sandbox: Sandbox, stream: ThoughtStream) -> Self {
        Self { sandbox, stream }
    }
}

/// `?path=` query of file-scoped routes
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Path relative to the project directory
    pub path: String,
}

/// Body of the file preview route
#[derive(Debug, Serialize, Deserialize)]
pub struct FilePreview {
    /// Requested relative path
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// UTF-8 content
    pub content: String,
}

/// Body of the notes route
#[derive(Debug, Serialize, Deserialize)]
pub struct NotesResponse {
    /// Generated cards
    pub notes: Vec<NoteCard>,
}

/// Build the API router without CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/hello", get(hello))
        .route("/api/projects", get(list_projects))
        .route("/api/projects/{project}/tree", get(project_tree))
        .route("/api/projects/{project}/file", get(read_file))
        .route("/api/projects/{project}/notes", get(file_notes))
        .route("/api/projects/{project}/thoughts/stream", get(thought_stream))
        .with_state(state)
}

/// Build the API router with CORS restricted to `allowed_origins`.
pub fn app(state: AppState, allowed_origins: &[String]) -> Result<Router, ServerError> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ServerError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Ok(router(state).layer(cors))
}

async fn hello() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Hello from the Margin server" }))
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.sandbox.list_projects().await?))
}

async fn project_tree(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<TreeNode>, ApiError> {
    Ok(Json(state.sandbox.tree(&project).await?))
}

async fn read_file(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Json<FilePreview>, ApiError> {
    let file = state.sandbox.resolve_file(&project, &query.path).await?;
    let content = state.sandbox.read_text_file(&file).await?;

    Ok(Json(FilePreview {
        path: query.path,
        size: content.len() as u64,
        content,
    }))
}

async fn file_notes(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Json<NotesResponse>, ApiError> {
    let file = state.sandbox.resolve_file(&project, &query.path).await?;
    let generator = state.stream.generator();
    let notes = generate_notes(generator.as_ref(), &state.sandbox, &file).await?;

    Ok(Json(NotesResponse { notes }))
}

async fn thought_stream(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let file = state
        .sandbox
        .resolve_regular_file(&project, &query.path)
        .await?;

    tracing::info!(project = %project, path = %query.path, "opening thought stream");

    // The session ends on its own once the response body (and receiver) drops
    let (rx, _session) = state.stream.spawn(file);
    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(event));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}
