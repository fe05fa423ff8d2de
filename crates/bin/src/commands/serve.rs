//! Serve command - runs the Livetree HTTP and WebSocket server.

use axum::{
    Json, Router,
    extract::{
        Path as UrlPath, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

use livetree::{Store, WatchEvent};

use crate::backend::{db_path, open_store, save_store};
use crate::cli::ServeArgs;

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Store,
}

/// Run the Livetree server
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("livetree=info".parse()?))
        .init();

    let prefix = normalize_prefix(&args.prefix)?;
    let json_path = db_path(args);
    let store = open_store(&json_path).await?;
    let app = router(store.clone(), &prefix);

    // Bind server
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    println!("Livetree server listening on http://{local_addr}");
    println!();
    println!("Available endpoints:");
    println!("  GET    {prefix}/<path>  - Read the document at <path>");
    println!("  PUT    {prefix}/<path>  - Replace the document at <path>");
    println!("  POST   {prefix}/<path>  - Add a child with a generated key");
    println!("  DELETE {prefix}/<path>  - Remove the document at <path>");
    println!("  GET    /watch/<path>  - WebSocket stream of changes");
    println!("  GET    /health        - Health check");
    println!();
    println!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Saved after the server has stopped accepting writes.
    save_store(&store, &json_path).await;
    println!("Server shut down");
    Ok(())
}

/// `/db/`, `db` and `/db` all mean `/db`.
///
/// An empty prefix is rejected: documents served from `/` would collide with
/// `/health` and `/watch`.
fn normalize_prefix(prefix: &str) -> Result<String, String> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Err(format!(
            "invalid prefix {prefix:?}: documents cannot be served from the root"
        ));
    }
    Ok(format!("/{trimmed}"))
}

/// Builds the routes. `prefix` must come from [`normalize_prefix`].
fn router(store: Store, prefix: &str) -> Router {
    Router::new()
        .route("/health", get(handle_health_endpoint))
        .route("/watch", get(watch_root))
        .route("/watch/{*path}", get(watch_document))
        .route(
            prefix,
            get(get_root).put(put_root).post(push_root).delete(delete_root),
        )
        .route(
            &format!("{prefix}/{{*path}}"),
            get(get_document)
                .put(put_document)
                .post(push_document)
                .delete(delete_document),
        )
        .with_state(AppState { store })
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("Failed to set up SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
    }
}

// ============================================================================
// Document Handlers
// ============================================================================

/// Store errors rendered as JSON responses.
struct ApiError(livetree::Error);

impl From<livetree::Error> for ApiError {
    fn from(err: livetree::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_encoding_error() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(module = self.0.module(), "Request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Handler for GET {prefix}/{*path}
async fn get_document(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
) -> Result<Response, ApiError> {
    match state.store.get(&path).await? {
        Some(document) => Ok(Json(document.to_json()).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()),
    }
}

/// Handler for PUT {prefix}/{*path}
async fn put_document(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    state.store.put(&path, value).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST {prefix}/{*path}
async fn push_document(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = state.store.push(&path, value).await?;
    Ok(Json(json!({ "name": name })))
}

/// Handler for DELETE {prefix}/{*path}
async fn delete_document(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_root(state: State<AppState>) -> Result<Response, ApiError> {
    get_document(state, UrlPath(String::new())).await
}

async fn put_root(
    state: State<AppState>,
    body: Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    put_document(state, UrlPath(String::new()), body).await
}

async fn push_root(
    state: State<AppState>,
    body: Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    push_document(state, UrlPath(String::new()), body).await
}

async fn delete_root(state: State<AppState>) -> Result<StatusCode, ApiError> {
    delete_document(state, UrlPath(String::new())).await
}

// ============================================================================
// Watch and Health Handlers
// ============================================================================

/// A watch event as sent over the socket.
#[derive(Serialize)]
struct WireEvent<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    data: serde_json::Value,
}

impl<'a> From<&'a WatchEvent> for WireEvent<'a> {
    fn from(event: &'a WatchEvent) -> Self {
        let data = match event {
            WatchEvent::Value(document) => document
                .as_ref()
                .map_or(serde_json::Value::Null, |document| document.to_json()),
            WatchEvent::ChildAdded { value, .. }
            | WatchEvent::ChildChanged { value, .. }
            | WatchEvent::ChildRemoved { value, .. } => value.to_json(),
            WatchEvent::Error(message) => serde_json::Value::String(message.clone()),
        };
        Self {
            event: event.name(),
            key: event.key(),
            data,
        }
    }
}

/// Handler for GET /watch/{*path} - WebSocket change stream
async fn watch_document(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_watch(socket, state.store, path))
}

async fn watch_root(state: State<AppState>, ws: WebSocketUpgrade) -> Response {
    watch_document(state, UrlPath(String::new()), ws).await
}

async fn stream_watch(mut socket: WebSocket, store: Store, path: String) {
    let mut watch = match store.watch(&path).await {
        Ok(watch) => watch,
        Err(e) => {
            tracing::warn!(%path, "Failed to open watch: {e}");
            let event = WatchEvent::Error(e.to_string());
            let _ = send_event(&mut socket, &event).await;
            return;
        }
    };
    tracing::info!(%path, "Watch connected");

    loop {
        tokio::select! {
            event = watch.recv() => {
                let Some(event) = event else { break };
                let terminal = matches!(event, WatchEvent::Error(_));
                if send_event(&mut socket, &event).await.is_err() || terminal {
                    break;
                }
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    watch.close();
    tracing::info!(%path, "Watch disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &WatchEvent) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(&WireEvent::from(event)) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode watch event: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    watches: usize,
}

/// Handler for GET /health - Health check endpoint
async fn handle_health_endpoint(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        watches: state.store.watch_count(),
    })
}
