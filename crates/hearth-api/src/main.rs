//! Hearth - graph automation API server

use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use device_bridge::{DeviceAdapter, HomeAssistantClient, MemoryAdapter, TasmotaClient};
use graph_engine::{
    register_builtins, AuditConfig, Clock, EngineConfig, FrontendArbiter, GraphDocument,
    GraphEngine, NodeRegistry, NodeServices, SharedBuffer, StateAudit,
};

mod websocket;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GraphEngine>,
    pub graph_path: Arc<PathBuf>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System info response
#[derive(Serialize)]
struct SystemInfo {
    name: String,
    version: String,
    graph_path: String,
}

/// Graph upload body
#[derive(Deserialize)]
struct LoadGraphRequest {
    document: GraphDocument,
}

/// Frontend takeover body
#[derive(Deserialize)]
struct FrontendActiveRequest {
    active: bool,
}

/// Reload body; omitting `path` re-reads the boot graph file
#[derive(Deserialize)]
struct ReloadRequest {
    path: Option<String>,
}

/// Get system info
async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(SystemInfo {
        name: "Hearth".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        graph_path: state.graph_path.display().to_string(),
    }))
}

/// Get engine status
async fn engine_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.status()))
}

/// Start the tick loop
async fn engine_start(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.start() {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(state.engine.status())),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// Stop the tick loop
async fn engine_stop(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.stop();
    Json(ApiResponse::success(state.engine.status()))
}

/// Run a single evaluation pass
async fn engine_tick(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.force_tick().await;
    Json(ApiResponse::success(state.engine.status()))
}

/// Export the currently loaded graph
async fn get_graph(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.export_document().await))
}

/// Replace the loaded graph with an uploaded document and persist it
async fn put_graph(
    State(state): State<AppState>,
    Json(req): Json<LoadGraphRequest>,
) -> impl IntoResponse {
    let summary = state.engine.hot_reload(&req.document).await;
    if let Err(e) = persist_document(&state.graph_path, &req.document).await {
        tracing::warn!("Failed to persist graph to {}: {}", state.graph_path.display(), e);
    }
    Json(ApiResponse::success(summary))
}

/// Re-read a graph file from disk and swap it in
async fn reload_graph(
    State(state): State<AppState>,
    body: Option<Json<ReloadRequest>>,
) -> impl IntoResponse {
    let path = body
        .and_then(|Json(req)| req.path.map(PathBuf::from))
        .unwrap_or_else(|| state.graph_path.as_ref().clone());
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                ))),
            )
        }
    };
    let doc: GraphDocument = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("invalid graph document: {e}"))),
            )
        }
    };
    let summary = state.engine.hot_reload(&doc).await;
    (StatusCode::OK, Json(ApiResponse::success(summary)))
}

/// List registered node types
async fn node_types(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.registry().list()))
}

/// Snapshot of the shared buffer
async fn buffer_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(
        state.engine.services().buffer.snapshot(),
    ))
}

/// Frontend takes or releases device control
async fn frontend_active(
    State(state): State<AppState>,
    Json(req): Json<FrontendActiveRequest>,
) -> impl IntoResponse {
    state.engine.services().arbiter.set_active(req.active);
    Json(ApiResponse::success(
        serde_json::json!({ "active": req.active }),
    ))
}

/// Keep the frontend's device-control claim alive
async fn frontend_heartbeat(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.services().arbiter.heartbeat();
    Json(ApiResponse::success(serde_json::json!({ "ok": true })))
}

/// Most recent state audit report
async fn audit_report(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.services().audit.last_report() {
        Some(report) => Json(ApiResponse::success(report)),
        None => Json(ApiResponse::success(
            serde_json::json!({ "generated_at": null, "checked": 0, "mismatches": [] }),
        )),
    }
}

/// Run a state audit pass right now
async fn audit_run(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.engine.services().audit.run_once().await;
    Json(ApiResponse::success(report))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Write the document atomically next to wherever the graph file lives
async fn persist_document(path: &std::path::Path, doc: &GraphDocument) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Pick a device backend from the environment
fn build_adapter() -> Arc<dyn DeviceAdapter> {
    if let Ok(url) = std::env::var("HASS_URL") {
        let token = std::env::var("HASS_TOKEN").unwrap_or_default();
        if token.is_empty() {
            tracing::warn!("HASS_URL is set without HASS_TOKEN, requests will be rejected");
        }
        tracing::info!("Using Home Assistant backend at {}", url);
        return Arc::new(HomeAssistantClient::new(url, token));
    }
    if let Ok(spec) = std::env::var("TASMOTA_PLUGS") {
        let client = TasmotaClient::from_route_spec(&spec);
        tracing::info!("Using Tasmota backend with {} plugs", client.plug_count());
        return Arc::new(client);
    }
    tracing::warn!("No device backend configured (set HASS_URL or TASMOTA_PLUGS), using in-memory devices");
    Arc::new(MemoryAdapter::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth_api=debug,graph_engine=debug,info".into()),
        )
        .init();

    tracing::info!("Starting Hearth API server");

    let graph_path = PathBuf::from(
        std::env::var("HEARTH_GRAPH").unwrap_or_else(|_| "./data/graph.json".to_string()),
    );
    let port: u16 = std::env::var("HEARTH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let devices = build_adapter();
    let audit = Arc::new(StateAudit::new(devices.clone(), AuditConfig::default()));
    audit.start();

    let services = Arc::new(NodeServices {
        buffer: Arc::new(SharedBuffer::new()),
        devices,
        arbiter: Arc::new(FrontendArbiter::new()),
        audit,
        clock: Clock::system(),
    });
    let mut registry = NodeRegistry::new();
    register_builtins(&mut registry);
    let engine = Arc::new(GraphEngine::new(
        Arc::new(registry),
        services,
        EngineConfig::default(),
    ));

    // Load and start the saved graph, if there is one; the server comes up
    // either way so a frontend can upload a graph later
    if graph_path.exists() {
        match engine.load_graph(&graph_path).await {
            Ok(summary) if summary.loaded > 0 => {
                if let Err(e) = engine.start() {
                    tracing::warn!("Engine not started: {}", e);
                }
            }
            Ok(_) => tracing::info!("Graph file has no runnable nodes, engine idle"),
            Err(e) => tracing::warn!("Could not load graph at boot: {}", e),
        }
    } else {
        tracing::info!("No graph file at {}, waiting for upload", graph_path.display());
    }

    let state = AppState {
        engine,
        graph_path: Arc::new(graph_path),
    };

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/system/info", get(system_info))
        .route("/api/v1/engine/status", get(engine_status))
        .route("/api/v1/engine/start", post(engine_start))
        .route("/api/v1/engine/stop", post(engine_stop))
        .route("/api/v1/engine/tick", post(engine_tick))
        .route("/api/v1/engine/graph", get(get_graph).post(put_graph))
        .route("/api/v1/engine/reload", post(reload_graph))
        .route("/api/v1/engine/node-types", get(node_types))
        .route("/api/v1/buffer", get(buffer_snapshot))
        .route("/api/v1/frontend/active", post(frontend_active))
        .route("/api/v1/frontend/heartbeat", post(frontend_heartbeat))
        .route("/api/v1/audit/report", get(audit_report))
        .route("/api/v1/audit/run", post(audit_run))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
