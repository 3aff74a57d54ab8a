//! HTTP and WebSocket routes for the restream server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        rejection::{JsonRejection, QueryRejection},
        ws::{Message, WebSocket},
    },
    http::{HeaderValue, Method, header},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use restream_core::Supervisor;
use tokio::sync::{broadcast, watch};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::{ServerError, ServerResult};
use crate::notifier::StreamsBroadcaster;
use crate::protocol::{
    ServerMessage, StartRequest, StartResponse, StatusResponse, StopQuery, StopResponse,
    StreamsResponse,
};

/// Application state shared across handlers.
pub struct AppState {
    /// Job supervisor.
    pub supervisor: Supervisor,
    /// Source of `streams_update` pushes; the supervisor publishes into it.
    pub broadcaster: Arc<StreamsBroadcaster>,
    /// Origin allowed by the CORS layer.
    allowed_origin: HeaderValue,
    /// Flipped to `true` when the server shuts down so WebSocket tasks exit.
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(
        supervisor: Supervisor,
        broadcaster: Arc<StreamsBroadcaster>,
        allowed_origin: &str,
    ) -> ServerResult<Self> {
        let allowed_origin = HeaderValue::from_str(allowed_origin).map_err(|_| {
            ServerError::Config(format!("invalid allowed origin: {}", allowed_origin))
        })?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            supervisor,
            broadcaster,
            allowed_origin,
            shutdown,
        })
    }

    /// Close every WebSocket connection.
    pub fn close_connections(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(state.allowed_origin.clone()))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/stream/start", post(start_handler))
        .route("/api/stream/stop", post(stop_handler))
        .route("/api/stream/status/{*url}", get(status_handler))
        .route("/api/streams", get(streams_handler))
        .layer(cors)
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Start a relay job.
async fn start_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> ServerResult<Json<StartResponse>> {
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let job = state.supervisor.start(&request).await?;

    Ok(Json(StartResponse {
        status: "success".to_string(),
        message: "stream started".to_string(),
        pid: job.pid,
    }))
}

/// Stop a relay job.
async fn stop_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StopQuery>, QueryRejection>,
) -> ServerResult<Json<StopResponse>> {
    let Query(StopQuery { url }) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let outcome = state.supervisor.stop(&url).await?;
    tracing::debug!("Stop for {} finished: {:?}", url, outcome);

    Ok(Json(StopResponse {
        status: "success".to_string(),
        message: "stream stopped".to_string(),
    }))
}

/// Status of one job. Always 200; absence is reported in the body.
async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(url): Path<String>,
) -> Json<StatusResponse> {
    match state.supervisor.status(&url).await {
        Ok(snapshot) => Json(StatusResponse::from_snapshot(&snapshot)),
        Err(_) => Json(StatusResponse::not_found()),
    }
}

/// List every job.
async fn streams_handler(State(state): State<Arc<AppState>>) -> Json<StreamsResponse> {
    Json(StreamsResponse {
        streams: state.supervisor.list().await,
    })
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Push `streams_update` messages until the client leaves or the server stops.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the list so no update falls in between.
    let mut rx = state.broadcaster.subscribe();
    let mut shutdown = state.shutdown.subscribe();
    tracing::info!("WebSocket client connected");

    let initial = ServerMessage::StreamsUpdate {
        streams: state.supervisor.list().await,
    };
    if send_message(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = rx.recv() => {
                let msg = match update {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("WebSocket client lagged by {} updates", skipped);
                        ServerMessage::StreamsUpdate {
                            streams: state.supervisor.list().await,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if send_message(&mut sender, &msg).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        break;
                    }
                    // Clients only listen.
                    Some(Ok(_)) => {}
                }
            }
            _ = async { shutdown.wait_for(|stopping| *stopping).await.map(|_| ()) } => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    tracing::info!("WebSocket client disconnected");
}

/// Send a server message through the WebSocket.
async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> ServerResult<()> {
    let json = serde_json::to_string(msg)?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| ServerError::Io(std::io::Error::other(e)))
}
