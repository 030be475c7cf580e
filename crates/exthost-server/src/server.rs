//! `ExtHostServer`: the Axum router and listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use exthost_broker::Broker;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Listening, ServerConfig, ServerError};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::run_extension_session;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    /// The broker every channel talks to.
    pub broker: Arc<Broker>,
    /// Transport settings.
    pub config: Arc<ServerConfig>,
    /// Open extension sockets.
    pub channels: Arc<AtomicUsize>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server was created.
    pub start_time: Instant,
}

/// WebSocket front end of one broker.
pub struct ExtHostServer {
    state: AppState,
}

impl ExtHostServer {
    /// Create a server for `broker`.
    pub fn new(config: ServerConfig, broker: Arc<Broker>) -> Self {
        Self {
            state: AppState {
                broker,
                config: Arc::new(config),
                channels: Arc::new(AtomicUsize::new(0)),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
            },
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve until [`ShutdownCoordinator::shutdown`] is called.
    ///
    /// Returns the bound address and the serving task.
    pub async fn listen(&self) -> Result<Listening, ServerError> {
        let addr = self.state.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "server stopped with error");
            }
        });

        info!(%local, "extension host listening");
        Ok((local, handle))
    }

    /// The broker behind this server.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.state.broker
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Open extension sockets.
    pub fn channel_count(&self) -> usize {
        self.state.channels.load(Ordering::Relaxed)
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let channels = state.channels.load(Ordering::Relaxed);
    Json(health::health_check(state.start_time, channels, &state.broker.stats()))
}

/// GET /ws
///
/// The upgrade request's `Origin` header is the channel's origin claim.
async fn ws_handler(ws: WebSocketUpgrade, headers: HeaderMap, State(state): State<AppState>) -> impl IntoResponse {
    let origin_claim = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let shutdown = Arc::clone(&state.shutdown);
    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| async move {
            shutdown.spawn_session(run_extension_session(socket, origin_claim, state));
        })
}
