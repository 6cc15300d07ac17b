//! Relay server listener
//!
//! Serves the HTTP routes and upgrades `/room/{room_id}` requests into
//! relay connections.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::registry::{ConnectionRegistry, RoomId};
use crate::server::config::ServerConfig;
use crate::server::connection::run_connection;
use crate::server::handler::RelayHandler;
use crate::session::LifecycleDispatcher;

/// Room relay server
pub struct RelayServer<H: RelayHandler = ()> {
    config: Arc<ServerConfig>,
    dispatcher: Arc<LifecycleDispatcher<H>>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

/// Shared state handed to route handlers
struct RelayState<H: RelayHandler> {
    config: Arc<ServerConfig>,
    dispatcher: Arc<LifecycleDispatcher<H>>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<H: RelayHandler> Clone for RelayState<H> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            dispatcher: Arc::clone(&self.dispatcher),
            connection_semaphore: self.connection_semaphore.clone(),
        }
    }
}

impl<H: RelayHandler> RelayServer<H> {
    /// Create a new server with the given configuration and handler
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_config(config.registry.clone()));

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(LifecycleDispatcher::new(registry, handler)),
            connection_semaphore,
        }
    }

    /// Get the lifecycle dispatcher
    pub fn dispatcher(&self) -> &Arc<LifecycleDispatcher<H>> {
        &self.dispatcher
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.dispatcher.registry()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Build the HTTP router
    ///
    /// Must be served with `into_make_service_with_connect_info::<SocketAddr>`.
    pub fn router(&self) -> Router {
        let state = RelayState {
            config: Arc::clone(&self.config),
            dispatcher: Arc::clone(&self.dispatcher),
            connection_semaphore: self.connection_semaphore.clone(),
        };

        Router::new()
            .route("/room/{room_id}", get(upgrade::<H>))
            .route("/room/{room_id}/", get(upgrade::<H>))
            .route("/healthz", get(|| async { "ok" }))
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every live connection is closed.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

        let closed = self
            .registry()
            .for_each_matching(|_| true, |c| {
                c.close();
            })
            .await;
        tracing::info!(connections = closed, "Relay server stopped");

        Ok(())
    }
}

async fn upgrade<H: RelayHandler>(
    State(state): State<RelayState<H>>,
    Path(room_id): Path<String>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let room = match RoomId::new(room_id) {
        Ok(room) => room,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    // Check connection limit
    let permit = match state.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                state.dispatcher.metrics().record_rejection();
                tracing::warn!(peer = %peer_addr, room = %room, "Connection rejected: limit reached");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
        None => None,
    };

    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_failed_upgrade(move |e| {
            tracing::debug!(peer = %peer_addr, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let _permit = permit;
            run_connection(socket, state.dispatcher, state.config, room, Some(peer_addr)).await;
        })
}
