//! Lifecycle dispatcher
//!
//! Turns transport events (connect, message, disconnect, error) into
//! registry mutations and broadcasts, driving each connection through its
//! state machine.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::context::SessionContext;
use super::state::{ConnectionPhase, SessionState};
use crate::broadcast::{BroadcastEngine, BroadcastReport};
use crate::error::{Error, Result};
use crate::registry::{Connection, ConnectionId, ConnectionRegistry, RelayFrame, RoomId};
use crate::server::handler::RelayHandler;
use crate::stats::{RelayMetrics, ServerStats};

/// One connection as seen by its own task
///
/// Pairs the task-local state machine with the shared registry handle.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    connection: Arc<Connection>,
}

impl Session {
    /// Get the connection id
    pub fn id(&self) -> ConnectionId {
        self.state.id
    }

    /// Get the room
    pub fn room(&self) -> &RoomId {
        &self.state.room
    }

    /// Get the current phase
    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase
    }

    /// Get the state machine
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Get the registry handle
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Build a handler context
    pub fn context(&self) -> SessionContext {
        SessionContext::from(&self.state)
    }
}

/// Routes transport events into the registry and broadcast engine
///
/// Owns no global state: the registry is injected, so several dispatchers
/// (and tests) can run side by side in one process.
pub struct LifecycleDispatcher<H: RelayHandler = ()> {
    registry: Arc<ConnectionRegistry>,
    engine: BroadcastEngine,
    handler: Arc<H>,
    metrics: Arc<RelayMetrics>,
    next_conn_id: AtomicU64,
}

impl<H: RelayHandler> LifecycleDispatcher<H> {
    /// Create a dispatcher over the given registry
    pub fn new(registry: Arc<ConnectionRegistry>, handler: H) -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        Self {
            engine: BroadcastEngine::new(Arc::clone(&registry), Arc::clone(&metrics)),
            registry,
            handler: Arc::new(handler),
            metrics,
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Get the registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the broadcast engine
    pub fn engine(&self) -> &BroadcastEngine {
        &self.engine
    }

    /// Get the handler
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Get the raw counters
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Snapshot of server-wide statistics
    pub async fn stats(&self) -> ServerStats {
        let active = self.registry.len().await;
        let rooms = self.registry.rooms().await.len();
        self.metrics.snapshot(active, rooms)
    }

    /// `Connecting → Open`
    ///
    /// Allocates an id, binds `room` for the connection's whole lifetime and
    /// registers it. Returns the session and the receiving end of its
    /// outbound queue, which the transport drains to the client.
    pub async fn connect(
        &self,
        room: RoomId,
        peer_addr: Option<SocketAddr>,
    ) -> Result<(Session, mpsc::Receiver<RelayFrame>)> {
        let id = ConnectionId::new(self.next_conn_id.fetch_add(1, Ordering::Relaxed));
        let mut state = SessionState::new(id, room, peer_addr);

        if !self.handler.on_connect(&SessionContext::from(&state)).await {
            self.metrics.record_rejection();
            tracing::info!(conn_id = %id, room = %state.room, "Connection rejected by handler");
            return Err(Error::Rejected);
        }

        let (connection, rx) = Connection::new(
            id,
            state.room.clone(),
            peer_addr,
            self.registry.config().outbound_capacity,
        );
        let connection = Arc::new(connection);

        self.registry.add(Arc::clone(&connection)).await?;
        state.open();
        self.metrics.record_connection();

        tracing::info!(
            conn_id = %id,
            room = %state.room,
            peer = ?peer_addr,
            "Connection opened"
        );

        Ok((Session { state, connection }, rx))
    }

    /// `Open → Open` on an inbound message
    ///
    /// Broadcasts to the rest of the room. Returns `None` when nothing was
    /// broadcast (session not open, evicted, or message refused by the
    /// handler).
    pub async fn on_message(
        &self,
        session: &mut Session,
        frame: RelayFrame,
    ) -> Option<BroadcastReport> {
        if !session.state.is_open() || session.connection.is_closed() {
            tracing::debug!(
                conn_id = %session.id(),
                phase = ?session.phase(),
                "Message on inactive connection ignored"
            );
            return None;
        }

        session.state.record_message(frame.len());
        self.metrics.record_message();

        if !self.handler.on_message(&session.context(), &frame).await {
            tracing::debug!(conn_id = %session.id(), "Message dropped by handler");
            return None;
        }

        Some(self.engine.broadcast(&session.connection, &frame).await)
    }

    /// `Open → Closed`
    ///
    /// Safe to call any number of times; only the first call unregisters the
    /// connection and runs the disconnect hook. Returns whether this call
    /// performed the transition.
    pub async fn on_disconnect(&self, session: &mut Session) -> bool {
        if !session.state.close() {
            return false;
        }

        // May already be gone if the broadcast engine evicted it
        self.registry.remove(session.id()).await;
        session.connection.close();

        self.handler.on_disconnect(&session.context()).await;

        tracing::info!(
            conn_id = %session.id(),
            room = %session.room(),
            messages = session.state.messages_received,
            duration_ms = session.state.duration().as_millis() as u64,
            "Connection closed"
        );

        true
    }

    /// Transport error on a live connection: implicit `Open → Closed`
    pub async fn on_error(&self, session: &mut Session, error: &Error) -> bool {
        tracing::warn!(
            conn_id = %session.id(),
            room = %session.room(),
            error = %error,
            "Connection error"
        );
        self.on_disconnect(session).await
    }

    /// Unregister a connection by id without its session
    ///
    /// Idempotent. The connection's own task notices the close latch and
    /// finishes the transition.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        self.registry.remove(id).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn room(name: &str) -> RoomId {
        RoomId::new(name).unwrap()
    }

    fn make_dispatcher() -> LifecycleDispatcher {
        LifecycleDispatcher::new(Arc::new(ConnectionRegistry::new()), ())
    }

    #[derive(Default)]
    struct CountingHandler {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl RelayHandler for CountingHandler {
        async fn on_connect(&self, ctx: &SessionContext) -> bool {
            self.connects.fetch_add(1, Ordering::SeqCst);
            ctx.room.as_str() != "closed"
        }

        async fn on_message(&self, _ctx: &SessionContext, frame: &RelayFrame) -> bool {
            frame.as_text() != Some("blocked")
        }

        async fn on_disconnect(&self, _ctx: &SessionContext) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_connect_registers_open_session() {
        let dispatcher = make_dispatcher();

        let (session, _rx) = assert_ok!(dispatcher.connect(room("lobby"), None).await);

        assert_eq!(session.phase(), ConnectionPhase::Open);
        assert_eq!(session.room().as_str(), "lobby");
        assert!(dispatcher.registry().contains(session.id()).await);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let dispatcher = make_dispatcher();

        let (a, _rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();
        let (b, _rx_b) = dispatcher.connect(room("lobby"), None).await.unwrap();

        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_message_reaches_room_only() {
        let dispatcher = make_dispatcher();
        let (mut a, mut rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();
        let (_b, mut rx_b) = dispatcher.connect(room("lobby"), None).await.unwrap();
        let (_c, mut rx_c) = dispatcher.connect(room("hall"), None).await.unwrap();

        let report = dispatcher
            .on_message(&mut a, RelayFrame::text("hi"))
            .await
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(rx_b.try_recv().unwrap().as_text(), Some("hi"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
        assert_eq!(a.state().messages_received, 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let dispatcher = make_dispatcher();
        let (mut a, _rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();

        assert!(dispatcher.on_disconnect(&mut a).await);
        assert!(!dispatcher.on_disconnect(&mut a).await);
        assert!(!dispatcher.disconnect(a.id()).await);

        assert_eq!(a.phase(), ConnectionPhase::Closed);
        assert!(dispatcher.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_session_cannot_send() {
        let dispatcher = make_dispatcher();
        let (mut a, _rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();
        let (_b, mut rx_b) = dispatcher.connect(room("lobby"), None).await.unwrap();

        dispatcher.on_disconnect(&mut a).await;

        assert!(dispatcher
            .on_message(&mut a, RelayFrame::text("ghost"))
            .await
            .is_none());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnected_peer_excluded() {
        let dispatcher = make_dispatcher();
        let (mut a, _rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();
        let (mut b, mut rx_b) = dispatcher.connect(room("lobby"), None).await.unwrap();

        dispatcher.on_disconnect(&mut b).await;
        let report = dispatcher
            .on_message(&mut a, RelayFrame::text("hi2"))
            .await
            .unwrap();

        assert_eq!(report.recipients, 0);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_on_error_closes() {
        let dispatcher = make_dispatcher();
        let (mut a, _rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();

        assert!(dispatcher.on_error(&mut a, &Error::HeartbeatTimeout).await);
        assert_eq!(a.phase(), ConnectionPhase::Closed);
        assert!(!dispatcher.on_error(&mut a, &Error::HeartbeatTimeout).await);
        assert!(dispatcher.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_disconnect_by_id_trips_latch() {
        let dispatcher = make_dispatcher();
        let (mut a, _rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();

        assert!(dispatcher.disconnect(a.id()).await);
        assert!(a.connection().is_closed());

        // The connection's task still completes its own transition
        assert!(dispatcher.on_disconnect(&mut a).await);
    }

    #[tokio::test]
    async fn test_handler_hooks() {
        let dispatcher =
            LifecycleDispatcher::new(Arc::new(ConnectionRegistry::new()), CountingHandler::default());

        assert!(matches!(
            assert_err!(dispatcher.connect(room("closed"), None).await),
            Error::Rejected
        ));

        let (mut a, _rx_a) = dispatcher.connect(room("lobby"), None).await.unwrap();
        let (mut b, mut rx_b) = dispatcher.connect(room("lobby"), None).await.unwrap();

        assert!(dispatcher
            .on_message(&mut a, RelayFrame::text("blocked"))
            .await
            .is_none());
        assert!(rx_b.try_recv().is_err());

        dispatcher.on_disconnect(&mut a).await;
        dispatcher.on_disconnect(&mut b).await;
        dispatcher.on_disconnect(&mut b).await;

        let handler = dispatcher.handler();
        assert_eq!(handler.connects.load(Ordering::SeqCst), 3);
        assert_eq!(handler.disconnects.load(Ordering::SeqCst), 2);

        let stats = dispatcher.stats().await;
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.rejected_connections, 1);
        assert_eq!(stats.active_connections, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifty_sessions_send_concurrently() {
        let dispatcher = Arc::new(make_dispatcher());

        let mut receivers = Vec::new();
        let mut joined = Vec::new();
        for _ in 0..50 {
            let (session, rx) = dispatcher.connect(room("lobby"), None).await.unwrap();
            receivers.push((session.id(), rx));
            joined.push(session);
        }

        let mut tasks = Vec::new();
        for session in joined {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                let mut session = session;
                let text = format!("msg-{}", session.id());
                dispatcher.on_message(&mut session, RelayFrame::text(text)).await;
                session
            }));
        }

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap());
        }

        for (id, rx) in &mut receivers {
            let mut count = 0;
            while let Ok(frame) = rx.try_recv() {
                assert_ne!(frame.as_text(), Some(format!("msg-{}", id).as_str()));
                count += 1;
            }
            assert_eq!(count, 49);
        }

        for session in &mut sessions {
            dispatcher.on_disconnect(session).await;
        }
        assert!(dispatcher.registry().is_empty().await);
    }
}
