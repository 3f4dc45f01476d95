//! Extension Connection Manager

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::events::{BridgeEvent, EventBus};
use crate::metrics::Metrics;
use crate::protocol::{BridgeMessage, REFUSAL_REASON, WELCOME_MESSAGE};
use crate::Result;

/// Handle to the single live extension connection.
///
/// The writer task owns the WebSocket sink; `tx` feeds it. A closed `tx`
/// means the connection is no longer usable and the slot entry is stale.
struct WorkerConnection {
    id: u64,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Message>,
}

type ConnectionSlot = Arc<Mutex<Option<WorkerConnection>>>;

/// Cheap handle for querying and writing to the current extension
/// connection, shared with the request forwarder and the MCP surface.
#[derive(Clone)]
pub struct ExtensionLink {
    connection: ConnectionSlot,
}

impl ExtensionLink {
    /// Whether a live extension connection exists right now
    pub async fn is_connected(&self) -> bool {
        let slot = self.connection.lock().await;
        slot.as_ref().map(|c| !c.tx.is_closed()).unwrap_or(false)
    }

    /// Serialize and send a message to the extension.
    ///
    /// Dropped with a log line when no live connection exists.
    pub async fn send(&self, message: &BridgeMessage) {
        let slot = self.connection.lock().await;
        let Some(conn) = slot.as_ref().filter(|c| !c.tx.is_closed()) else {
            warn!("No extension connected, dropping outbound message");
            return;
        };

        match serde_json::to_string(message) {
            Ok(text) => {
                if conn.tx.send(Message::Text(text)).is_err() {
                    warn!(
                        "Writer task for extension connection {} stopped, dropping outbound message",
                        conn.id
                    );
                }
            }
            Err(e) => error!("Failed to serialize outbound message: {}", e),
        }
    }
}

/// Accepts at most one live WebSocket connection from the browser extension
/// and relays structured messages in both directions.
pub struct ConnectionManager {
    listener: Option<TcpListener>,
    config: Arc<Config>,
    events: EventBus,
    metrics: Arc<Metrics>,
    connection: ConnectionSlot,
    next_connection_id: Arc<AtomicU64>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(config: Arc<Config>, events: EventBus, metrics: Arc<Metrics>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            listener: None,
            config,
            events,
            metrics,
            connection: Arc::new(Mutex::new(None)),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Get a shareable handle to the current connection
    pub fn link(&self) -> ExtensionLink {
        ExtensionLink {
            connection: Arc::clone(&self.connection),
        }
    }

    /// Whether a live extension connection exists right now
    pub async fn is_connected(&self) -> bool {
        self.link().is_connected().await
    }

    /// Bind the WebSocket listener and return the bound address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let bind_addr = self.config.server.ws_bind_addr;

        info!("Binding WebSocket listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!("WebSocket listener bound to {}", local_addr);
        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Start accepting extension connections and forwarding requests
    pub async fn start(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }

        self.start_request_forwarder();
        self.accept_connections().await
    }

    /// Forward issued extraction requests to the extension as they are
    /// published on the event bus
    fn start_request_forwarder(&self) {
        let link = self.link();
        let mut events_rx = self.events.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events_rx.recv() => match event {
                        Ok(BridgeEvent::ExtractionRequested { request_id, video_url }) => {
                            debug!("Forwarding extraction request {} to extension", request_id);
                            link.send(&BridgeMessage::GetSubtitle { video_url, request_id }).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Request forwarder lagged, skipped {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }

            debug!("Request forwarder stopped");
        });
    }

    /// Main connection acceptance loop
    async fn accept_connections(&self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Listener not initialized"))?;

        info!("Waiting for the browser extension to connect");
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if self.shutdown_flag.load(Ordering::Relaxed) {
                info!("Shutdown flag set, stopping connection acceptance");
                break;
            }

            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!("Extension connection attempt from {}", addr);

                            if self.shutdown_flag.load(Ordering::Relaxed) {
                                debug!("Rejecting connection from {} due to shutdown", addr);
                                continue;
                            }

                            let connection = Arc::clone(&self.connection);
                            let events = self.events.clone();
                            let metrics = Arc::clone(&self.metrics);
                            let next_connection_id = Arc::clone(&self.next_connection_id);
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            tokio::spawn(async move {
                                Self::handle_candidate(
                                    stream,
                                    addr,
                                    connection,
                                    events,
                                    metrics,
                                    next_connection_id,
                                    shutdown_rx,
                                )
                                .await;
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            // Keep accepting even if one handshake fails
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    self.shutdown_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        info!("Connection acceptance loop stopped");
        Ok(())
    }

    /// Perform the WebSocket handshake and enforce single-connection
    /// exclusivity for a newly offered channel
    #[instrument(skip_all, fields(addr = %addr))]
    async fn handle_candidate(
        stream: TcpStream,
        addr: SocketAddr,
        connection: ConnectionSlot,
        events: EventBus,
        metrics: Arc<Metrics>,
        next_connection_id: Arc<AtomicU64>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let (id, tx, mut rx) = {
            let mut slot = connection.lock().await;

            let live = slot.as_ref().map(|c| !c.tx.is_closed()).unwrap_or(false);
            if live {
                drop(slot);
                info!(
                    "Extension already connected, refusing new connection from {}",
                    addr
                );
                metrics.record_connection_refused();
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::Policy,
                        reason: REFUSAL_REASON.into(),
                    }))
                    .await;
                return;
            }

            if let Some(stale) = slot.take() {
                debug!("Discarding stale extension connection {}", stale.id);
            }

            let id = next_connection_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = mpsc::unbounded_channel();
            *slot = Some(WorkerConnection {
                id,
                peer: addr,
                tx: tx.clone(),
            });
            (id, tx, rx)
        };

        info!("Extension connection {} established from {}", id, addr);
        metrics.record_connection_accepted();
        events.publish(BridgeEvent::ExtensionAttached { peer: addr });

        let (mut sink, mut stream) = ws.split();

        // Writer task owns the sink; it closes the socket once the slot entry
        // (and with it the sender) is gone.
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("Failed to write to extension connection: {}", e);
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        // Greeting frame; no reply expected
        let greeting = BridgeMessage::Welcome {
            message: WELCOME_MESSAGE.to_string(),
        };
        match serde_json::to_string(&greeting) {
            Ok(text) => {
                let _ = tx.send(Message::Text(text));
            }
            Err(e) => error!("Failed to serialize greeting: {}", e),
        }
        drop(tx);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => Self::handle_inbound(&text, &events),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => Self::handle_inbound(&text, &events),
                        Err(_) => warn!("Discarding non-UTF-8 binary frame from extension"),
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // tungstenite answers pings itself
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("Extension connection {} sent close", id);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Error on extension connection {}: {}", id, e);
                        break;
                    }
                    None => break,
                },
                _ = shutdown_rx.recv() => {
                    info!("Extension connection {} closing for shutdown", id);
                    break;
                }
            }
        }

        Self::teardown(&connection, &events, id).await;
        // Slot cleared means the writer's channel is closed; let it flush
        // its close frame and finish
        let _ = writer.await;
    }

    /// Decode an inbound frame and publish recognized results.
    ///
    /// Malformed input is logged and dropped; it never affects pending
    /// requests or the connection itself.
    fn handle_inbound(raw: &str, events: &EventBus) {
        match BridgeMessage::decode(raw) {
            Ok(BridgeMessage::SubtitleResult(result)) => {
                debug!("Received extraction result for request {}", result.request_id);
                events.publish(BridgeEvent::ResultReceived(result));
            }
            Ok(other) => {
                debug!("Ignoring unexpected frame from extension: {:?}", other);
            }
            Err(e) => {
                warn!("Discarding malformed frame from extension: {}", e);
            }
        }
    }

    /// Clear the connection slot for connection `id` and announce the
    /// detachment. Safe to call repeatedly; a teardown racing a superseding
    /// connection is a no-op thanks to the id guard.
    async fn teardown(connection: &ConnectionSlot, events: &EventBus, id: u64) {
        let mut slot = connection.lock().await;

        let is_current = slot.as_ref().map(|c| c.id == id).unwrap_or(false);
        if !is_current {
            debug!(
                "Teardown for connection {} skipped, slot already cleared or superseded",
                id
            );
            return;
        }

        let peer = slot.take().map(|c| c.peer);
        drop(slot);

        if let Some(peer) = peer {
            info!("Extension connection {} from {} closed", id, peer);
        }
        events.publish(BridgeEvent::ExtensionDetached);
    }

    /// Initiate graceful shutdown
    pub fn initiate_shutdown(&self) {
        info!("Initiating graceful shutdown of connection manager");
        self.shutdown_flag.store(true, Ordering::Relaxed);

        if self.shutdown_tx.send(()).is_err() {
            debug!("No connection tasks listening for shutdown");
        }
    }

    /// Shut down: stop accepting and close the live connection, if any
    pub async fn shutdown(&self) {
        self.initiate_shutdown();

        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.take() {
            drop(slot);
            info!("Closed extension connection {} for shutdown", conn.id);
            self.events.publish(BridgeEvent::ExtensionDetached);
        }
    }

    /// Check if shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(Config::default()),
            EventBus::default(),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_initial_state_is_disconnected() {
        let manager = test_manager();
        assert!(!manager.is_connected().await);
        assert!(!manager.is_shutting_down());
    }

    #[tokio::test]
    async fn test_send_without_connection_is_a_noop() {
        let manager = test_manager();
        let link = manager.link();

        link.send(&BridgeMessage::Welcome {
            message: "hi".to_string(),
        })
        .await;

        assert!(!link.is_connected().await);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let manager = test_manager();

        ConnectionManager::teardown(&manager.connection, &manager.events, 1).await;
        ConnectionManager::teardown(&manager.connection, &manager.events, 1).await;

        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_malformed_inbound_frame_is_dropped() {
        let events = EventBus::default();
        let mut rx = events.subscribe();

        ConnectionManager::handle_inbound("{ not json", &events);
        ConnectionManager::handle_inbound(r#"{"type":"WELCOME","message":"echo"}"#, &events);

        // Neither frame may produce an event
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_result_frame_is_published() {
        let events = EventBus::default();
        let mut rx = events.subscribe();

        ConnectionManager::handle_inbound(
            r#"{"type":"SUBTITLE_RESULT","requestId":"req-9","error":"nope"}"#,
            &events,
        );

        match rx.recv().await.unwrap() {
            BridgeEvent::ResultReceived(result) => {
                assert_eq!(result.request_id, "req-9");
                assert_eq!(result.error.as_deref(), Some("nope"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
