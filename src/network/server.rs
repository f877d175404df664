//! WebSocket Relay Server
//!
//! Async WebSocket server for signaling connections.
//! Handles the handshake (identity cookie, room key), keepalive, and hands
//! every frame to the connection's lifecycle.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::core::{Capabilities, DeviceInfo};
use crate::network::address::room_key_for;
use crate::signaling::identity::{IdentityConfig, IdentityResolver};
use crate::signaling::lifecycle::{MessageAction, PeerConnection, UpgradeContext};
use crate::signaling::protocol::{OutboundMessage, ServerMessage};
use crate::signaling::registry::RoomRegistry;

/// How long shutdown waits for connections to run their leave and close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Close connections silent for this long.
    pub idle_timeout: Duration,
    /// Largest inbound message accepted (bytes).
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// Use `X-Forwarded-For` for room keys.
    pub trust_proxy: bool,
    /// Identity cookie settings.
    pub identity: IdentityConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            keepalive_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            max_message_size: 64 * 1024,
            outbound_buffer: 64,
            trust_proxy: true,
            identity: IdentityConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    ///
    /// `BIND_ADDR` wins over `PORT` when both are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("PORT")? {
            config.bind_addr.set_port(port);
        }
        if let Some(addr) = env_parse::<SocketAddr>("BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = env_parse("MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(secs) = env_parse("KEEPALIVE_SECS")? {
            config.keepalive_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = env_parse("MAX_MESSAGE_BYTES")? {
            config.max_message_size = bytes;
        }
        if let Some(capacity) = env_parse("OUTBOUND_BUFFER")? {
            config.outbound_buffer = capacity;
        }
        if let Ok(value) = std::env::var("TRUST_PROXY") {
            config.trust_proxy = value == "true" || value == "1";
        }
        config.identity = IdentityConfig::from_env();

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("OUTBOUND_BUFFER must be at least 1".into()));
        }
        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::Invalid("KEEPALIVE_SECS must be at least 1".into()));
        }
        if self.idle_timeout < self.keepalive_interval {
            return Err(ConfigError::Invalid(
                "IDLE_TIMEOUT_SECS must not be shorter than KEEPALIVE_SECS".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Raw value.
        value: String,
    },

    /// Settings are inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Decrements the live connection count when a connection task ends.
struct ActiveConnection(Arc<AtomicUsize>);

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The relay server.
pub struct RelayServer {
    /// Server configuration.
    config: ServerConfig,
    /// Room membership shared by all connections.
    registry: Arc<RoomRegistry>,
    /// Handshake identity resolution.
    identity: Arc<IdentityResolver>,
    /// Live connection count.
    active: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new relay server with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(RoomRegistry::new()))
    }

    /// Create a relay server around an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Arc<RoomRegistry>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let identity = Arc::new(IdentityResolver::new(config.identity.clone()));

        Self {
            config,
            registry,
            identity,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), RelayServerError> {
        self.config.validate()?;
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener until shutdown.
    ///
    /// Returns once every connection has left its room. Connections still
    /// open after a short grace period are aborted.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayServerError> {
        let local_addr = listener.local_addr()?;
        info!("Relay server v{} listening on {}", self.config.version, local_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("{}, rejecting {}", RelayServerError::ConnectionLimitReached, addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(&mut connections, stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        self.drain(&mut connections).await;
        Ok(())
    }

    /// Wait for connection tasks to finish after shutdown, aborting stragglers.
    async fn drain(&self, connections: &mut JoinSet<()>) {
        if connections.is_empty() {
            return;
        }

        info!("Waiting for {} connections to close", connections.len());
        let drained = timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} connections still open after {:?}, aborting",
                connections.len(),
                SHUTDOWN_GRACE
            );
            connections.shutdown().await;
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, connections: &mut JoinSet<()>, stream: TcpStream, addr: SocketAddr) {
        self.active.fetch_add(1, Ordering::SeqCst);
        let active = ActiveConnection(self.active.clone());

        let registry = self.registry.clone();
        let identity = self.identity.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        connections.spawn(async move {
            let _active = active;
            if let Err(e) = Self::run_connection(stream, addr, registry, identity, config, shutdown_rx).await {
                error!("Connection {} failed: {}", addr, e);
            }
        });
    }

    /// Handshake, join, pump frames until close, leave.
    async fn run_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<RoomRegistry>,
        identity: Arc<IdentityResolver>,
        config: ServerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), RelayServerError> {
        let mut upgrade: Option<UpgradeContext> = None;
        let trust_proxy = config.trust_proxy;

        let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let resolved = identity.resolve(request.headers());

            if let Some(cookie) = &resolved.set_cookie {
                match HeaderValue::from_str(cookie) {
                    Ok(value) => {
                        response.headers_mut().append(header::SET_COOKIE, value);
                    }
                    Err(e) => warn!("Unusable identity cookie for {}: {}", addr, e),
                }
            }

            let device = request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|ua| ua.to_str().ok())
                .map(DeviceInfo::from_user_agent)
                .unwrap_or_default();

            upgrade = Some(UpgradeContext {
                peer_id: resolved.peer_id,
                room: room_key_for(addr, request.headers(), trust_proxy),
                device,
                capabilities: Capabilities {
                    rtc_supported: request.uri().path().contains("webrtc"),
                },
            });

            Ok(response)
        };

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.max_frame_size = Some(config.max_message_size);

        let ws_stream = accept_hdr_async_with_config(stream, callback, Some(ws_config)).await?;
        let Some(upgrade) = upgrade else {
            warn!("Handshake for {} completed without context", addr);
            return Ok(());
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<OutboundMessage>(config.outbound_buffer);

        // Spawn message sender task
        let mut sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            let _ = ws_sender.close().await;
        });

        let mut connection = PeerConnection::new(registry);
        if let Err(e) = connection.join(upgrade, msg_tx.clone()).await {
            error!("Join failed for {}: {}", addr, e);
            sender_task.abort();
            return Ok(());
        }

        let mut keepalive = interval_at(
            Instant::now() + config.keepalive_interval,
            config.keepalive_interval,
        );
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    let bytes = match msg {
                        Some(Ok(Message::Text(text))) => text.into_bytes(),
                        Some(Ok(Message::Binary(data))) => data,
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            last_activity = Instant::now();
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Client {} closed: {:?}", addr, frame);
                            break;
                        }
                        None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            debug!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        Some(Ok(Message::Frame(_))) => continue,
                    };

                    last_activity = Instant::now();
                    match connection.handle_message(&bytes).await {
                        Ok(MessageAction::Disconnect) => break,
                        Ok(_) => {}
                        Err(e) => {
                            debug!("Dropping message from {}: {}", addr, e);
                            break;
                        }
                    }
                }
                _ = keepalive.tick() => {
                    if last_activity.elapsed() > config.idle_timeout {
                        info!("Closing idle connection {}", addr);
                        break;
                    }
                    if let Some(session) = connection.session() {
                        session.send(ServerMessage::Ping);
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        // Cleanup
        connection.leave().await;
        drop(connection);
        drop(msg_tx);

        // Let queued messages flush, then give up on a stuck peer.
        if timeout(Duration::from_secs(2), &mut sender_task).await.is_err() {
            sender_task.abort();
        }

        debug!("Client {} cleaned up", addr);
        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Room registry shared by all connections.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }
}
