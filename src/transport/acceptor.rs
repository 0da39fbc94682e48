//! # Connection Acceptor
//!
//! Owns the listening socket and turns accepted sockets into registered
//! [`Connection`]s.
//!
//! ## States
//! ```text
//! Unbound --create_socket--> Configured --start--> Listening --stop--> Stopped
//! ```
//!
//! Each accepted socket gets its own task that reads the handshake request
//! (up to `handshake_buffer` bytes, bounded by `handshake_timeout`), answers
//! it and claims a registry slot. The accept loop itself only accepts, so one
//! slow handshake never holds up the next client. Failures are logged per
//! socket and the loop keeps going.
//!
//! `stop` closes the listener only; established connections keep running.

use crate::config::ServerConfig;
use crate::core::frame::{self, Opcode};
use crate::core::handshake;
use crate::error::{constants, ProtocolError, Result};
use crate::events::{kinds, EventArgs, EventBus};
use crate::protocol::dispatcher::PacketRouter;
use crate::protocol::message::Message;
use crate::transport::connection::{self, Connection, ConnectionId, ConnectionState};
use crate::transport::registry::SlotRegistry;
use crate::utils::metrics::Metrics;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    Unbound,
    Configured,
    Listening,
    Stopped,
}

/// State shared by the acceptor and every connection it creates.
pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) registry: SlotRegistry,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) router: Arc<PacketRouter>,
    pub(crate) metrics: Arc<Metrics>,
}

struct Listener {
    state: AcceptorState,
    endpoint: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    stop: Option<CancellationToken>,
}

pub struct ConnectionAcceptor {
    shared: Arc<Shared>,
    listener: Mutex<Listener>,
}

impl ConnectionAcceptor {
    pub fn new(
        config: ServerConfig,
        bus: Arc<EventBus>,
        router: Arc<PacketRouter>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let registry = SlotRegistry::new(config.max_players);
        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                bus,
                router,
                metrics,
            }),
            listener: Mutex::new(Listener {
                state: AcceptorState::Unbound,
                endpoint: None,
                local_addr: None,
                stop: None,
            }),
        }
    }

    /// Record the endpoint to listen on. Nothing is bound yet.
    pub fn create_socket(&self, endpoint: Option<SocketAddr>) -> Result<()> {
        let endpoint =
            endpoint.ok_or_else(|| ProtocolError::ConfigError(constants::ERR_NO_ENDPOINT.into()))?;

        let mut listener = self.listener.lock();
        if listener.state == AcceptorState::Listening {
            warn!(%endpoint, "Already listening, endpoint change ignored");
            return Ok(());
        }
        listener.endpoint = Some(endpoint);
        listener.state = AcceptorState::Configured;
        debug!(%endpoint, "Socket configured");
        Ok(())
    }

    /// Bind, listen and start accepting. Must run inside a Tokio runtime.
    ///
    /// Calling it while already listening logs and reports the current state.
    pub fn start(&self) -> Result<AcceptorState> {
        let mut listener = self.listener.lock();
        if listener.state == AcceptorState::Listening {
            info!(addr = ?listener.local_addr, "Acceptor already listening");
            return Ok(AcceptorState::Listening);
        }
        let endpoint = listener
            .endpoint
            .ok_or_else(|| ProtocolError::ConfigError(constants::ERR_NOT_CONFIGURED.into()))?;

        let socket = if endpoint.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(endpoint)?;
        let tcp = socket.listen(self.shared.config.backlog)?;
        let local_addr = tcp.local_addr()?;

        let stop = CancellationToken::new();
        tokio::spawn(accept_loop(tcp, Arc::clone(&self.shared), stop.clone()));

        listener.state = AcceptorState::Listening;
        listener.local_addr = Some(local_addr);
        listener.stop = Some(stop);
        info!(
            addr = %local_addr,
            backlog = self.shared.config.backlog,
            capacity = self.shared.registry.capacity(),
            "Server listening"
        );
        Ok(AcceptorState::Listening)
    }

    /// Close the listener. Established connections are left alone.
    pub fn stop(&self) -> AcceptorState {
        let mut listener = self.listener.lock();
        if let Some(stop) = listener.stop.take() {
            stop.cancel();
            listener.state = AcceptorState::Stopped;
            info!(addr = ?listener.local_addr, "Listener stopped");
        }
        listener.state
    }

    pub fn state(&self) -> AcceptorState {
        self.listener.lock().state
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().local_addr
    }

    /// Send the same encoded frame to every connected slot, in slot order.
    ///
    /// Returns how many connections accepted the frame.
    pub fn broadcast(&self, frame: Bytes) -> usize {
        let mut delivered = 0;
        for conn in self.shared.registry.snapshot() {
            match conn.try_send_raw(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(id = %conn.id(), error = %e, "Broadcast skipped connection"),
            }
        }
        delivered
    }

    /// Encode `message` once and broadcast it as a text frame.
    pub fn broadcast_message(&self, message: &Message) -> Result<usize> {
        let payload = message.to_bytes()?;
        Ok(self.broadcast(frame::encode(&payload, Opcode::Text)))
    }

    /// Free the slot held by `id`; no-op if it holds none.
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        self.shared.registry.remove(id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.shared.registry.get(id)
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.shared.registry.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.registry.capacity()
    }
}

/// First pause after a failed accept.
pub const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
/// Longest pause between accept attempts while accept keeps failing.
pub const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before the next accept after `failures` consecutive failed accepts.
///
/// Doubles from [`ACCEPT_BACKOFF_MIN`] up to [`ACCEPT_BACKOFF_MAX`].
pub fn accept_backoff(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32 << (failures - 1).min(16);
    ACCEPT_BACKOFF_MIN
        .saturating_mul(factor)
        .min(ACCEPT_BACKOFF_MAX)
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, stop: CancellationToken) {
    let mut failures = 0u32;
    loop {
        let accepted = tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                failures = 0;
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(e) = establish(stream, peer, shared).await {
                        warn!(%peer, error = %e, "Connection not established");
                    }
                });
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let pause = accept_backoff(failures);
                warn!(error = %e, failures, pause_ms = pause.as_millis() as u64, "Accept failed");
                shared.metrics.connection_error();
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = sleep(pause) => {}
                }
            }
        }
    }
    debug!("Accept loop exited");
}

#[instrument(skip(stream, shared))]
async fn establish(mut stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) -> Result<()> {
    shared.metrics.handshake_attempt();
    let result = handshake_with(&mut stream, &shared.config).await;
    if let Err(e) = result {
        shared.metrics.handshake_failed();
        let _ = stream.shutdown().await;
        return Err(e);
    }
    shared.metrics.handshake_success();

    let (read_half, mut write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = Arc::new(Connection::new(peer, tx, Arc::downgrade(&shared)));

    if let Err(e) = shared.registry.insert(Arc::clone(&conn)) {
        conn.set_state(ConnectionState::Closed);
        shared.metrics.connection_rejected();
        let _ = write_half.shutdown().await;
        return Err(e);
    }

    conn.set_state(ConnectionState::Established);
    shared.metrics.connection_established();
    info!(id = %conn.id(), "Client connected");

    tokio::spawn(connection::run_writer(
        write_half,
        rx,
        conn.shutdown_token(),
        Arc::clone(&shared),
    ));
    shared.bus.publish(
        &kinds::client::CONNECTED,
        Some(conn.subject()),
        &EventArgs::Connection(Arc::clone(&conn)),
    );
    tokio::spawn(connection::run_reader(conn, read_half, shared));
    Ok(())
}

/// Read the upgrade request and answer it.
async fn handshake_with(stream: &mut TcpStream, config: &ServerConfig) -> Result<()> {
    let mut buf = vec![0u8; config.handshake_buffer];
    let read = timeout(config.handshake_timeout, stream.read(&mut buf))
        .await
        .map_err(|_| ProtocolError::HandshakeError(constants::ERR_HANDSHAKE_TIMEOUT.into()))??;
    if read == 0 {
        return Err(ProtocolError::HandshakeError(
            constants::ERR_EMPTY_HANDSHAKE.into(),
        ));
    }

    let request = String::from_utf8_lossy(&buf[..read]);
    let response = handshake::response_for(&request)?;
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}
