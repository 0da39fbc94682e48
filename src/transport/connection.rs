//! # Connection
//!
//! One accepted, handshaken socket.
//!
//! Each connection runs two tasks: a reader that decodes frames through
//! [`FrameCodec`] and routes them, and a writer that drains an unbounded
//! queue of already-encoded frames into the socket. Frames are processed one
//! at a time in arrival order; the next read starts only after the previous
//! frame has been dispatched.
//!
//! ## Lifecycle
//! ```text
//! Handshaking -> Established -> Closing -> Closed
//! ```
//!
//! [`Connection::disconnect`] is idempotent: only the first call tears down,
//! frees the registry slot and publishes `Client.Disconnected`.

use crate::core::codec::{FrameCodec, FrameReader};
use crate::core::frame::{self, Frame, Opcode};
use crate::error::{ProtocolError, Result};
use crate::events::{kinds, EventArgs, EventBus, EventHandler, EventKind, Scope, SubjectId, Subscription};
use crate::protocol::dispatcher::DispatchOutcome;
use crate::protocol::message::Message;
use crate::protocol::outbound::Outbound;
use crate::transport::acceptor::Shared;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Payload sent back for every ping.
pub const PONG_PAYLOAD: &[u8] = br#"{"Type":"pong"}"#;

/// Attribute key holding the wallet bound by the wallet-connect packet.
pub const WALLET_ATTRIBUTE: &str = "wallet";

/// Connection identity, rendered as `game-<uuid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Handshaking = 0,
    Established = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Handshaking,
            1 => ConnectionState::Established,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    state: AtomicU8,
    outbound: mpsc::UnboundedSender<Bytes>,
    attributes: Mutex<HashMap<String, String>>,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    shutdown: CancellationToken,
    owner: Weak<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    pub(crate) fn new(
        peer_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Bytes>,
        owner: Weak<Shared>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_addr,
            state: AtomicU8::new(ConnectionState::Handshaking as u8),
            outbound,
            attributes: Mutex::new(HashMap::new()),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            owner,
        }
    }

    /// A socket-less, already established connection.
    ///
    /// Everything it sends is delivered, encoded, to the returned receiver.
    /// Disconnecting it only flips its state.
    pub fn loopback(peer_addr: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self::new(peer_addr, tx, Weak::new());
        conn.set_state(ConnectionState::Established);
        (Arc::new(conn), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Event scope key for this connection.
    pub fn subject(&self) -> SubjectId {
        SubjectId::from(self.id)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Established
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.lock().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.lock().insert(key.into(), value.into());
    }

    pub fn wallet(&self) -> Option<String> {
        self.attribute(WALLET_ATTRIBUTE)
    }

    pub fn set_wallet(&self, wallet: impl Into<String>) {
        self.set_attribute(WALLET_ATTRIBUTE, wallet);
    }

    /// Typed server packets for this connection.
    pub fn out(&self) -> Outbound<'_> {
        Outbound::new(self)
    }

    /// Queue an already encoded frame.
    ///
    /// Fails with [`ProtocolError::ConnectionClosed`] once the connection has
    /// left the established state or its writer is gone.
    pub fn try_send_raw(&self, frame: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let len = frame.len() as u64;
        self.outbound
            .send(frame)
            .map_err(|_| ProtocolError::ConnectionClosed)?;
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// Queue an already encoded frame. Skipped when not connected.
    pub fn send_raw(&self, frame: Bytes) -> bool {
        self.try_send_raw(frame).is_ok()
    }

    /// Encode and queue one frame. Skipped when not connected.
    pub fn send(&self, payload: &[u8], opcode: Opcode) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.send_raw(frame::encode(payload, opcode))
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send(text.as_bytes(), Opcode::Text)
    }

    pub fn send_message(&self, message: &Message) -> bool {
        match message.to_bytes() {
            Ok(bytes) => self.send(&bytes, Opcode::Text),
            Err(e) => {
                warn!(id = %self.id, error = %e, "Failed to encode outbound message");
                false
            }
        }
    }

    /// Subscribe `handler` to `kind` in this connection's event scope.
    ///
    /// The scope is released when the connection tears down. Subscribing
    /// after that fails with [`ProtocolError::ConnectionClosed`] instead of
    /// opening a scope nothing would release.
    pub fn subscribe(
        &self,
        bus: &EventBus,
        kind: &'static EventKind,
        handler: EventHandler,
        unique: bool,
    ) -> Result<Subscription> {
        if !self.is_connected() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let subscription = bus.subscribe(kind, handler, Scope::Subject(self.subject()), unique)?;

        // Teardown may have released the scope between the check and the insert.
        if !self.is_connected() {
            bus.release_subject(self.subject())?;
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(subscription)
    }

    /// Tear the connection down. Only the first call has any effect.
    pub fn disconnect(self: &Arc<Self>) {
        let closing = ConnectionState::Closing as u8;
        let claimed = [ConnectionState::Established, ConnectionState::Handshaking]
            .into_iter()
            .any(|from| {
                self.state
                    .compare_exchange(from as u8, closing, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            });
        if !claimed {
            return;
        }

        self.shutdown.cancel();

        if let Some(shared) = self.owner.upgrade() {
            shared.registry.remove(self.id);
            shared.metrics.connection_closed();
            shared.bus.publish(
                &kinds::client::DISCONNECTED,
                Some(self.subject()),
                &EventArgs::Connection(Arc::clone(self)),
            );
            if let Err(e) = shared.bus.release_subject(self.subject()) {
                warn!(id = %self.id, error = %e, "Failed to release event scope");
            }
        }

        self.set_state(ConnectionState::Closed);
        info!(id = %self.id, peer = %self.peer_addr, "Client disconnected");
    }

    /// Handle one decoded frame. Returns `false` when the peer asked to close.
    fn process_frame(self: &Arc<Self>, frame: Frame, shared: &Shared) -> bool {
        match frame.opcode {
            Opcode::ClosedConnection => return false,
            Opcode::Ping => {
                self.send(PONG_PAYLOAD, Opcode::Pong);
                return true;
            }
            Opcode::Pong => return true,
            _ => {}
        }

        if frame.is_error() {
            debug!(id = %self.id, "Skipping malformed frame");
            shared.metrics.protocol_error();
            return true;
        }

        self.bytes_received
            .fetch_add(frame.total_len as u64, Ordering::Relaxed);
        shared.metrics.message_received(frame.total_len as u64);

        let text = frame.text();
        match Message::parse(&text) {
            Ok(message) => match shared.router.dispatch(self, &message) {
                DispatchOutcome::Handled { slow: true, .. } => shared.metrics.slow_dispatch(),
                DispatchOutcome::Handled { .. } => {}
                DispatchOutcome::Unhandled => shared.metrics.unhandled_dispatch(),
                DispatchOutcome::Failed { slow } => {
                    shared.metrics.failed_dispatch();
                    if slow {
                        shared.metrics.slow_dispatch();
                    }
                }
            },
            Err(e) => debug!(id = %self.id, error = %e, "Dropping unparseable message"),
        }

        shared.bus.publish(
            &kinds::client::MESSAGE_RECEIVED,
            Some(self.subject()),
            &EventArgs::Message {
                connection: Arc::clone(self),
                text,
            },
        );
        true
    }
}

/// Read frames until the peer closes, an error occurs or the connection is
/// torn down elsewhere.
#[instrument(skip_all, fields(id = %conn.id(), peer = %conn.peer_addr()))]
pub(crate) async fn run_reader(conn: Arc<Connection>, read_half: OwnedReadHalf, shared: Arc<Shared>) {
    let codec = FrameCodec::new(shared.config.max_payload_size);
    let mut frames = FrameReader::new(read_half, codec, shared.config.data_buffer);

    loop {
        let next = tokio::select! {
            _ = conn.shutdown.cancelled() => break,
            next = frames.next_frame() => next,
        };

        match next {
            Some(Ok(frame)) => {
                if !conn.process_frame(frame, &shared) {
                    debug!("Peer sent close frame");
                    break;
                }
            }
            Some(Err(e)) if e.is_transient() => {
                warn!(error = %e, "Transient read error, continuing");
            }
            Some(Err(e)) => {
                warn!(error = %e, "Read failed, closing connection");
                shared.metrics.connection_error();
                break;
            }
            None => {
                debug!("Peer closed the socket");
                break;
            }
        }
    }

    conn.disconnect();
}

/// Drain queued frames into the socket; shuts the write half down on exit.
pub(crate) async fn run_writer(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(bytes) => {
                    if let Err(e) = write_half.write_all(&bytes).await {
                        warn!(error = %e, "Write failed, closing connection");
                        shared.metrics.connection_error();
                        shutdown.cancel();
                        break;
                    }
                    shared.metrics.message_sent(bytes.len() as u64);
                }
                None => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }

    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::handler;

    fn loopback() -> (Arc<Connection>, mpsc::UnboundedReceiver<Bytes>) {
        Connection::loopback("127.0.0.1:5000".parse().unwrap())
    }

    #[test]
    fn send_after_disconnect_is_connection_closed() {
        let (conn, mut rx) = loopback();
        assert!(conn.try_send_raw(Bytes::from_static(b"\x81\x00")).is_ok());
        assert_eq!(conn.bytes_sent(), 2);

        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(
            conn.try_send_raw(Bytes::from_static(b"\x81\x00")),
            Err(ProtocolError::ConnectionClosed)
        ));
        assert!(!conn.send_text("late"));
        assert_eq!(rx.try_recv().unwrap().len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_writer_is_connection_closed() {
        let (conn, rx) = loopback();
        drop(rx);
        assert!(matches!(
            conn.try_send_raw(Bytes::from_static(b"\x81\x00")),
            Err(ProtocolError::ConnectionClosed)
        ));
        assert_eq!(conn.bytes_sent(), 0);
    }

    #[test]
    fn subscribe_opens_scope_only_while_connected() {
        let bus = EventBus::default();
        let (conn, _rx) = loopback();

        let sub = conn
            .subscribe(&bus, &kinds::client::MESSAGE_RECEIVED, handler(|_, _, _| Ok(())), false)
            .unwrap();
        assert_eq!(sub.scope(), Scope::Subject(conn.subject()));
        assert_eq!(bus.subject_count(), 1);
        assert!(bus.release_subject(conn.subject()).unwrap());

        conn.disconnect();
        let late = conn.subscribe(
            &bus,
            &kinds::client::MESSAGE_RECEIVED,
            handler(|_, _, _| Ok(())),
            false,
        );
        assert!(matches!(late, Err(ProtocolError::ConnectionClosed)));
        assert_eq!(bus.subject_count(), 0);
    }
}
