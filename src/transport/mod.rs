//! # Transport Layer
//!
//! Listening, accepting and per-connection I/O over TCP.
//!
//! ## Components
//! - **Acceptor**: bind/listen, accept loop, handshake, broadcast
//! - **Connection**: read loop, send queue, idempotent teardown
//! - **Registry**: fixed-capacity slot table (10,000 by default)
//!
//! ## Concurrency
//! - One outstanding accept, re-armed after every completion
//! - One outstanding read per connection; a frame is dispatched before the
//!   next read starts
//! - The registry is only touched under its mutex

pub mod acceptor;
pub mod connection;
pub mod registry;

pub use acceptor::{AcceptorState, ConnectionAcceptor};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use registry::SlotRegistry;
