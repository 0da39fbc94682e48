//! # framegate
//!
//! A socket server speaking a WebSocket-style framing protocol over plain TCP.
//!
//! Accepted sockets complete an HTTP upgrade handshake, then exchange single
//! unfragmented frames whose text payloads are JSON messages carrying an
//! integer `Opcode`. Messages are routed to the handler registered for their
//! opcode; connection lifecycle and server lifecycle are published on a
//! two-scope event bus.
//!
//! ## Layout
//! - [`core`]: frame encode/decode, stream codec, handshake
//! - [`transport`]: acceptor, connections, slot registry
//! - [`events`]: global and per-subject publish/subscribe
//! - [`protocol`]: message envelope, opcode router, account handlers
//! - [`service`]: server context and code units
//! - [`resources`]: language table and user store
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics
//!
//! ## Quick Start
//! ```rust,no_run
//! use framegate::config::Config;
//! use framegate::service::GameServer;
//! use framegate::utils::logging::setup_logging;
//!
//! #[tokio::main]
//! async fn main() -> framegate::error::Result<()> {
//!     let config = Config::from_env()?;
//!     config.validate_strict()?;
//!     setup_logging(&config.logging)?;
//!
//!     let server = GameServer::with_accounts(config);
//!     server.start()?;
//!     std::future::pending::<()>().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod protocol;
pub mod resources;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::frame::{Frame, Opcode};
pub use crate::error::{ProtocolError, Result};
pub use crate::events::{EventBus, EventKind};
pub use crate::protocol::dispatcher::PacketRouter;
pub use crate::protocol::message::Message;
pub use crate::service::GameServer;
pub use crate::transport::{Connection, ConnectionAcceptor};
