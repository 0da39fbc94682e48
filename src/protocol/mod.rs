//! # Protocol Layer
//!
//! Application messages and how they reach their handlers.
//!
//! ## Components
//! - **Message**: JSON envelope with an integer `Opcode`
//! - **Dispatcher**: opcode router with timing and fault isolation
//! - **Outbound**: typed server packets
//! - **Handlers**: wallet connect, register and login
//!
//! ## Routing Rules
//! - The first handler registered for an opcode wins
//! - Unknown opcodes are logged and dropped; the connection stays open
//! - Handler errors and panics never reach the read loop

pub mod dispatcher;
pub mod handlers;
pub mod message;
pub mod outbound;
