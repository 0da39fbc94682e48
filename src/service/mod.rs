//! # Service Layer
//!
//! The server context and the code units it loads.
//!
//! ## Components
//! - **Server**: [`GameServer`], wiring bus, router, acceptor and resources
//! - **Scripts**: [`CodeUnit`] tables and the [`ScriptRegistry`] holding them

pub mod scripts;
pub mod server;

pub use scripts::{CodeUnit, EventBinding, ScriptRegistry, StaticScriptRegistry};
pub use server::GameServer;
