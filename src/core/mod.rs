//! # Core Protocol Components
//!
//! Handshake and frame handling, written against raw bytes.
//!
//! ## Components
//! - **Frame**: stateless encode/decode of single frames
//! - **Codec**: tokio decoder that buffers until a frame is complete
//! - **Handshake**: client key extraction and accept derivation
//!
//! ## Wire Format
//! ```text
//! [0x80 | opcode] [mask | len] [ext len] [mask key] [payload]
//! ```
//!
//! ## Limits
//! - Maximum frame payload: 16MB by default, checked before buffering
//! - Reserved opcodes decode to an error frame and are skipped

pub mod codec;
pub mod frame;
pub mod handshake;
