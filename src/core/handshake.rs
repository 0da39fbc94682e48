//! # Opening Handshake
//!
//! Only enough of the HTTP upgrade request is read to pull out the client key:
//! the text following the literal `Sec-WebSocket-Key: ` is taken as exactly
//! 24 characters, without trimming.
//!
//! ```text
//! accept = base64(SHA1(key ++ "258EAFA5-E914-47DA-95CA-C5AB0DC85B11"))
//! ```

use crate::config::HANDSHAKE_GUID;
use crate::error::{constants, ProtocolError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// Header marker searched for in the request
pub const KEY_HEADER: &str = "Sec-WebSocket-Key: ";

/// Length of a client key in characters
pub const KEY_LEN: usize = 24;

/// Pull the 24-character client key out of a raw request.
pub fn extract_key(request: &str) -> Result<&str> {
    let start = request
        .find(KEY_HEADER)
        .map(|pos| pos + KEY_HEADER.len())
        .ok_or_else(|| ProtocolError::HandshakeError(constants::ERR_MISSING_KEY.into()))?;

    let rest = &request[start..];
    match rest.char_indices().nth(KEY_LEN) {
        Some((end, _)) => Ok(&rest[..end]),
        None if rest.chars().count() == KEY_LEN => Ok(rest),
        None => Err(ProtocolError::HandshakeError(
            constants::ERR_SHORT_KEY.into(),
        )),
    }
}

/// Derive the accept value for a client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(HANDSHAKE_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// The `101 Switching Protocols` response carrying `accept`.
pub fn upgrade_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

/// Build the full response for a raw request.
pub fn response_for(request: &str) -> Result<String> {
    let key = extract_key(request)?;
    Ok(upgrade_response(&accept_key(key)))
}
