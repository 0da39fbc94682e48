//! # Frame Format
//!
//! Stateless encode/decode of single, unfragmented frames.
//!
//! ## Wire Layout
//! ```text
//! [0x80 | opcode] [mask bit | selector] [ext len 0/2/8 BE] [mask key 0/4] [payload]
//! ```
//!
//! | selector | payload length        | key index | total length |
//! |----------|-----------------------|-----------|--------------|
//! | 0..=125  | selector              | 2         | len + 6      |
//! | 126      | next 2 bytes, BE      | 4         | len + 8      |
//! | 127      | next 8 bytes, BE      | 10        | len + 14     |
//!
//! Inbound frames are always treated as final and masked; the FIN and MASK
//! bits are not checked. Outbound frames are written unmasked.
//!
//! A header that is too short, a payload shorter than announced, or a
//! reserved opcode decodes to [`Frame::error`], which callers treat as an
//! empty message rather than a failure.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Fragment = 0,
    Text = 1,
    Binary = 2,
    ClosedConnection = 8,
    Ping = 9,
    Pong = 10,
}

impl Opcode {
    /// Map a raw opcode value, `None` for reserved values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Opcode::Fragment),
            1 => Some(Opcode::Text),
            2 => Some(Opcode::Binary),
            8 => Some(Opcode::ClosedConnection),
            9 => Some(Opcode::Ping),
            10 => Some(Opcode::Pong),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Control frames carry no application message.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Opcode::ClosedConnection | Opcode::Ping | Opcode::Pong
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Fragment => "Fragment",
            Opcode::Text => "Text",
            Opcode::Binary => "Binary",
            Opcode::ClosedConnection => "ClosedConnection",
            Opcode::Ping => "Ping",
            Opcode::Pong => "Pong",
        };
        f.write_str(name)
    }
}

/// Parsed frame header. Nothing here has been bounds-checked against the
/// payload yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Low seven bits of byte 0
    pub opcode: u8,
    /// Announced payload length
    pub payload_len: u64,
    /// Offset of the 4-byte masking key
    pub key_index: usize,
}

impl FrameHeader {
    /// Length of the whole frame, `None` if it cannot be addressed.
    pub fn total_len(&self) -> Option<usize> {
        usize::try_from(self.payload_len)
            .ok()
            .and_then(|len| len.checked_add(self.key_index + 4))
    }
}

/// A decoded frame.
///
/// For masked frames `total_len == key_index + 4 + payload_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload_len: usize,
    pub key_index: usize,
    pub total_len: usize,
    /// Unmasked payload
    pub payload: Bytes,
}

impl Frame {
    /// The zero-valued frame produced by malformed input.
    pub fn error() -> Self {
        Self {
            opcode: Opcode::Fragment,
            payload_len: 0,
            key_index: 0,
            total_len: 0,
            payload: Bytes::new(),
        }
    }

    /// A well-formed frame always has a key index of at least 2.
    pub fn is_error(&self) -> bool {
        self.key_index == 0 && self.total_len == 0
    }

    /// Payload as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Read the header from the start of `buf`; `None` if more bytes are needed.
pub fn parse_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < 2 {
        return None;
    }

    let opcode = buf[0] & 0x7F;
    let selector = buf[1] & 0x7F;

    match selector {
        0..=125 => Some(FrameHeader {
            opcode,
            payload_len: u64::from(selector),
            key_index: 2,
        }),
        126 => {
            let ext = buf.get(2..4)?;
            Some(FrameHeader {
                opcode,
                payload_len: u64::from(u16::from_be_bytes([ext[0], ext[1]])),
                key_index: 4,
            })
        }
        _ => {
            let ext: [u8; 8] = buf.get(2..10)?.try_into().ok()?;
            Some(FrameHeader {
                opcode,
                payload_len: u64::from_be_bytes(ext),
                key_index: 10,
            })
        }
    }
}

/// Decode one frame from the start of `buf`.
pub fn decode(buf: &[u8]) -> Frame {
    let Some(header) = parse_header(buf) else {
        return Frame::error();
    };
    let Some(opcode) = Opcode::from_u8(header.opcode) else {
        return Frame::error();
    };
    let Some(total_len) = header.total_len() else {
        return Frame::error();
    };
    if buf.len() < total_len {
        return Frame::error();
    }

    let key_index = header.key_index;
    let key = [
        buf[key_index],
        buf[key_index + 1],
        buf[key_index + 2],
        buf[key_index + 3],
    ];

    let mut payload = BytesMut::from(&buf[key_index + 4..total_len]);
    apply_mask(&mut payload, key);

    Frame {
        opcode,
        payload_len: payload.len(),
        key_index,
        total_len,
        payload: payload.freeze(),
    }
}

/// XOR `data` with `key`, cycling the key from the first byte.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

fn put_header(dst: &mut BytesMut, len: usize, opcode: Opcode, mask_bit: u8) {
    dst.put_u8(0x80 | opcode.as_u8());
    if len <= 125 {
        dst.put_u8(mask_bit | len as u8);
    } else if len <= 0xFFFF {
        dst.put_u8(mask_bit | 126);
        dst.put_u16(len as u16);
    } else {
        dst.put_u8(mask_bit | 127);
        dst.put_u64(len as u64);
    }
}

#[inline]
fn header_len(len: usize) -> usize {
    match len {
        0..=125 => 2,
        126..=0xFFFF => 4,
        _ => 10,
    }
}

/// Append an unmasked server frame to `dst`.
pub fn encode_into(payload: &[u8], opcode: Opcode, dst: &mut BytesMut) {
    dst.reserve(header_len(payload.len()) + payload.len());
    put_header(dst, payload.len(), opcode, 0);
    dst.extend_from_slice(payload);
}

/// Encode an unmasked server frame.
pub fn encode(payload: &[u8], opcode: Opcode) -> Bytes {
    let mut dst = BytesMut::with_capacity(header_len(payload.len()) + payload.len());
    encode_into(payload, opcode, &mut dst);
    dst.freeze()
}

/// Encode a masked frame as a client would send it.
pub fn encode_masked(payload: &[u8], opcode: Opcode, key: [u8; 4]) -> Bytes {
    let mut dst = BytesMut::with_capacity(header_len(payload.len()) + 4 + payload.len());
    put_header(&mut dst, payload.len(), opcode, 0x80);
    dst.extend_from_slice(&key);
    let start = dst.len();
    dst.extend_from_slice(payload);
    apply_mask(&mut dst[start..], key);
    dst.freeze()
}
