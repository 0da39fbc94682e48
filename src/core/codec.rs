//! Streaming frame decoder for `tokio_util::codec::FramedRead`.
//!
//! Holds bytes until a whole frame is buffered, then hands the frame bytes to
//! [`frame::decode`]. Frames announcing more than `max_payload_size` bytes are
//! rejected before the payload is buffered.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::frame::{self, Frame, Opcode};
use crate::error::{ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder, FramedRead};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(header) = frame::parse_header(src) else {
            return Ok(None);
        };

        let announced = usize::try_from(header.payload_len).unwrap_or(usize::MAX);
        if announced > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(announced));
        }
        let total_len = header
            .total_len()
            .ok_or(ProtocolError::OversizedPacket(announced))?;

        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let raw = src.split_to(total_len);
        let decoded = frame::decode(&raw);
        if decoded.is_error() {
            debug!(opcode = header.opcode, "Dropping frame with reserved opcode");
        }
        Ok(Some(decoded))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "Discarding partial frame at EOF");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

/// Server-side frames are written unmasked.
impl Encoder<(Opcode, Bytes)> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, (opcode, payload): (Opcode, Bytes), dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(payload.len()));
        }
        frame::encode_into(&payload, opcode, dst);
        Ok(())
    }
}

/// Frame stream over a reader that rides out transient I/O errors.
///
/// `FramedRead` ends its stream after any error. On a transient one
/// ([`ProtocolError::is_transient`]) the reader is re-armed around the same
/// source, with the bytes already buffered carried over, so a partially read
/// frame is not lost. Any other error ends the stream.
pub struct FrameReader<R> {
    frames: Option<FramedRead<R, FrameCodec>>,
    capacity: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, codec: FrameCodec, capacity: usize) -> Self {
        Self {
            frames: Some(FramedRead::with_capacity(reader, codec, capacity)),
            capacity,
        }
    }

    /// Next frame, an error, or `None` once the stream is finished.
    ///
    /// Cancel safe: dropping the future before it completes loses no data.
    pub async fn next_frame(&mut self) -> Option<Result<Frame>> {
        let frames = self.frames.as_mut()?;
        let next = frames.next().await;
        match next {
            Some(Err(ref e)) if e.is_transient() => self.rearm(),
            Some(Err(_)) | None => self.frames = None,
            Some(Ok(_)) => {}
        }
        next
    }

    pub fn is_finished(&self) -> bool {
        self.frames.is_none()
    }

    fn rearm(&mut self) {
        let Some(mut frames) = self.frames.take() else {
            return;
        };
        let pending = frames.read_buffer_mut().split();
        let codec = *frames.decoder();
        let mut fresh = FramedRead::with_capacity(frames.into_inner(), codec, self.capacity);
        if !pending.is_empty() {
            warn!(buffered = pending.len(), "Re-arming reader with a partial frame");
            fresh.read_buffer_mut().extend_from_slice(&pending);
        }
        self.frames = Some(fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_full_frame() {
        let raw = frame::encode_masked(b"hello", Opcode::Text, [5, 6, 7, 8]);
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&raw[..4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&raw[4..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversized_announcement() {
        let mut codec = FrameCodec::new(64);
        let mut buf = BytesMut::from(&[0x81u8, 0xFE, 0x01, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPacket(256))
        ));
    }

    #[test]
    fn eof_discards_partial() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[0x81u8, 0x85, 1, 2][..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}
