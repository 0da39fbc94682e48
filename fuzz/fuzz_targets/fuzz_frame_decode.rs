#![no_main]

use bytes::BytesMut;
use framegate::core::codec::FrameCodec;
use framegate::core::frame;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // One-shot decode must never panic or read past the input
    let decoded = frame::decode(data);
    if !decoded.is_error() {
        assert!(decoded.total_len <= data.len());
    }

    // Streaming decode over the same bytes
    let mut codec = FrameCodec::new(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
