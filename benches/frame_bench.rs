use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use framegate::core::codec::FrameCodec;
use framegate::core::frame::{self, Opcode};
use framegate::core::handshake;
use tokio_util::codec::Decoder;

const KEY: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [64usize, 125, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        let payload = vec![0x42u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter(|| frame::encode(&payload, Opcode::Binary))
        });

        let masked = frame::encode_masked(&payload, Opcode::Binary, KEY);
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter(|| {
                let decoded = frame::decode(&masked);
                assert_eq!(decoded.payload_len, size);
            })
        });

        group.bench_function(format!("codec_decode_{size}b"), |b| {
            b.iter_batched(
                || BytesMut::from(&masked[..]),
                |mut buf| {
                    let mut codec = FrameCodec::default();
                    codec.decode(&mut buf).unwrap().unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_handshake(c: &mut Criterion) {
    let request = "GET / HTTP/1.1\r\nHost: localhost\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
    c.bench_function("handshake_response", |b| {
        b.iter(|| handshake::response_for(request))
    });
}

criterion_group!(benches, bench_frame_encode_decode, bench_handshake);
criterion_main!(benches);
