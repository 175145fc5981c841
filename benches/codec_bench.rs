//! Codec benchmarks.
//!
//! Handshake cost is dominated by PBKDF2; frame cost by ChaCha20-Poly1305.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use wsmux::crypto::{derive_key, PresharedKey, DEFAULT_KDF_ITERATIONS};
use wsmux::protocol::{Codec, ConnectionId, Side};

fn active_pair(iterations: u32) -> (Codec, Codec) {
    let mut listener = Codec::new(Side::Listener, PresharedKey::new("bench"), iterations);
    let mut connector = Codec::new(Side::Connector, PresharedKey::new("bench"), iterations);

    let from_listener = listener.init_handshake().unwrap();
    let from_connector = connector.init_handshake().unwrap();
    listener.verify_handshake(&from_connector).unwrap();
    connector.verify_handshake(&from_listener).unwrap();
    (listener, connector)
}

fn bench_kdf(c: &mut Criterion) {
    let psk = PresharedKey::new("bench");
    let salt = [0x42u8; 64];

    let mut group = c.benchmark_group("pbkdf2_sha512");
    group.sample_size(10);
    group.bench_function("default_iterations", |b| {
        b.iter(|| black_box(derive_key(&psk, &salt, DEFAULT_KDF_ITERATIONS)))
    });
    group.finish();
}

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");
    group.sample_size(10);
    group.bench_function("pair", |b| b.iter(|| black_box(active_pair(DEFAULT_KDF_ITERATIONS))));
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let (mut listener, mut connector) = active_pair(2);
    let id = ConnectionId::new(0x0102_0304).unwrap();

    let mut group = c.benchmark_group("frame_roundtrip");
    for size in [64usize, 1500, 16 * 1024, 256 * 1024] {
        let payload = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            let mut buf = BytesMut::with_capacity(size + 32);
            b.iter(|| {
                buf.clear();
                buf.extend_from_slice(payload);
                listener.auth_message(&mut buf, id).unwrap();
                black_box(connector.verify_message(&mut buf).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kdf, bench_handshake, bench_frames);
criterion_main!(benches);
