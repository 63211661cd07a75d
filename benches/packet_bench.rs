use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};

use adb_protocol::core::codec::PacketCodec;
use adb_protocol::core::packet::Packet;

#[allow(clippy::unwrap_used)]
fn bench_packet_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Bytes::from(vec![0xabu8; size]),
                |payload| {
                    let mut buf = BytesMut::with_capacity(size + 32);
                    let mut codec = PacketCodec::new();
                    codec.encode(Packet::wrte(1, 7, payload), &mut buf).unwrap();
                    buf
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("decode_{size}b"), |b| {
            let mut encoded = BytesMut::new();
            let mut codec = PacketCodec::new();
            codec
                .encode(
                    Packet::wrte(1, 7, Bytes::from(vec![0xabu8; size])),
                    &mut encoded,
                )
                .unwrap();
            let encoded = encoded.freeze();

            b.iter_batched(
                || BytesMut::from(&encoded[..]),
                |mut buf| {
                    let mut codec = PacketCodec::new();
                    codec.decode(&mut buf).unwrap().unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packet_encode_decode);
criterion_main!(benches);
