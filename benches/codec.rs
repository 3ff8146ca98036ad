use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use trainlib::protocol::{Packet, cmd, decode_message};

const MOVEMENT: [u8; 20] = [
    0xB7, 0x12, 0x01, 0x00, 0x64, 0x32, 0x01, 0x00, 0x96, 0x0A, 0x03, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x30, 0x39, 0x00, 0x00,
];

const SNAP_DETECTED: [u8; 12] = [
    0xE0, 0x0A, 0x09, 0x00, 0x01, 0x02, 0x03, 0x05, 0x07, 0x03, 0x00, 0x00,
];

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    group.throughput(Throughput::Bytes(5));
    group.bench_function("encode_top_led", |b| {
        b.iter(|| {
            black_box(Packet::from_command(cmd::TOP_LED, black_box(&[0xFF, 0x80, 0x00])));
        });
    });

    let packet = Packet::decode(MOVEMENT.to_vec());
    group.bench_function("hex_string", |b| {
        b.iter(|| {
            black_box(packet.to_hex_string(true, ":", false));
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let movement = Packet::decode(MOVEMENT.to_vec());
    group.throughput(Throughput::Bytes(MOVEMENT.len() as u64));
    group.bench_function("decode_movement", |b| {
        b.iter(|| {
            black_box(decode_message(black_box(movement.clone())));
        });
    });

    let snap = Packet::decode(SNAP_DETECTED.to_vec());
    group.throughput(Throughput::Bytes(SNAP_DETECTED.len() as u64));
    group.bench_function("decode_snap_event", |b| {
        b.iter(|| {
            black_box(decode_message(black_box(snap.clone())));
        });
    });

    let malformed = Packet::from_command(cmd::MOVEMENT, &[0x01, 0x02]);
    group.bench_function("decode_malformed", |b| {
        b.iter(|| {
            black_box(decode_message(black_box(malformed.clone())));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
