use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dpiscope_codec::{decode_with, encode_bytes, to_text};
use dpiscope_core::{
    AliveState, DpiVerdict, ProbeResult, ProbeTarget, Revision, SchemaLayout, SchemaSnapshot, Session,
};
use dpiscope_dsa::{read_bits, write_bits};

fn bit_packing(c: &mut Criterion) {
    let mut buf = [0u8; 32];

    c.bench_function("write_bits_128_unaligned", |b| {
        b.iter(|| write_bits(black_box(&mut buf), black_box(3), 128, black_box(u128::MAX >> 1)))
    });
    c.bench_function("read_bits_23_unaligned", |b| {
        b.iter(|| read_bits(black_box(&buf), black_box(131), 23))
    });
}

fn share_tokens(c: &mut Criterion) {
    let layout = SchemaLayout::CURRENT;
    let revision = Revision::from_u128(0x0a1b_2c3d_4e5f_6071_8293_a4b5_c6d7_e8f9);

    let roster: Vec<ProbeTarget> = (0..64)
        .map(|i| ProbeTarget::new(&format!("XX.T-{:02}", i), "Bench", "bench.invalid", "XX"))
        .collect();
    let mut session = Session::with_timestamp(65_000, layout.epoch_millis + 3_600_000);
    for (i, t) in roster.iter().enumerate() {
        let alive = AliveState::ALL[i % 3];
        let dpi = DpiVerdict::ALL[i % 5];
        session.record(ProbeResult::new(t.clone(), alive, dpi));
    }
    let snapshot = SchemaSnapshot::new(revision, layout, roster);
    let bytes = encode_bytes(&layout, revision, &session).unwrap();

    c.bench_function("encode_share_64_items", |b| {
        b.iter(|| to_text(&encode_bytes(&layout, revision, black_box(&session)).unwrap()))
    });
    c.bench_function("decode_share_64_items", |b| {
        b.iter(|| decode_with(black_box(&bytes), &snapshot).unwrap())
    });
}

criterion_group!(benches, bit_packing, share_tokens);
criterion_main!(benches);
