//! Benchmark frame reassembly and sample repacking.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use digivoice_bridge::device::frame::{packetize_superframe, SUPERFRAME_LEN, TYPE_AUDIO};
use digivoice_bridge::device::{Frame, Reassembler};
use digivoice_bridge::framing::SampleAccumulator;

/// A stream of decoded speech frames as the device would send them
fn audio_stream(frames: usize) -> Vec<u8> {
    let mut payload = vec![0x00, 160];
    payload.extend((0..320).map(|i| i as u8));
    let frame = Frame::new(TYPE_AUDIO, &payload).unwrap();

    let mut stream = Vec::with_capacity(frames * frame.as_bytes().len());
    for _ in 0..frames {
        stream.extend_from_slice(frame.as_bytes());
    }
    stream
}

fn bench_reassembly(c: &mut Criterion) {
    let stream = audio_stream(50);
    let mut group = c.benchmark_group("reassembly");

    for chunk in [1usize, 7, 64, 512] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut reassembler = Reassembler::new();
                let mut frames = 0;
                for piece in stream.chunks(chunk) {
                    if let Ok(out) = reassembler.push(black_box(piece)) {
                        frames += out.len();
                    }
                }
                frames
            })
        });
    }
    group.finish();
}

fn bench_packetize(c: &mut Criterion) {
    let superframe: Vec<u8> = (0..SUPERFRAME_LEN as u8).collect();
    c.bench_function("packetize_superframe", |b| {
        b.iter(|| packetize_superframe(black_box(&superframe)).unwrap())
    });
}

fn bench_repacking(c: &mut Criterion) {
    let samples: Vec<i16> = (0..4096).map(|i| i as i16).collect();
    c.bench_function("accumulator_repack", |b| {
        b.iter(|| {
            let mut acc = SampleAccumulator::new(160, 320);
            let mut frames = 0;
            for chunk in samples.chunks(123) {
                let mut rest = chunk;
                while !rest.is_empty() {
                    let taken = acc.push_partial(rest);
                    rest = &rest[taken..];
                    while acc.pop_frame().is_some() {
                        frames += 1;
                    }
                }
            }
            black_box(frames)
        })
    });
}

criterion_group!(benches, bench_reassembly, bench_packetize, bench_repacking);
criterion_main!(benches);
