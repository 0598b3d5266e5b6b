//! Throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pfeiffer_core::core::protocol::{build, parse_raw, resolve, Action, LineFramer, Value};
use pfeiffer_core::CatalogSet;
use std::io::Cursor;

const FRAMES: [&str; 4] = [
    "0011000106111111015\r",
    "0021030906000633033\r",
    "0010000102=?096\r",
    "0011034906TC 110065\r",
];

fn codec_benchmark(c: &mut Criterion) {
    let catalogs = CatalogSet::builtin().unwrap();
    let catalog = catalogs.catalog("TC110").unwrap();
    let bytes: usize = FRAMES.iter().map(|f| f.len()).sum();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(bytes as u64));

    group.bench_function("parse_raw", |b| {
        b.iter(|| {
            for frame in FRAMES {
                black_box(parse_raw(black_box(frame)).unwrap());
            }
        })
    });

    group.bench_function("parse_and_resolve", |b| {
        b.iter(|| {
            for frame in FRAMES {
                let raw = parse_raw(black_box(frame)).unwrap();
                black_box(resolve(raw, catalog).unwrap());
            }
        })
    });

    group.finish();

    c.bench_function("build_u_integer", |b| {
        let value = Value::Integer(8);
        b.iter(|| {
            let frame = build(1, Action::SetOrReply, 700, black_box(&value), catalog, true);
            black_box(frame.unwrap())
        })
    });
}

fn framing_benchmark(c: &mut Criterion) {
    let stream: Vec<u8> = FRAMES.iter().cycle().take(256).flat_map(|f| f.bytes()).collect();

    let mut group = c.benchmark_group("framing");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("read_line", |b| {
        b.iter(|| {
            let mut source = Cursor::new(black_box(&stream));
            let mut framer = LineFramer::new();
            let mut lines = 0;
            while framer.read_line(&mut source).is_ok() {
                lines += 1;
            }
            black_box(lines)
        })
    });

    group.finish();
}

criterion_group!(benches, codec_benchmark, framing_benchmark);
criterion_main!(benches);
