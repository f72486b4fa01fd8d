use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flate2::write::GzEncoder;
use flate2::Compression;
use linepipe::compile;
use std::io::{self, Write};
use std::time::Duration;

fn generate_log(bytes: usize) -> Vec<u8> {
    let mut log = Vec::with_capacity(bytes + 128);
    let mut i = 0u64;
    while log.len() < bytes {
        match i % 4 {
            0 => writeln!(log, "2024-05-08 12:00:{:02} ERROR job {} failed", i % 60, i),
            1 => writeln!(log, "    at worker.rs:{}", i),
            2 => writeln!(log),
            _ => writeln!(log, "2024-05-08 12:00:{:02} DEBUG heartbeat {}", i % 60, i),
        }
        .expect("write to Vec");
        i += 1;
    }
    log
}

fn benchmark_single_stage_throughput(c: &mut Criterion) {
    let input = generate_log(4 << 20);
    let mut group = c.benchmark_group("single_stage");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("noempty_4mb", |b| {
        b.iter(|| {
            let pipeline = compile("noempty").expect("Compile failed");
            pipeline
                .run(black_box(&input[..]), io::sink())
                .expect("Run failed");
        });
    });
    group.finish();
}

fn benchmark_three_stage_throughput(c: &mut Criterion) {
    let input = generate_log(4 << 20);
    let mut group = c.benchmark_group("three_stage");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("groupml_ignore_noempty_4mb", |b| {
        b.iter(|| {
            let pipeline = compile(r"groupml /^\d{4}-/ | ignore / DEBUG / | noempty")
                .expect("Compile failed");
            pipeline
                .run(black_box(&input[..]), io::sink())
                .expect("Run failed");
        });
    });
    group.finish();
}

fn benchmark_gunzip_throughput(c: &mut Criterion) {
    let log = generate_log(4 << 20);
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&log).expect("compress");
    let input = enc.finish().expect("compress");

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(log.len() as u64));
    group.bench_function("gunzip_noempty_4mb", |b| {
        b.iter(|| {
            let pipeline = compile("gunzip? | noempty").expect("Compile failed");
            pipeline
                .run(black_box(&input[..]), io::sink())
                .expect("Run failed");
        });
    });
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_single_stage_throughput, benchmark_three_stage_throughput, benchmark_gunzip_throughput
);
criterion_main!(benches);
