use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use linepipe::{compile, pipe, PipeConfig};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

const PAYLOAD: usize = 8 << 20;

fn benchmark_raw_pipe(c: &mut Criterion) {
    let data = vec![b'x'; 64 * 1024];
    let mut group = c.benchmark_group("raw_pipe");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    for capacity in [1_024usize, 16_384, 80_000] {
        let config = PipeConfig::new(capacity, capacity / 2);
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &config, |b, config| {
            b.iter(|| {
                let (mut reader, mut writer) = pipe(config);
                let producer_data = data.clone();
                let producer = thread::spawn(move || {
                    for _ in 0..PAYLOAD / producer_data.len() {
                        writer.write_all(&producer_data).expect("write");
                    }
                });

                let mut buf = [0u8; 4096];
                let mut total = 0;
                loop {
                    let n = reader.read(&mut buf).expect("read");
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                producer.join().expect("producer panicked");
                black_box(total)
            });
        });
    }
    group.finish();
}

fn benchmark_small_pipes_between_stages(c: &mut Criterion) {
    let input = "2024-05-08 12:00:00 INFO request served\n\n".repeat(100_000);
    let mut group = c.benchmark_group("stage_pipes");
    group.throughput(Throughput::Bytes(input.len() as u64));

    for capacity in [512usize, 8_192, 80_000] {
        let config = PipeConfig::new(capacity, capacity / 2);
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &config, |b, config| {
            b.iter(|| {
                compile("noempty | noempty | noempty")
                    .expect("Compile failed")
                    .with_config(*config)
                    .expect("Invalid config")
                    .run(black_box(input.as_bytes()), io::sink())
                    .expect("Run failed")
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(15))
        .sample_size(20);
    targets = benchmark_raw_pipe, benchmark_small_pipes_between_stages
);
criterion_main!(benches);
