use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use push_etl::execution::Pipeline;

fn unsorted(n: u64, groups: u64) -> usize {
    let pipeline = Pipeline::new("bench");
    let values = pipeline.create_stream("values", 0..n).unwrap();
    let sums = values
        .aggregate("sum", |_| 0u64, move |v: &u64| v % groups, |acc, v| acc + v)
        .unwrap();
    let out = sums.to_list("collect").unwrap();
    pipeline.run_default().unwrap();
    out.len()
}

fn sorted(n: u64, groups: u64) -> usize {
    let run = (n / groups).max(1);
    let pipeline = Pipeline::new("bench");
    let values = pipeline.create_stream("values", 0..n).unwrap();
    let sums = values
        .assume_sorted(move |v: &u64| v / run)
        .aggregate("sum", |_| 0u64, |acc, v| acc + v)
        .unwrap();
    let out = sums.stream().to_list("collect").unwrap();
    pipeline.run_default().unwrap();
    out.len()
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    for n in [10_000u64, 100_000] {
        group.throughput(Throughput::Elements(n));
        group.bench_with_input(BenchmarkId::new("unsorted", n), &n, |b, &n| {
            b.iter(|| black_box(unsorted(n, 64)))
        });
        group.bench_with_input(BenchmarkId::new("sorted", n), &n, |b, &n| {
            b.iter(|| black_box(sorted(n, 64)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregation);
criterion_main!(benches);
