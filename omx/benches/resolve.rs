use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::tempdir;

use omx::{ImportConfig, MemorySource, OpenMatrix, Resolver};

fn zone_ids(n: usize) -> Vec<i64> {
    (0..n as i64).map(|i| 1000 + i * 3).collect()
}

fn bench_resolver(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolver");
    let mut rng = StdRng::seed_from_u64(7);

    for size in [1_000usize, 100_000] {
        let sorted = zone_ids(size);
        let mut shuffled = sorted.clone();
        shuffled.shuffle(&mut rng);
        let queries: Vec<i64> = (0..size)
            .map(|_| sorted[rng.gen_range(0..size)])
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("sorted", size), &queries, |b, q| {
            let resolver = Resolver::new(&sorted).unwrap();
            b.iter(|| black_box(resolver.resolve_all(q)));
        });
        group.bench_with_input(BenchmarkId::new("unsorted", size), &queries, |b, q| {
            let resolver = Resolver::new(&shuffled).unwrap();
            b.iter(|| black_box(resolver.resolve_all(q)));
        });
    }
    group.finish();
}

fn bench_container_resolve(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut omx = OpenMatrix::create(dir.path().join("bench.omx")).unwrap();
    let zones = zone_ids(50_000);
    omx.set_shape(zones.len() as u64, zones.len() as u64).unwrap();
    omx.add_lookup("taz", zones.clone()).unwrap();

    // Large enough to take the parallel path
    let queries: Vec<i64> = zones.iter().rev().copied().collect();

    let mut group = c.benchmark_group("container_resolve");
    group.throughput(Throughput::Elements(queries.len() as u64));
    group.bench_function("taz_50000", |b| {
        b.iter(|| black_box(omx.resolve("taz", &queries).unwrap()));
    });
    group.finish();
}

fn bench_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("import");
    let zones = 200u64;
    let records = zones * zones;
    group.throughput(Throughput::Elements(records));
    group.sample_size(10);

    group.bench_function("table_200x200", |b| {
        b.iter_with_setup(
            || {
                let dir = tempdir().unwrap();
                let mut omx = OpenMatrix::create(dir.path().join("bench.omx")).unwrap();
                omx.set_shape(zones, zones).unwrap();
                let rows = (1..=zones).flat_map(|o| {
                    (1..=zones).map(move |d| [o.to_string(), d.to_string(), (o * d).to_string()])
                });
                let source = MemorySource::new(["o", "d", "time"], rows);
                (dir, omx, source)
            },
            |(_dir, mut omx, mut source)| {
                let config = ImportConfig::default().with_chunk_size(10_000);
                omx.import_table(&mut source, &config).unwrap();
            },
        );
    });
    group.finish();
}

criterion_group!(benches, bench_resolver, bench_container_resolve, bench_import);
criterion_main!(benches);
