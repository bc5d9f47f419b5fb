//! Containment and resolution queries against flat and grid indexes.

use std::{hint::black_box, sync::Arc};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use region_core::{ApplicableRegionSet, IndexKind, Region, RegionIndex};
use region_flags::builtin;
use region_spatial::BlockPos;

/// Square plots laid out on a grid, 64 blocks apart.
fn plots(count: i32) -> Vec<Arc<Region>> {
    let mut side = 1;
    while side * side < count {
        side += 1;
    }
    (0..count)
        .filter_map(|i| {
            let x = (i % side) * 64;
            let z = (i / side) * 64;
            Region::cuboid(&format!("plot_{i}"), (x, 0, z).into(), (x + 48, 255, z + 48).into())
                .ok()
                .map(Arc::new)
        })
        .collect()
}

fn index(kind: IndexKind, regions: &[Arc<Region>]) -> RegionIndex {
    let index = RegionIndex::new(kind);
    index.add_all(regions.iter().cloned());
    index
}

fn containing_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("containing");

    for count in [100, 1000, 10000] {
        let regions = plots(count);
        let flat = index(IndexKind::Flat, &regions);
        let grid = index(IndexKind::default(), &regions);
        let probe = BlockPos::new(64 * 3 + 10, 64, 64 * 2 + 10);

        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("flat", count), &probe, |b, &probe| {
            b.iter(|| black_box(flat.containing(black_box(probe))));
        });

        group.bench_with_input(BenchmarkId::new("grid", count), &probe, |b, &probe| {
            b.iter(|| black_box(grid.containing(black_box(probe))));
        });
    }

    group.finish();
}

fn resolution_benchmarks(c: &mut Criterion) {
    let regions = plots(1000);
    let grid = index(IndexKind::default(), &regions);
    let probe = BlockPos::new(10, 64, 10);

    c.bench_function("query_pvp", |b| {
        b.iter(|| {
            let set = ApplicableRegionSet::new(grid.containing(probe), None);
            black_box(set.query_value(&builtin::PVP, None))
        });
    });
}

criterion_group!(benches, containing_benchmarks, resolution_benchmarks);
criterion_main!(benches);
