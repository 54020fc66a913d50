//! Snapshot model benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use livetree_bench::{flat_json, flat_node, nested_node};
use livetree_core::CompoundWrite;
use livetree_snapshot::{Index, Node, Path};

/// Benchmark building nodes from JSON.
fn bench_from_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_json");

    for count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let json = flat_json(count);
            b.iter(|| {
                let node = Node::from_json(black_box(&json)).unwrap();
                black_box(node);
            });
        });
    }

    group.finish();
}

/// Benchmark persistent updates against large nodes.
fn bench_update_child(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_child");

    for count in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("shallow", count), count, |b, &count| {
            let node = flat_node(count);
            let path = Path::new("k0042/score");
            b.iter(|| {
                let updated = node.update_child(black_box(&path), Node::leaf(1));
                black_box(updated);
            });
        });
    }

    group.bench_function("deep_depth4_width6", |b| {
        let node = nested_node(4, 6);
        let path = Path::new("key_3/key_1/key_5/key_0");
        b.iter(|| {
            let updated = node.update_child(black_box(&path), Node::leaf(true));
            black_box(updated);
        });
    });

    group.finish();
}

/// Benchmark ordered iteration under each index.
fn bench_ordered_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate_1000");
    let node = flat_node(1000);

    for (name, index) in [
        ("key", Index::Key),
        ("priority", Index::Priority),
        ("child_score", Index::child("score")),
    ] {
        let indexed = node.with_index(&index);
        group.bench_function(name, |b| {
            b.iter(|| {
                let count = indexed.iter_by(black_box(&index)).count();
                black_box(count);
            });
        });
    }

    group.finish();
}

/// Benchmark content hashing of a fresh node.
fn bench_content_hash(c: &mut Criterion) {
    c.bench_function("content_hash_depth3_width5", |b| {
        b.iter(|| {
            let node = nested_node(3, 5);
            black_box(node.content_hash());
        });
    });
}

/// Benchmark layering writes over a base node.
fn bench_compound_write(c: &mut Criterion) {
    c.bench_function("compound_write_apply_100", |b| {
        let base = flat_node(1000);
        let write = (0..100).fold(CompoundWrite::new(), |write, i| {
            write.add_write(&Path::new(&format!("k{:04}/score", i * 10)), Node::leaf(i))
        });
        b.iter(|| {
            black_box(write.apply(black_box(&base)));
        });
    });
}

criterion_group!(
    benches,
    bench_from_json,
    bench_update_child,
    bench_ordered_iteration,
    bench_content_hash,
    bench_compound_write,
);

criterion_main!(benches);
