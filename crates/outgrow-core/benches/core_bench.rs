//! Criterion benchmarks for outgrow-core.
//!
//! ## Benchmark groups
//!
//! 1. **parse**: program model construction.
//! 2. **graph**: reference graph build.
//! 3. **convert**: full in-memory conversion, plugins included.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/outgrow-core/Cargo.toml
//! # Run only the conversion group:
//! cargo bench --manifest-path crates/outgrow-core/Cargo.toml -- convert
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use outgrow_core::graph::ReferenceGraph;
use outgrow_core::program::ProgramModel;
use outgrow_core::{ConvertConfig, Converter};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A program with `n` models, each with an admin registration, a view, an
/// API endpoint and a helper used by the view.
fn synthetic_program(n: usize) -> String {
    let mut src = String::from(
        "from nanodjango import Django\n\
         from django.db import models\n\n\
         app = Django(DEBUG=True)\n\n\
         PAGE_SIZE = 20\n",
    );
    for i in 0..n {
        src.push_str(&format!(
            "\n\n@app.admin\n\
             class Item{i}(models.Model):\n    \
                 name = models.CharField(max_length=PAGE_SIZE)\n\n\n\
             def describe_{i}(obj):\n    \
                 return f\"{{obj.name}} #{i}\"\n\n\n\
             @app.route(\"/item{i}/<int:pk>/\")\n\
             def item_{i}(request, pk):\n    \
                 return describe_{i}(Item{i}.objects.get(pk=pk))\n\n\n\
             @app.api.get(\"/item{i}\")\n\
             def api_item_{i}(request):\n    \
                 return {{\"count\": Item{i}.objects.count()}}\n"
        ));
    }
    src
}

// ---------------------------------------------------------------------------
// Benchmark: parse
// ---------------------------------------------------------------------------

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for &n in &[10, 100, 500] {
        let src = synthetic_program(n);
        group.bench_with_input(BenchmarkId::new("program_model", n), &src, |b, src| {
            b.iter(|| black_box(ProgramModel::parse(src).unwrap()));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: graph
// ---------------------------------------------------------------------------

fn bench_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph");
    for &n in &[10, 100, 500] {
        let program = ProgramModel::parse(&synthetic_program(n)).unwrap();
        group.bench_with_input(BenchmarkId::new("build", n), &program, |b, program| {
            b.iter(|| black_box(ReferenceGraph::build(program)));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: convert
// ---------------------------------------------------------------------------

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");
    // Full conversions on the largest input take a while per iteration.
    group.sample_size(20);
    let converter = Converter::new(ConvertConfig::new("site", "shop")).unwrap();
    for &n in &[10, 100, 500] {
        let src = synthetic_program(n);
        group.bench_with_input(BenchmarkId::new("source", n), &src, |b, src| {
            b.iter(|| black_box(converter.convert_source(src).unwrap()));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Register all benchmark groups
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_parse, bench_graph, bench_convert);
criterion_main!(benches);
