//! Pipeline benchmarks
//!
//! Measures assembly and canonicalization over synthetic chain graphs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use canonir::emit::TextEmitter;
use canonir::graph::GraphMeta;
use canonir::ingest::{assemble_model, InMemoryLoader, RawGraph, RawInput, RawNode};
use canonir::pipeline::Compiler;

/// Chain of `len` identity/relu pairs: plenty of elision work
fn chain_raw(len: usize) -> RawGraph {
    let mut nodes = Vec::with_capacity(len * 2);
    let mut prev = "x".to_string();
    for i in 0..len {
        let id_out = format!("id_{i}");
        let relu_out = format!("relu_{i}");
        nodes.push(RawNode::new(
            &format!("id_node_{i}"),
            "Identity",
            &[prev.as_str()],
            &[id_out.as_str()],
        ));
        nodes.push(RawNode::new(
            &format!("relu_node_{i}"),
            "Relu",
            &[id_out.as_str()],
            &[relu_out.as_str()],
        ));
        prev = relu_out;
    }
    RawGraph {
        name: "chain".to_string(),
        inputs: vec![RawInput::new("x", &[8, 16])],
        outputs: vec![prev],
        constants: vec![],
        nodes,
    }
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    for len in [16usize, 64, 256] {
        let raw = chain_raw(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &raw, |b, raw| {
            b.iter(|| assemble_model(black_box(raw), GraphMeta::default()).unwrap());
        });
    }
    group.finish();
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    for len in [16usize, 64] {
        let raw = chain_raw(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &raw, |b, raw| {
            let compiler = Compiler::new();
            let emitter = TextEmitter::new();
            b.iter(|| {
                let loader = InMemoryLoader::new(raw.clone(), GraphMeta::default());
                compiler.compile(black_box(&loader), &emitter).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assemble, bench_canonicalize);
criterion_main!(benches);
