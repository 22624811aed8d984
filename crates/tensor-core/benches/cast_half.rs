// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for half-precision casting and row reductions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tensor_core::{softmax_rows, Shape, Tensor};

fn activations(batch: usize, width: usize) -> Tensor {
    let values: Vec<f32> = (0..batch * width).map(|i| (i % 97) as f32 / 97.0).collect();
    Tensor::from_f32(Shape::matrix(batch, width), &values).expect("valid shape")
}

fn bench_to_half(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_half");
    for &(batch, width) in &[(1usize, 128usize), (8, 128), (8, 768)] {
        let t = activations(batch, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{batch}x{width}")),
            &t,
            |b, t| b.iter(|| black_box(t.to_half().expect("f32 input"))),
        );
    }
    group.finish();
}

fn bench_softmax(c: &mut Criterion) {
    let t = activations(8, 1000);
    c.bench_function("softmax_rows_8x1000", |b| {
        b.iter(|| black_box(softmax_rows(&t).expect("f32 input")))
    });
}

criterion_group!(benches, bench_to_half, bench_softmax);
criterion_main!(benches);
