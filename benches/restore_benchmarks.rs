//! Criterion benchmarks for the restoration core.
//!
//! Run with: cargo bench
//! Run specific: cargo bench -- bench_restore

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array2, Array3};

use tvdeconv_core::{d_solve, tv_restore, Image, Kernel, TvRestoreOpts, VecField};

// =============================================================================
// Helper Functions for Test Data Generation
// =============================================================================

fn blocky_image(width: usize, height: usize, channels: usize) -> Image<f64> {
    Array3::from_shape_fn((channels, height, width), |(k, y, x)| {
        if (x / 8 + y / 8 + k) % 2 == 0 {
            0.9
        } else {
            0.2
        }
    })
}

fn box_kernel() -> Kernel<f64> {
    Kernel::new(Array2::from_elem((3, 3), 1.0 / 9.0)).unwrap()
}

fn shifted_kernel() -> Kernel<f64> {
    let mut data = Array2::zeros((3, 3));
    data[[0, 1]] = 0.5;
    data[[1, 1]] = 0.5;
    Kernel::new(data).unwrap()
}

// =============================================================================
// d-Subproblem Benchmarks
// =============================================================================

fn bench_d_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("d_solve");

    for size in [64, 128, 256] {
        let u = blocky_image(size, size, 1);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::new("grayscale", size), &size, |b, _| {
            let mut d = VecField::zeros(size, size, 1);
            let mut dtilde = VecField::zeros(size, size, 1);
            b.iter(|| d_solve(black_box(&u), &mut d, &mut dtilde, 5.0))
        });
    }

    group.finish();
}

// =============================================================================
// Full Restoration Benchmarks
// =============================================================================

fn bench_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("tv_restore");
    group.sample_size(10);

    for size in [32, 64, 128] {
        let f = blocky_image(size, size, 1);
        group.throughput(Throughput::Elements((size * size) as u64));

        let dct_opts = TvRestoreOpts::new().with_max_iter(10).with_tol(0.0).with_kernel(box_kernel());
        group.bench_with_input(BenchmarkId::new("dct_path", size), &size, |b, _| {
            b.iter(|| {
                let mut u = f.clone();
                tv_restore(black_box(&mut u), &f, &dct_opts).unwrap()
            })
        });

        let dft_opts = TvRestoreOpts::new()
            .with_max_iter(10)
            .with_tol(0.0)
            .with_kernel(shifted_kernel());
        group.bench_with_input(BenchmarkId::new("fourier_path", size), &size, |b, _| {
            b.iter(|| {
                let mut u = f.clone();
                tv_restore(black_box(&mut u), &f, &dft_opts).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_d_solve, bench_restore);
criterion_main!(benches);
