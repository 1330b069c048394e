use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use watershed_core::merge_segments;

/// Tile the image with `n x n` square segments separated by ridge lines.
fn tiled_labels(n: usize, tile: usize) -> (Vec<usize>, Vec<i32>, Vec<f64>) {
    let side = n * (tile + 1) + 1;
    let dims = vec![side, side];
    let mut labels = vec![0i32; side * side];
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for ti in 0..n {
        for tj in 0..n {
            let label = (ti * n + tj + 1) as i32;
            for i in 0..tile {
                for j in 0..tile {
                    let r = 1 + ti * (tile + 1) + i;
                    let c = 1 + tj * (tile + 1) + j;
                    labels[r + c * side] = label;
                }
            }
        }
    }
    let image: Vec<f64> = labels
        .iter()
        .map(|&l| {
            if l == 0 {
                rng.gen_range(5.0..9.0)
            } else {
                rng.gen_range(9.0..11.0)
            }
        })
        .collect();
    (dims, labels, image)
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_segments");

    for n in [4usize, 8, 16] {
        let (dims, labels, image) = tiled_labels(n, 8);
        group.bench_function(format!("{n}x{n}_tiles"), |b| {
            b.iter(|| black_box(merge_segments(&dims, &labels, &image, 0.95, 0).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
