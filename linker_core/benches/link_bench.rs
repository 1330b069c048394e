use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linker_core::{
    viterbi_track_linking, CountRow, LinkProblem, LinkerConfig, MigrationRow,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `n` cells drifting through `t` frames: n detections per frame, full
/// migration fan-in between neighbors, noisy scores.
fn drifting_cells(n: usize, t: usize) -> LinkProblem {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut problem = LinkProblem {
        detections_per_frame: vec![n; t],
        ..Default::default()
    };
    for frame in 1..=t {
        for d in 1..=n {
            problem.counts.push(CountRow {
                frame,
                detection: d,
                scores: vec![0.0, rng.gen_range(5.0..10.0), -50.0],
            });
        }
    }
    for frame in 1..t {
        for from in 1..=n {
            for to in 1..=n {
                let score = if from == to {
                    rng.gen_range(3.0..5.0)
                } else {
                    rng.gen_range(-2.0..2.0)
                };
                problem.migrations.push(MigrationRow {
                    frame,
                    from,
                    to,
                    scores: [0.0, score],
                });
            }
        }
    }
    problem
}

fn bench_linking(c: &mut Criterion) {
    let mut group = c.benchmark_group("viterbi_track_linking");

    for (n, t) in [(5usize, 10usize), (10, 20), (20, 20)] {
        let problem = drifting_cells(n, t);
        group.bench_function(format!("{n}_cells_{t}_frames"), |b| {
            b.iter(|| {
                black_box(
                    viterbi_track_linking(&problem, LinkerConfig::default()).unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_linking);
criterion_main!(benches);
