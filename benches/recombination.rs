use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use forward_wf::recombination::recombine;
use forward_wf::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

/// Two haplotypes each carrying `m` neutral mutations drawn from one shared
/// table of `2 * m` uniform positions.
fn create_parents(m: usize, rng: &mut SmallRng) -> (Vec<Mutation>, Haplotype, Haplotype) {
    let mut positions: Vec<f64> = (0..2 * m).map(|_| rng.random::<f64>()).collect();
    positions.sort_unstable_by(f64::total_cmp);
    let mutations: Vec<Mutation> = positions
        .iter()
        .map(|&p| Mutation::neutral(p, 0, 0))
        .collect();
    let mut first = Haplotype::new(1);
    let mut second = Haplotype::new(1);
    for k in 0..2 * m {
        if k % 2 == 0 {
            first.neutral.push(k);
        } else {
            second.neutral.push(k);
        }
    }
    (mutations, first, second)
}

fn bench_recombine(c: &mut Criterion) {
    let mut group = c.benchmark_group("recombine");
    let mut rng = SmallRng::seed_from_u64(42);

    for &(m, crossovers) in &[(100, 1), (1000, 1), (1000, 10), (10000, 10)] {
        let (mutations, first, second) = create_parents(m, &mut rng);
        let model = FixedCrossovers::new(crossovers, 0.0, 1.0).unwrap();
        let breakpoints = model.breakpoints(&mut rng);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{m}mut_{crossovers}xo")),
            &breakpoints,
            |b, bps| {
                let (mut neutral, mut selected) = (Vec::new(), Vec::new());
                b.iter(|| {
                    recombine(bps, &first, &second, &mutations, &mut neutral, &mut selected)
                        .unwrap();
                    black_box(neutral.len())
                });
            },
        );
    }

    group.finish();
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");
    group.sample_size(20);

    for &n in &[100, 1000] {
        let options = SamplerOptions {
            check_invariants: false,
            ..SamplerOptions::default()
        };
        let mutator =
            Mutator::new(Box::new(InfiniteSites::neutral(0.01, 0.0, 1.0).unwrap())).unwrap();
        let rec = PoissonInterval::new(0.5, 0.0, 1.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        let mut pop = DiploidPopulation::<()>::new(n).unwrap();
        // Burn in so the tables are populated.
        for _ in 0..4 * n {
            sample_diploid(&mut rng, &mut pop, &mutator, &rec, &Neutral, &options, n).unwrap();
        }
        group.bench_function(BenchmarkId::from_parameter(n), |b| {
            b.iter(|| {
                black_box(
                    sample_diploid(&mut rng, &mut pop, &mutator, &rec, &Neutral, &options, n)
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_recombine, bench_generation);
criterion_main!(benches);
