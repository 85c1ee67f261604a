//! One Wright-Fisher generation.
//!
//! Parents are drawn with replacement proportional to fitness, each
//! transmits one recombined and mutated gamete, and the offspring table
//! replaces the parents wholesale before counts are reconciled.
//!
//! Random draws per offspring happen in this order: parent 1, parent 2
//! (redrawn while equal to parent 1 if selfing is excluded), then for each
//! gamete in turn: which parental chromosome leads, the breakpoints, the
//! number of new mutations, and each new mutation's attributes.

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::fitness::FitnessModel;
use crate::haplotype::HaplotypePolicy;
use crate::mutator::{Mutator, add_to_gamete};
use crate::population::{Diploid, DiploidPopulation, two_n};
use crate::recombination::{RecombinationModel, recombine_unchecked, validate_breakpoints};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerOptions {
    pub haplotype_policy: HaplotypePolicy,
    pub allow_selfing: bool,
    /// Verify the population invariants after every generation.
    pub check_invariants: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            haplotype_policy: HaplotypePolicy::Distinct,
            allow_selfing: true,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

/// Scratch index sequences reused across gametes.
#[derive(Default)]
struct GameteBuffers {
    neutral: Vec<usize>,
    selected: Vec<usize>,
}

/// Fitness of every current diploid, rejecting negative or non-finite
/// values.
pub fn parental_fitnesses<D>(
    pop: &DiploidPopulation<D>,
    fitness: &dyn FitnessModel<D>,
) -> Result<Vec<f64>> {
    let haps = pop.haplotypes.haplotypes();
    let muts = pop.mutations.mutations();
    pop.diploids
        .iter()
        .enumerate()
        .map(|(index, d)| {
            let value = fitness.fitness(d, haps, muts);
            if value >= 0.0 && value.is_finite() {
                Ok(value)
            } else {
                Err(SimError::InvalidFitness { index, value })
            }
        })
        .collect()
}

/// Advance `pop` by one generation to `next_n` diploids and return the mean
/// parental fitness.
///
/// Fitness weights are computed and checked before anything is modified, so
/// a zero-fitness population or an invalid fitness value leaves `pop`
/// untouched.
pub fn sample_diploid<D: Default + Clone>(
    rng: &mut SmallRng,
    pop: &mut DiploidPopulation<D>,
    mutator: &Mutator,
    recombination: &dyn RecombinationModel,
    fitness: &dyn FitnessModel<D>,
    options: &SamplerOptions,
    next_n: usize,
) -> Result<f64> {
    two_n(next_n)?;
    let n = pop.size();

    let fitnesses = parental_fitnesses(pop, fitness)?;
    let total: f64 = fitnesses.iter().sum();
    if total == 0.0 {
        return Err(SimError::ZeroFitness(n));
    }
    let wbar = total / n as f64;
    if !options.allow_selfing && fitnesses.iter().filter(|&&w| w > 0.0).count() < 2 {
        return Err(SimError::InvalidParameter(
            "selfing is excluded but fewer than two diploids can reproduce".to_string(),
        ));
    }
    let parents = WeightedIndex::new(&fitnesses)
        .map_err(|e| SimError::InvalidParameter(format!("parent weights: {e}")))?;

    let generation = pop.generation + 1;
    let mut buffers = GameteBuffers::default();
    let mut offspring: Vec<Diploid<D>> = Vec::with_capacity(next_n);

    for _ in 0..next_n {
        let p1 = parents.sample(rng);
        let mut p2 = parents.sample(rng);
        if !options.allow_selfing {
            while p2 == p1 {
                p2 = parents.sample(rng);
            }
        }
        let mother = (pop.diploids[p1].first, pop.diploids[p1].second);
        let father = (pop.diploids[p2].first, pop.diploids[p2].second);
        let first = produce_gamete(
            rng,
            pop,
            mother,
            generation,
            mutator,
            recombination,
            options.haplotype_policy,
            &mut buffers,
        )?;
        let second = produce_gamete(
            rng,
            pop,
            father,
            generation,
            mutator,
            recombination,
            options.haplotype_policy,
            &mut buffers,
        )?;
        offspring.push(Diploid::new(first, second));
    }

    pop.replace_diploids(offspring);
    pop.generation = generation;
    pop.reconcile_counts();
    if options.check_invariants {
        pop.check_invariants()?;
    }
    Ok(wbar)
}

/// Transmit one gamete from a parent with haplotypes `parent` and return
/// the offspring haplotype's index.
///
/// Without an effective crossover or new mutation the parental haplotype
/// index is reused directly.
#[allow(clippy::too_many_arguments)]
fn produce_gamete<D>(
    rng: &mut SmallRng,
    pop: &mut DiploidPopulation<D>,
    parent: (usize, usize),
    generation: u32,
    mutator: &Mutator,
    recombination: &dyn RecombinationModel,
    policy: HaplotypePolicy,
    buffers: &mut GameteBuffers,
) -> Result<usize> {
    let (mut h1, mut h2) = parent;
    if rng.random_bool(0.5) {
        std::mem::swap(&mut h1, &mut h2);
    }
    let breakpoints = recombination.breakpoints(rng);
    validate_breakpoints(&breakpoints)?;
    let crosses = !breakpoints.is_empty() && h1 != h2;
    let num_new = mutator.num_new(rng);

    if !crosses && num_new == 0 {
        pop.haplotypes.increment(h1);
        return Ok(h1);
    }

    let haps = pop.haplotypes.haplotypes();
    if crosses {
        recombine_unchecked(
            &breakpoints,
            &haps[h1],
            &haps[h2],
            pop.mutations.mutations(),
            &mut buffers.neutral,
            &mut buffers.selected,
        );
    } else {
        recombine_unchecked(
            &[],
            &haps[h1],
            &haps[h1],
            pop.mutations.mutations(),
            &mut buffers.neutral,
            &mut buffers.selected,
        );
    }

    for _ in 0..num_new {
        let mutation = mutator.new_mutation(rng, &pop.mutations, generation);
        add_to_gamete(
            &mut pop.mutations,
            mutation,
            &mut buffers.neutral,
            &mut buffers.selected,
        );
    }

    Ok(pop
        .haplotypes
        .insert(policy, 1, &buffers.neutral, &buffers.selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::Neutral;
    use crate::mutator::InfiniteSites;
    use crate::recombination::{NoRecombination, PoissonInterval};
    use rand::SeedableRng;

    fn neutral_mutator(rate: f64) -> Mutator {
        Mutator::new(Box::new(InfiniteSites::neutral(rate, 0.0, 1.0).unwrap())).unwrap()
    }

    fn checked() -> SamplerOptions {
        SamplerOptions {
            check_invariants: true,
            ..SamplerOptions::default()
        }
    }

    #[test]
    fn zero_fitness_is_an_error_and_leaves_state() {
        let mut pop = DiploidPopulation::<()>::new(3).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let dead = |_: &Diploid, _: &[crate::Haplotype], _: &[crate::Mutation]| 0.0;
        let rv = sample_diploid(
            &mut rng,
            &mut pop,
            &neutral_mutator(0.5),
            &NoRecombination,
            &dead,
            &checked(),
            3,
        );
        assert!(matches!(rv, Err(SimError::ZeroFitness(3))));
        assert_eq!(pop.generation(), 0);
        assert!(pop.mutations().is_empty());
    }

    #[test]
    fn negative_fitness_is_rejected() {
        let mut pop = DiploidPopulation::<()>::new(2).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let bad = |_: &Diploid, _: &[crate::Haplotype], _: &[crate::Mutation]| -1.0;
        let rv = sample_diploid(
            &mut rng,
            &mut pop,
            &neutral_mutator(0.0),
            &NoRecombination,
            &bad,
            &checked(),
            2,
        );
        assert!(matches!(rv, Err(SimError::InvalidFitness { index: 0, .. })));
    }

    #[test]
    fn size_change_and_selfing_exclusion() {
        let mut pop = DiploidPopulation::<()>::new(10).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let options = SamplerOptions {
            allow_selfing: false,
            ..checked()
        };
        let mutator = neutral_mutator(0.2);
        let rec = PoissonInterval::new(1.0, 0.0, 1.0).unwrap();
        for next in [20, 5, 7] {
            let wbar = sample_diploid(&mut rng, &mut pop, &mutator, &rec, &Neutral, &options, next)
                .unwrap();
            assert_eq!(wbar, 1.0);
            assert_eq!(pop.size(), next);
            assert_eq!(pop.haplotypes().total_copies(), 2 * next as u64);
        }
        assert_eq!(pop.generation(), 3);
        assert!(matches!(
            sample_diploid(&mut rng, &mut pop, &mutator, &rec, &Neutral, &options, 0),
            Err(SimError::EmptyPopulation)
        ));

        let mut single = DiploidPopulation::<()>::new(1).unwrap();
        assert!(matches!(
            sample_diploid(&mut rng, &mut single, &mutator, &rec, &Neutral, &options, 1),
            Err(SimError::InvalidParameter(_))
        ));
    }

    #[test]
    fn same_seed_same_trajectory() {
        let run = |seed| {
            let mut pop = DiploidPopulation::<()>::new(20).unwrap();
            let mut rng = SmallRng::seed_from_u64(seed);
            let mutator = neutral_mutator(0.3);
            let rec = PoissonInterval::new(0.5, 0.0, 1.0).unwrap();
            for _ in 0..10 {
                sample_diploid(&mut rng, &mut pop, &mutator, &rec, &Neutral, &checked(), 20)
                    .unwrap();
            }
            (
                pop.mutations().mutations().to_vec(),
                pop.diploids().to_vec(),
            )
        };
        assert_eq!(run(99), run(99));
    }
}
