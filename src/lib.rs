pub mod error;
pub mod fitness;
pub mod haplotype;
pub mod mutation;
pub mod mutator;
pub mod population;
pub mod recombination;
pub mod recycling;
pub mod sample;
pub mod sampler;

use std::path::Path;

use indicatif::ProgressBar;
use rand::SeedableRng;
use rand::prelude::*;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

pub use error::{Result, SimError};
pub use fitness::{
    Additive, FitnessKind, FitnessModel, Multiplicative, Neutral, StabilizingSelection,
};
pub use haplotype::{Haplotype, HaplotypePolicy, HaplotypeRegistry};
pub use mutation::{Fixation, Mutation, MutationRegistry};
pub use mutator::{EffectDist, InfiniteSites, MutationModel, Mutator, expected_segregating};
pub use population::{Chromosome, Diploid, DiploidPopulation};
pub use recombination::{
    FixedBreakpoints, FixedCrossovers, NoRecombination, PoissonInterval, RecombinationModel,
    SENTINEL,
};
pub use sampler::{SamplerOptions, sample_diploid};

// ── Parameters ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub random_seed: u64,
    pub population_size: usize,
    pub runtime: usize,
    /// Expected neutral mutations per gamete per generation.
    pub neutral_mutation_rate: f64,
    /// Expected selected mutations per gamete per generation.
    pub selected_mutation_rate: f64,
    /// Expected crossovers per meiosis.
    pub recombination_rate: f64,
    pub left: f64,
    pub right: f64,
    pub effect_dist: EffectDist,
    pub dominance: f64,
    pub fitness: FitnessKind,
    pub haplotype_policy: HaplotypePolicy,
    pub allow_selfing: bool,
    pub check_invariants: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        let mut rng = rand::rng();
        let random_seed = rng.random_range(1..u64::MAX);
        Self {
            random_seed,
            population_size: 1_000,
            runtime: 10_000,
            neutral_mutation_rate: 0.01,
            selected_mutation_rate: 0.0,
            recombination_rate: 0.01,
            left: 0.0,
            right: 1.0,
            effect_dist: EffectDist::default(),
            dominance: 0.5,
            fitness: FitnessKind::default(),
            haplotype_policy: HaplotypePolicy::default(),
            allow_selfing: true,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

impl Parameters {
    /// Read parameters from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        population::two_n(self.population_size)?;
        for (name, rate) in [
            ("neutral_mutation_rate", self.neutral_mutation_rate),
            ("selected_mutation_rate", self.selected_mutation_rate),
            ("recombination_rate", self.recombination_rate),
        ] {
            if !(rate >= 0.0 && rate.is_finite()) {
                return Err(SimError::InvalidParameter(format!(
                    "{name} must be finite and non-negative, got {rate}"
                )));
            }
        }
        if !(self.left < self.right && self.left.is_finite() && self.right.is_finite()) {
            return Err(SimError::InvalidParameter(format!(
                "invalid region [{}, {})",
                self.left, self.right
            )));
        }
        if !self.allow_selfing && self.population_size < 2 {
            return Err(SimError::InvalidParameter(
                "selfing can only be excluded with at least two diploids".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            haplotype_policy: self.haplotype_policy,
            allow_selfing: self.allow_selfing,
            check_invariants: self.check_invariants,
        }
    }
}

// ── Tracker trait ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationRecord {
    pub generation: u32,
    /// Mean fitness of the parents of this generation.
    pub mean_fitness: f64,
    pub num_segregating: usize,
    /// Fixations recorded so far.
    pub num_fixations: usize,
    pub num_haplotypes: usize,
}

/// Trait for recording per-generation statistics.
/// Implementations have access to WrightFisher to compute custom statistics.
pub trait TrackerTrait<D = ()> {
    /// Called after each generation completes.
    fn record_generation(&mut self, wf: &WrightFisher<D>, record: GenerationRecord) -> Result<()>;
    /// Called once at the end of the simulation.
    fn finalize(&mut self, wf: &WrightFisher<D>) -> Result<()>;
}

/// Default implementation that just collects all records.
#[derive(Debug, Default)]
pub struct SimpleTracker {
    pub records: Vec<GenerationRecord>,
}

impl SimpleTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D> TrackerTrait<D> for SimpleTracker {
    fn record_generation(&mut self, _wf: &WrightFisher<D>, record: GenerationRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn finalize(&mut self, _wf: &WrightFisher<D>) -> Result<()> {
        Ok(())
    }
}

// ── Simulator ─────────────────────────────────────────────────────────────────
pub struct WrightFisher<D = ()> {
    pub params: Parameters,
    pub population: DiploidPopulation<D>,
    pub rng: SmallRng,
    pub options: SamplerOptions,
    mutator: Mutator,
    recombination: Box<dyn RecombinationModel>,
    fitness: Box<dyn FitnessModel<D>>,
}

impl<D: Default + Clone + 'static> WrightFisher<D> {
    // ── Construction ──────────────────────────────────────────────────────────

    pub fn initialize(params: Parameters) -> Result<Self> {
        params.validate()?;
        let mut population = DiploidPopulation::new(params.population_size)?;
        let mu = params.neutral_mutation_rate + params.selected_mutation_rate;
        population.reserve_mutations(expected_segregating(params.population_size, mu) as usize);

        let model = InfiniteSites::new(
            params.neutral_mutation_rate,
            params.selected_mutation_rate,
            params.left,
            params.right,
            &params.effect_dist,
            params.dominance,
        )?;
        let recombination: Box<dyn RecombinationModel> = if params.recombination_rate > 0.0 {
            Box::new(PoissonInterval::new(
                params.recombination_rate,
                params.left,
                params.right,
            )?)
        } else {
            Box::new(NoRecombination)
        };
        log::info!(
            "initialized N = {}, seed = {}, mu = {mu}, r = {}",
            params.population_size,
            params.random_seed,
            params.recombination_rate
        );

        Ok(Self {
            rng: SmallRng::seed_from_u64(params.random_seed),
            options: params.sampler_options(),
            mutator: Mutator::new(Box::new(model))?,
            recombination,
            fitness: params.fitness.build(),
            population,
            params,
        })
    }

    pub fn with_fitness(mut self, fitness: impl FitnessModel<D> + 'static) -> Self {
        self.fitness = Box::new(fitness);
        self
    }

    pub fn with_mutation_model(mut self, model: impl MutationModel + 'static) -> Result<Self> {
        self.mutator = Mutator::new(Box::new(model))?;
        Ok(self)
    }

    pub fn with_recombination_model(mut self, model: impl RecombinationModel + 'static) -> Self {
        self.recombination = Box::new(model);
        self
    }

    pub fn mutator(&self) -> &Mutator {
        &self.mutator
    }

    // ── Generation loop ───────────────────────────────────────────────────────

    /// Advance one generation at constant size. Returns mean parental fitness.
    pub fn step(&mut self) -> Result<f64> {
        let n = self.population.size();
        self.step_to(n)
    }

    /// Advance one generation, producing `next_n` offspring.
    pub fn step_to(&mut self, next_n: usize) -> Result<f64> {
        sample_diploid(
            &mut self.rng,
            &mut self.population,
            &self.mutator,
            self.recombination.as_ref(),
            self.fitness.as_ref(),
            &self.options,
            next_n,
        )
    }

    pub fn record(&self, mean_fitness: f64) -> GenerationRecord {
        GenerationRecord {
            generation: self.population.generation(),
            mean_fitness,
            num_segregating: self.population.mutations().num_segregating(),
            num_fixations: self.population.mutations().fixations().len(),
            num_haplotypes: self.population.haplotypes().num_live(),
        }
    }

    pub fn run(&mut self, tracker: &mut dyn TrackerTrait<D>) -> Result<()> {
        let bar = ProgressBar::new(self.params.runtime as u64);
        for _ in 0..self.params.runtime {
            bar.inc(1);
            let wbar = self.step()?;
            tracker.record_generation(self, self.record(wbar))?;
        }
        bar.finish();
        log::info!(
            "finished at generation {}: {} segregating, {} fixed",
            self.population.generation(),
            self.population.mutations().num_segregating(),
            self.population.mutations().fixations().len()
        );
        tracker.finalize(self)
    }
}
