//! New mutations: the models that describe them and the engine that places
//! them on transmitted haplotypes.

use rand::Rng;
use rand::distr::{Distribution, Uniform};
use rand::rngs::SmallRng;
use rand_distr::{Exp, Gamma, Poisson};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::mutation::{Mutation, MutationRegistry};

/// Rates and generators for new mutations.
///
/// `position` must have enough range that it eventually escapes positions
/// already segregating; the engine redraws on collision without limit.
pub trait MutationModel {
    /// Expected neutral mutations per gamete per generation.
    fn neutral_rate(&self) -> f64;
    /// Expected selected mutations per gamete per generation.
    fn selected_rate(&self) -> f64;
    fn position(&self, rng: &mut SmallRng) -> f64;
    fn selection_coefficient(&self, rng: &mut SmallRng) -> f64;
    fn dominance(&self, rng: &mut SmallRng, s: f64) -> f64;
    fn label(&self) -> u16 {
        0
    }
}

// ── Effect sizes ─────────────────────────────────────────────────────────────

/// Distribution of selection coefficients.
///
/// For `Exponential` and `Gamma` the sign of `mean` is the sign of every
/// draw, so a negative mean gives deleterious mutations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EffectDist {
    Constant { s: f64 },
    Uniform { lo: f64, hi: f64 },
    Exponential { mean: f64 },
    Gamma { mean: f64, shape: f64 },
}

impl Default for EffectDist {
    fn default() -> Self {
        Self::Constant { s: -0.01 }
    }
}

#[derive(Clone, Debug)]
enum EffectSampler {
    Constant(f64),
    Uniform(Uniform<f64>),
    Exponential { sign: f64, dist: Exp<f64> },
    Gamma { sign: f64, dist: Gamma<f64> },
}

impl EffectSampler {
    fn new(dist: &EffectDist) -> Result<Self> {
        let invalid = |what: String| SimError::InvalidParameter(format!("{dist:?}: {what}"));
        let sampler = match *dist {
            EffectDist::Constant { s } if s.is_finite() => Self::Constant(s),
            EffectDist::Constant { s } => return Err(invalid(format!("non-finite effect {s}"))),
            EffectDist::Uniform { lo, hi } => {
                Self::Uniform(Uniform::new(lo, hi).map_err(|e| invalid(e.to_string()))?)
            }
            EffectDist::Exponential { mean } if mean == 0.0 => Self::Constant(0.0),
            EffectDist::Exponential { mean } => Self::Exponential {
                sign: mean.signum(),
                dist: Exp::new(1.0 / mean.abs()).map_err(|e| invalid(e.to_string()))?,
            },
            EffectDist::Gamma { mean, .. } if mean == 0.0 => Self::Constant(0.0),
            EffectDist::Gamma { mean, shape } => Self::Gamma {
                sign: mean.signum(),
                dist: Gamma::new(shape, mean.abs() / shape)
                    .map_err(|e| invalid(e.to_string()))?,
            },
        };
        Ok(sampler)
    }

    fn sample(&self, rng: &mut SmallRng) -> f64 {
        match self {
            Self::Constant(s) => *s,
            Self::Uniform(dist) => dist.sample(rng),
            Self::Exponential { sign, dist } => sign * dist.sample(rng),
            Self::Gamma { sign, dist } => sign * dist.sample(rng),
        }
    }
}

// ── Infinite-sites model ─────────────────────────────────────────────────────

/// Uniform positions on `[left, right)`, effects from an [`EffectDist`] and
/// constant dominance.
#[derive(Clone, Debug)]
pub struct InfiniteSites {
    neutral_rate: f64,
    selected_rate: f64,
    positions: Uniform<f64>,
    effect: EffectSampler,
    dominance: f64,
    label: u16,
}

impl InfiniteSites {
    pub fn new(
        neutral_rate: f64,
        selected_rate: f64,
        left: f64,
        right: f64,
        effect: &EffectDist,
        dominance: f64,
    ) -> Result<Self> {
        check_rate("neutral mutation rate", neutral_rate)?;
        check_rate("selected mutation rate", selected_rate)?;
        let positions = Uniform::new(left, right).map_err(|e| {
            SimError::InvalidParameter(format!("invalid region [{left}, {right}): {e}"))
        })?;
        Ok(Self {
            neutral_rate,
            selected_rate,
            positions,
            effect: EffectSampler::new(effect)?,
            dominance,
            label: 0,
        })
    }

    /// Neutral-only mutations on `[left, right)`.
    pub fn neutral(rate: f64, left: f64, right: f64) -> Result<Self> {
        Self::new(rate, 0.0, left, right, &EffectDist::Constant { s: 0.0 }, 0.0)
    }

    pub fn with_label(mut self, label: u16) -> Self {
        self.label = label;
        self
    }
}

impl MutationModel for InfiniteSites {
    fn neutral_rate(&self) -> f64 {
        self.neutral_rate
    }

    fn selected_rate(&self) -> f64 {
        self.selected_rate
    }

    fn position(&self, rng: &mut SmallRng) -> f64 {
        self.positions.sample(rng)
    }

    fn selection_coefficient(&self, rng: &mut SmallRng) -> f64 {
        self.effect.sample(rng)
    }

    fn dominance(&self, _rng: &mut SmallRng, _s: f64) -> f64 {
        self.dominance
    }

    fn label(&self) -> u16 {
        self.label
    }
}

fn check_rate(name: &str, rate: f64) -> Result<()> {
    if rate >= 0.0 && rate.is_finite() {
        Ok(())
    } else {
        Err(SimError::InvalidParameter(format!(
            "{name} must be finite and non-negative, got {rate}"
        )))
    }
}

/// Expected number of segregating mutations at equilibrium for `n` diploids
/// and total per-gamete rate `mu`.
pub fn expected_segregating(n: usize, mu: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let theta = 4.0 * n as f64 * mu;
    ((2 * n) as f64).ln() * theta + (2.0 / 3.0) * theta
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Places new mutations on transmitted haplotypes.
pub struct Mutator {
    model: Box<dyn MutationModel>,
    // None when the total rate is zero.
    poisson: Option<Poisson<f64>>,
    neutral_fraction: f64,
}

impl Mutator {
    pub fn new(model: Box<dyn MutationModel>) -> Result<Self> {
        let neutral = model.neutral_rate();
        let selected = model.selected_rate();
        check_rate("neutral mutation rate", neutral)?;
        check_rate("selected mutation rate", selected)?;
        let total = neutral + selected;
        let poisson = if total > 0.0 {
            Some(Poisson::new(total).map_err(|e| SimError::InvalidParameter(e.to_string()))?)
        } else {
            None
        };
        let neutral_fraction = if total > 0.0 { neutral / total } else { 1.0 };
        Ok(Self {
            model,
            poisson,
            neutral_fraction,
        })
    }

    pub fn total_rate(&self) -> f64 {
        self.model.neutral_rate() + self.model.selected_rate()
    }

    /// Number of new mutations for one gamete. No draw is made at rate zero.
    pub fn num_new(&self, rng: &mut SmallRng) -> usize {
        match &self.poisson {
            Some(dist) => dist.sample(rng) as usize,
            None => 0,
        }
    }

    /// Draw a record at a position not currently segregating.
    ///
    /// Draw order: position (repeated on collision), class, effect,
    /// dominance. The class draw is skipped when one of the rates is zero.
    pub fn new_mutation(
        &self,
        rng: &mut SmallRng,
        registry: &MutationRegistry,
        generation: u32,
    ) -> Mutation {
        let mut position = self.model.position(rng);
        while registry.is_segregating_position(position) {
            position = self.model.position(rng);
        }
        let neutral = if self.neutral_fraction >= 1.0 {
            true
        } else if self.neutral_fraction <= 0.0 {
            false
        } else {
            rng.random::<f64>() < self.neutral_fraction
        };
        let label = self.model.label();
        if neutral {
            Mutation::neutral(position, generation, label)
        } else {
            let s = self.model.selection_coefficient(rng);
            let h = self.model.dominance(rng, s);
            Mutation::selected(position, generation, s, h, label)
        }
    }

    /// Add a Poisson number of new mutations to a gamete's index sequences.
    /// Returns how many were added.
    pub fn mutate(
        &self,
        rng: &mut SmallRng,
        registry: &mut MutationRegistry,
        generation: u32,
        neutral: &mut Vec<usize>,
        selected: &mut Vec<usize>,
    ) -> usize {
        let n = self.num_new(rng);
        for _ in 0..n {
            let mutation = self.new_mutation(rng, registry, generation);
            add_to_gamete(registry, mutation, neutral, selected);
        }
        n
    }
}

impl std::fmt::Debug for Mutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutator")
            .field("neutral_rate", &self.model.neutral_rate())
            .field("selected_rate", &self.model.selected_rate())
            .finish()
    }
}

/// Store `mutation`, register its position and splice its index into the
/// matching sequence. Returns the registry index.
pub fn add_to_gamete(
    registry: &mut MutationRegistry,
    mutation: Mutation,
    neutral: &mut Vec<usize>,
    selected: &mut Vec<usize>,
) -> usize {
    let position = mutation.position;
    let is_neutral = mutation.neutral;
    let index = registry.recycle_or_append(mutation);
    registry.insert_position(position, index);
    let keys = if is_neutral { neutral } else { selected };
    insert_sorted(keys, index, registry.mutations());
    index
}

/// Insert `key` keeping `keys` ordered by position.
pub fn insert_sorted(keys: &mut Vec<usize>, key: usize, mutations: &[Mutation]) {
    let position = mutations[key].position;
    let at = keys.partition_point(|&k| mutations[k].position < position);
    keys.insert(at, key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn zero_rate_draws_nothing() {
        let model = InfiniteSites::neutral(0.0, 0.0, 1.0).unwrap();
        let mutator = Mutator::new(Box::new(model)).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut reg = MutationRegistry::new();
        let (mut n, mut s) = (Vec::new(), Vec::new());
        for _ in 0..100 {
            assert_eq!(mutator.mutate(&mut rng, &mut reg, 0, &mut n, &mut s), 0);
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn new_mutations_are_sorted_and_classified() {
        let model = InfiniteSites::new(
            1.0,
            1.0,
            0.0,
            1.0,
            &EffectDist::Exponential { mean: -0.05 },
            0.25,
        )
        .unwrap();
        let mutator = Mutator::new(Box::new(model)).unwrap();
        let mut rng = SmallRng::seed_from_u64(11);
        let mut reg = MutationRegistry::new();
        let (mut n, mut s) = (Vec::new(), Vec::new());
        let mut added = 0;
        for _ in 0..20 {
            added += mutator.mutate(&mut rng, &mut reg, 3, &mut n, &mut s);
        }
        assert!(added > 0);
        assert_eq!(n.len() + s.len(), added);
        assert_eq!(reg.len(), added);
        assert_eq!(reg.num_positions(), added);
        let muts = reg.mutations();
        assert!(n.windows(2).all(|w| muts[w[0]].position < muts[w[1]].position));
        assert!(s.windows(2).all(|w| muts[w[0]].position < muts[w[1]].position));
        assert!(n.iter().all(|&k| muts[k].neutral));
        assert!(s.iter().all(|&k| !muts[k].neutral && muts[k].s < 0.0 && muts[k].h == 0.25));
        assert!(muts.iter().all(|m| m.origin == 3));
    }

    // Only two legal positions; the engine must redraw until it finds the
    // free one.
    struct TwoSites;

    impl MutationModel for TwoSites {
        fn neutral_rate(&self) -> f64 {
            1.0
        }
        fn selected_rate(&self) -> f64 {
            0.0
        }
        fn position(&self, rng: &mut SmallRng) -> f64 {
            if rng.random::<bool>() { 0.25 } else { 0.75 }
        }
        fn selection_coefficient(&self, _rng: &mut SmallRng) -> f64 {
            0.0
        }
        fn dominance(&self, _rng: &mut SmallRng, _s: f64) -> f64 {
            0.0
        }
    }

    #[test]
    fn colliding_positions_are_redrawn() {
        let mutator = Mutator::new(Box::new(TwoSites)).unwrap();
        let mut rng = SmallRng::seed_from_u64(5);
        let mut reg = MutationRegistry::new();
        let (mut n, mut s) = (Vec::new(), Vec::new());
        let first = mutator.new_mutation(&mut rng, &reg, 0);
        add_to_gamete(&mut reg, first, &mut n, &mut s);
        let second = mutator.new_mutation(&mut rng, &reg, 0);
        add_to_gamete(&mut reg, second, &mut n, &mut s);
        let mut positions: Vec<f64> = reg.mutations().iter().map(|m| m.position).collect();
        positions.sort_by(f64::total_cmp);
        assert_eq!(positions, vec![0.25, 0.75]);
        assert_eq!(n.len(), 2);
    }

    #[test]
    fn insert_sorted_finds_the_slot() {
        let muts: Vec<Mutation> = [0.1, 0.5, 0.3, 0.9]
            .iter()
            .map(|&p| Mutation::neutral(p, 0, 0))
            .collect();
        let mut keys = vec![0, 1, 3];
        insert_sorted(&mut keys, 2, &muts);
        assert_eq!(keys, vec![0, 2, 1, 3]);
    }

    #[test]
    fn effect_distributions() {
        let mut rng = SmallRng::seed_from_u64(2);
        let gamma = EffectSampler::new(&EffectDist::Gamma { mean: 0.1, shape: 0.5 }).unwrap();
        assert!((0..100).all(|_| gamma.sample(&mut rng) >= 0.0));
        let uniform = EffectSampler::new(&EffectDist::Uniform { lo: -0.2, hi: -0.1 }).unwrap();
        assert!((0..100).all(|_| (-0.2..-0.1).contains(&uniform.sample(&mut rng))));
        assert!(EffectSampler::new(&EffectDist::Uniform { lo: 1.0, hi: 0.0 }).is_err());
        assert!(EffectSampler::new(&EffectDist::Gamma { mean: 0.1, shape: -1.0 }).is_err());
    }

    #[test]
    fn negative_rates_are_rejected() {
        assert!(InfiniteSites::neutral(-0.1, 0.0, 1.0).is_err());
        assert!(InfiniteSites::neutral(f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn segregating_expectation() {
        let expected = expected_segregating(100, 0.01);
        let theta = 4.0;
        assert!((expected - (200f64.ln() * theta + 2.0 / 3.0 * theta)).abs() < 1e-12);
        assert_eq!(expected_segregating(0, 0.01), 0.0);
    }
}
