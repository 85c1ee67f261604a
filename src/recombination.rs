//! Crossover breakpoints and the haplotype merge they drive.

use rand::distr::{Distribution, Uniform};
use rand::rngs::SmallRng;
use rand_distr::Poisson;

use crate::error::{Result, SimError};
use crate::haplotype::Haplotype;
use crate::mutation::Mutation;

/// Terminal breakpoint; larger than any legal position.
pub const SENTINEL: f64 = f64::MAX;

/// Source of crossover positions for one meiosis.
pub trait RecombinationModel {
    /// Breakpoints sorted ascending and terminated by [`SENTINEL`], or an
    /// empty list when no crossover occurs.
    fn breakpoints(&self, rng: &mut SmallRng) -> Vec<f64>;
}

impl<T: RecombinationModel + ?Sized> RecombinationModel for Box<T> {
    fn breakpoints(&self, rng: &mut SmallRng) -> Vec<f64> {
        (**self).breakpoints(rng)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoRecombination;

impl RecombinationModel for NoRecombination {
    fn breakpoints(&self, _rng: &mut SmallRng) -> Vec<f64> {
        Vec::new()
    }
}

/// Poisson number of crossovers placed uniformly on `[left, right)`.
#[derive(Clone, Debug)]
pub struct PoissonInterval {
    positions: Uniform<f64>,
    // None when the mean is zero.
    poisson: Option<Poisson<f64>>,
}

impl PoissonInterval {
    pub fn new(mean: f64, left: f64, right: f64) -> Result<Self> {
        if !(mean >= 0.0 && mean.is_finite()) {
            return Err(SimError::InvalidParameter(format!(
                "mean number of crossovers must be finite and non-negative, got {mean}"
            )));
        }
        let positions = uniform_region(left, right)?;
        let poisson = if mean > 0.0 {
            Some(Poisson::new(mean).map_err(|e| SimError::InvalidParameter(e.to_string()))?)
        } else {
            None
        };
        Ok(Self { positions, poisson })
    }
}

impl RecombinationModel for PoissonInterval {
    fn breakpoints(&self, rng: &mut SmallRng) -> Vec<f64> {
        let n = match &self.poisson {
            Some(dist) => dist.sample(rng) as usize,
            None => 0,
        };
        uniform_breakpoints(n, &self.positions, rng)
    }
}

/// Exactly `count` crossovers placed uniformly on `[left, right)`.
#[derive(Clone, Debug)]
pub struct FixedCrossovers {
    count: usize,
    positions: Uniform<f64>,
}

impl FixedCrossovers {
    pub fn new(count: usize, left: f64, right: f64) -> Result<Self> {
        Ok(Self {
            count,
            positions: uniform_region(left, right)?,
        })
    }
}

impl RecombinationModel for FixedCrossovers {
    fn breakpoints(&self, rng: &mut SmallRng) -> Vec<f64> {
        uniform_breakpoints(self.count, &self.positions, rng)
    }
}

/// The same breakpoint list for every meiosis.
#[derive(Clone, Debug)]
pub struct FixedBreakpoints(Vec<f64>);

impl FixedBreakpoints {
    /// `positions` need not carry the sentinel; it is appended.
    pub fn new(mut positions: Vec<f64>) -> Result<Self> {
        if positions.is_empty() {
            return Ok(Self(positions));
        }
        if positions.last() != Some(&SENTINEL) {
            positions.push(SENTINEL);
        }
        validate_breakpoints(&positions)?;
        Ok(Self(positions))
    }
}

impl RecombinationModel for FixedBreakpoints {
    fn breakpoints(&self, _rng: &mut SmallRng) -> Vec<f64> {
        self.0.clone()
    }
}

fn uniform_region(left: f64, right: f64) -> Result<Uniform<f64>> {
    Uniform::new(left, right).map_err(|e| {
        SimError::InvalidParameter(format!("invalid region [{left}, {right}): {e}"))
    })
}

fn uniform_breakpoints(n: usize, positions: &Uniform<f64>, rng: &mut SmallRng) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let mut bps: Vec<f64> = (0..n).map(|_| positions.sample(rng)).collect();
    bps.sort_unstable_by(f64::total_cmp);
    bps.push(SENTINEL);
    bps
}

/// Reject lists that are unsorted, contain NaN, or lack the sentinel.
pub fn validate_breakpoints(breakpoints: &[f64]) -> Result<()> {
    let Some(&last) = breakpoints.last() else {
        return Ok(());
    };
    if last != SENTINEL {
        return Err(SimError::MalformedBreakpoints(format!(
            "last breakpoint is {last}, expected the sentinel"
        )));
    }
    if breakpoints.iter().any(|x| x.is_nan()) {
        return Err(SimError::MalformedBreakpoints("NaN breakpoint".to_string()));
    }
    if let Some(w) = breakpoints.windows(2).find(|w| w[0] > w[1]) {
        return Err(SimError::MalformedBreakpoints(format!(
            "breakpoints out of order: {} > {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// Merge two parental haplotypes into the offspring's index sequences.
///
/// Parent 1 contributes first. At each breakpoint the contributing parent
/// switches; a mutation whose position equals a breakpoint lies to the right
/// of it. The same breakpoints and switch sequence are applied to the neutral
/// and selected sequences. Outputs are cleared first.
pub fn recombine(
    breakpoints: &[f64],
    parent1: &Haplotype,
    parent2: &Haplotype,
    mutations: &[Mutation],
    neutral: &mut Vec<usize>,
    selected: &mut Vec<usize>,
) -> Result<()> {
    validate_breakpoints(breakpoints)?;
    recombine_unchecked(breakpoints, parent1, parent2, mutations, neutral, selected);
    Ok(())
}

/// [`recombine`] for a breakpoint list already known to be well formed.
pub(crate) fn recombine_unchecked(
    breakpoints: &[f64],
    parent1: &Haplotype,
    parent2: &Haplotype,
    mutations: &[Mutation],
    neutral: &mut Vec<usize>,
    selected: &mut Vec<usize>,
) {
    neutral.clear();
    selected.clear();
    if breakpoints.is_empty() {
        neutral.extend_from_slice(&parent1.neutral);
        selected.extend_from_slice(&parent1.selected);
        return;
    }
    merge_keys(breakpoints, &parent1.neutral, &parent2.neutral, mutations, neutral);
    merge_keys(breakpoints, &parent1.selected, &parent2.selected, mutations, selected);
}

// Each cut is a binary search, so a merge costs O(k log M).
fn merge_keys(
    breakpoints: &[f64],
    first: &[usize],
    second: &[usize],
    mutations: &[Mutation],
    out: &mut Vec<usize>,
) {
    let mut current = first;
    let mut other = second;
    for &bp in breakpoints {
        let cut = current.partition_point(|&k| mutations[k].position < bp);
        out.extend_from_slice(&current[..cut]);
        current = &current[cut..];
        let skip = other.partition_point(|&k| mutations[k].position < bp);
        other = &other[skip..];
        std::mem::swap(&mut current, &mut other);
    }
}
