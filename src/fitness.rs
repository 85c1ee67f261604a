//! Fitness policies.
//!
//! A policy maps one diploid, read through the haplotype and mutation tables,
//! to a non-negative weight used for parent selection. Any closure with the
//! right signature is a policy.

use serde::{Deserialize, Serialize};

use crate::haplotype::Haplotype;
use crate::mutation::Mutation;
use crate::population::Diploid;

pub trait FitnessModel<D = ()> {
    fn fitness(
        &self,
        diploid: &Diploid<D>,
        haplotypes: &[Haplotype],
        mutations: &[Mutation],
    ) -> f64;
}

impl<D, F> FitnessModel<D> for F
where
    F: Fn(&Diploid<D>, &[Haplotype], &[Mutation]) -> f64,
{
    fn fitness(
        &self,
        diploid: &Diploid<D>,
        haplotypes: &[Haplotype],
        mutations: &[Mutation],
    ) -> f64 {
        (self)(diploid, haplotypes, mutations)
    }
}

/// Visit every selected site carried by a diploid, in position order.
///
/// `f` receives the mutation and whether it is homozygous (present on both
/// haplotypes).
pub fn for_each_selected_site<F>(
    first: &[usize],
    second: &[usize],
    mutations: &[Mutation],
    mut f: F,
) where
    F: FnMut(&Mutation, bool),
{
    let (mut i, mut j) = (0, 0);
    while i < first.len() && j < second.len() {
        let (a, b) = (first[i], second[j]);
        if a == b {
            f(&mutations[a], true);
            i += 1;
            j += 1;
        } else if mutations[a].position < mutations[b].position {
            f(&mutations[a], false);
            i += 1;
        } else {
            f(&mutations[b], false);
            j += 1;
        }
    }
    for &k in first[i..].iter().chain(&second[j..]) {
        f(&mutations[k], false);
    }
}

fn selected_pair<'a, D>(
    diploid: &Diploid<D>,
    haplotypes: &'a [Haplotype],
) -> (&'a [usize], &'a [usize]) {
    (
        &haplotypes[diploid.first].selected,
        &haplotypes[diploid.second].selected,
    )
}

/// Sum of `scaling * s` over homozygous sites and `h * s` over heterozygous
/// ones.
pub fn additive_genetic_value<D>(
    diploid: &Diploid<D>,
    haplotypes: &[Haplotype],
    mutations: &[Mutation],
    scaling: f64,
) -> f64 {
    let (first, second) = selected_pair(diploid, haplotypes);
    let mut sum = 0.0;
    for_each_selected_site(first, second, mutations, |m, hom| {
        sum += if hom { scaling * m.s } else { m.h * m.s };
    });
    sum
}

// ── Policies ─────────────────────────────────────────────────────────────────

/// Every diploid has fitness 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct Neutral;

impl<D> FitnessModel<D> for Neutral {
    fn fitness(&self, _: &Diploid<D>, _: &[Haplotype], _: &[Mutation]) -> f64 {
        1.0
    }
}

/// Product over sites of `1 + scaling * s` (homozygous) or `1 + h * s`
/// (heterozygous), floored at zero.
#[derive(Clone, Copy, Debug)]
pub struct Multiplicative {
    pub scaling: f64,
}

impl<D> FitnessModel<D> for Multiplicative {
    fn fitness(
        &self,
        diploid: &Diploid<D>,
        haplotypes: &[Haplotype],
        mutations: &[Mutation],
    ) -> f64 {
        let (first, second) = selected_pair(diploid, haplotypes);
        let mut w = 1.0;
        for_each_selected_site(first, second, mutations, |m, hom| {
            w *= if hom {
                1.0 + self.scaling * m.s
            } else {
                1.0 + m.h * m.s
            };
        });
        w.max(0.0)
    }
}

/// `1 +` the additive genetic value, floored at zero.
#[derive(Clone, Copy, Debug)]
pub struct Additive {
    pub scaling: f64,
}

impl<D> FitnessModel<D> for Additive {
    fn fitness(
        &self,
        diploid: &Diploid<D>,
        haplotypes: &[Haplotype],
        mutations: &[Mutation],
    ) -> f64 {
        (1.0 + additive_genetic_value(diploid, haplotypes, mutations, self.scaling)).max(0.0)
    }
}

/// Gaussian stabilizing selection on the additive genetic value.
#[derive(Clone, Copy, Debug)]
pub struct StabilizingSelection {
    pub optimum: f64,
    /// Strength of selection 1 / (2 * VS)
    pub selection_coeff: f64,
    pub scaling: f64,
}

impl StabilizingSelection {
    pub fn new(optimum: f64, vs: f64, scaling: f64) -> Self {
        Self {
            optimum,
            selection_coeff: 1.0 / (2.0 * vs),
            scaling,
        }
    }

    pub fn fitness_contribution(&self, phenotype: f64) -> f64 {
        (-self.selection_coeff * (phenotype - self.optimum).powi(2)).exp()
    }
}

impl<D> FitnessModel<D> for StabilizingSelection {
    fn fitness(
        &self,
        diploid: &Diploid<D>,
        haplotypes: &[Haplotype],
        mutations: &[Mutation],
    ) -> f64 {
        let g = additive_genetic_value(diploid, haplotypes, mutations, self.scaling);
        self.fitness_contribution(g)
    }
}

/// Serializable choice of a built-in policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum FitnessKind {
    #[default]
    Neutral,
    Multiplicative { scaling: f64 },
    Additive { scaling: f64 },
    Stabilizing { optimum: f64, vs: f64, scaling: f64 },
}

impl FitnessKind {
    pub fn build<D: 'static>(&self) -> Box<dyn FitnessModel<D>> {
        match *self {
            Self::Neutral => Box::new(Neutral),
            Self::Multiplicative { scaling } => Box::new(Multiplicative { scaling }),
            Self::Additive { scaling } => Box::new(Additive { scaling }),
            Self::Stabilizing {
                optimum,
                vs,
                scaling,
            } => Box::new(StabilizingSelection::new(optimum, vs, scaling)),
        }
    }
}
