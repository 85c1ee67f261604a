//! Read-only views used to build samples from a population.

use std::collections::HashMap;

use crate::error::{Result, SimError};
use crate::haplotype::Haplotype;
use crate::population::DiploidPopulation;

/// Which mutation sequences a view reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiteKind {
    Neutral,
    Selected,
    All,
}

fn keys(h: &Haplotype, kind: SiteKind) -> impl Iterator<Item = usize> + '_ {
    let (neutral, selected): (&[usize], &[usize]) = match kind {
        SiteKind::Neutral => (&h.neutral, &[]),
        SiteKind::Selected => (&[], &h.selected),
        SiteKind::All => (&h.neutral, &h.selected),
    };
    neutral.iter().chain(selected).copied()
}

/// Positions carried by haplotype `index`, ascending.
pub fn haplotype_positions<D>(
    pop: &DiploidPopulation<D>,
    index: usize,
    kind: SiteKind,
) -> Result<Vec<f64>> {
    let haps = pop.haplotypes().haplotypes();
    let h = haps
        .get(index)
        .ok_or_else(|| SimError::index("haplotype", index, haps.len()))?;
    let muts = pop.mutations().mutations();
    let mut positions: Vec<f64> = keys(h, kind).map(|k| muts[k].position).collect();
    positions.sort_unstable_by(f64::total_cmp);
    Ok(positions)
}

/// Derived-allele counts among the `2 * individuals.len()` sampled
/// chromosomes, as `(position, count)` sorted by position.
///
/// Only mutations present in the sample are reported.
pub fn site_frequencies<D>(
    pop: &DiploidPopulation<D>,
    individuals: &[usize],
    kind: SiteKind,
) -> Result<Vec<(f64, u32)>> {
    let haps = pop.haplotypes().haplotypes();
    let mut counts: HashMap<usize, u32> = HashMap::new();
    for &i in individuals {
        let d = pop
            .diploids()
            .get(i)
            .ok_or_else(|| SimError::index("diploid", i, pop.diploids().len()))?;
        for h in [&haps[d.first], &haps[d.second]] {
            for k in keys(h, kind) {
                *counts.entry(k).or_insert(0) += 1;
            }
        }
    }
    let muts = pop.mutations().mutations();
    let mut sites: Vec<(f64, u32)> = counts
        .into_iter()
        .map(|(k, c)| (muts[k].position, c))
        .collect();
    sites.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    Ok(sites)
}
