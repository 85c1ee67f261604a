//! Population state: registries, the diploid table, and the post-generation
//! count sweep that detects fixation and loss.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::haplotype::{Haplotype, HaplotypeRegistry, is_sorted_by_position};
use crate::mutation::{Mutation, MutationRegistry, Reconciliation, same_position};
use crate::mutator::insert_sorted;

/// One individual: two haplotype indices plus an optional payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Diploid<D = ()> {
    pub first: usize,
    pub second: usize,
    pub data: D,
}

impl<D: Default> Diploid<D> {
    pub fn new(first: usize, second: usize) -> Self {
        Self {
            first,
            second,
            data: D::default(),
        }
    }
}

/// Which chromosome(s) of a diploid an injected mutation lands on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chromosome {
    First,
    Second,
    Both,
}

#[derive(Clone, Debug)]
pub struct DiploidPopulation<D = ()> {
    pub(crate) mutations: MutationRegistry,
    pub(crate) haplotypes: HaplotypeRegistry,
    pub(crate) diploids: Vec<Diploid<D>>,
    pub(crate) generation: u32,
}

/// Twice `n` as a copy number, rejecting sizes the count type cannot hold.
pub(crate) fn two_n(n: usize) -> Result<u32> {
    if n == 0 {
        return Err(SimError::EmptyPopulation);
    }
    n.checked_mul(2)
        .and_then(|x| u32::try_from(x).ok())
        .ok_or_else(|| SimError::InvalidParameter(format!("population size {n} is too large")))
}

/// Expand injection targets to `(diploid, is_first)` slots, rejecting any
/// chromosome named twice.
fn expand_targets(targets: &[(usize, Chromosome)]) -> Result<Vec<(usize, bool)>> {
    let mut slots = Vec::with_capacity(2 * targets.len());
    let mut seen = HashSet::new();
    for &(i, chromosome) in targets {
        let sides: &[bool] = match chromosome {
            Chromosome::First => &[true],
            Chromosome::Second => &[false],
            Chromosome::Both => &[true, false],
        };
        for &first in sides {
            if !seen.insert((i, first)) {
                return Err(SimError::InvalidParameter(format!(
                    "chromosome {} of diploid {i} is targeted more than once",
                    if first { "first" } else { "second" }
                )));
            }
            slots.push((i, first));
        }
    }
    Ok(slots)
}

impl<D: Default + Clone> DiploidPopulation<D> {
    /// `n` diploids all carrying the single mutation-free ancestral
    /// haplotype.
    pub fn new(n: usize) -> Result<Self> {
        let two_n = two_n(n)?;
        Ok(Self {
            mutations: MutationRegistry::new(),
            haplotypes: HaplotypeRegistry::with_ancestor(two_n),
            diploids: vec![Diploid::new(0, 0); n],
            generation: 0,
        })
    }
}

impl<D> DiploidPopulation<D> {
    pub fn size(&self) -> usize {
        self.diploids.len()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn mutations(&self) -> &MutationRegistry {
        &self.mutations
    }

    pub fn haplotypes(&self) -> &HaplotypeRegistry {
        &self.haplotypes
    }

    pub fn diploids(&self) -> &[Diploid<D>] {
        &self.diploids
    }

    pub fn diploid(&self, index: usize) -> Result<&Diploid<D>> {
        self.diploids
            .get(index)
            .ok_or_else(|| SimError::index("diploid", index, self.diploids.len()))
    }

    /// Mutable access to a diploid's payload. The haplotype indices stay
    /// owned by the engine.
    pub fn data_mut(&mut self, index: usize) -> Result<&mut D> {
        let len = self.diploids.len();
        self.diploids
            .get_mut(index)
            .map(|d| &mut d.data)
            .ok_or_else(|| SimError::index("diploid", index, len))
    }

    /// Both haplotypes of diploid `index`.
    pub fn genotype(&self, index: usize) -> Result<(&Haplotype, &Haplotype)> {
        let d = self.diploid(index)?;
        let haps = self.haplotypes.haplotypes();
        Ok((&haps[d.first], &haps[d.second]))
    }

    pub fn reserve_mutations(&mut self, additional: usize) {
        self.mutations.reserve(additional);
    }

    pub(crate) fn replace_diploids(&mut self, offspring: Vec<Diploid<D>>) {
        self.diploids = offspring;
    }

    /// Rebuild copy numbers from the diploid table and recycle dead storage.
    ///
    /// Haplotype counts are recomputed from scratch, then mutation counts
    /// from the live haplotypes. Fixed mutations are archived and stripped
    /// from every live haplotype; fixed and lost positions leave the lookup
    /// table. Finally both recycling queues are rebuilt.
    pub fn reconcile_counts(&mut self) -> Reconciliation {
        let two_n = (2 * self.diploids.len()) as u32;

        let haps = self.haplotypes.haplotypes_mut();
        for h in haps.iter_mut() {
            h.n = 0;
        }
        for d in &self.diploids {
            haps[d.first].n += 1;
            haps[d.second].n += 1;
        }

        let counts = self.mutations.counts_mut();
        counts.fill(0);
        for h in self.haplotypes.haplotypes().iter().filter(|h| h.n > 0) {
            for &k in h.neutral.iter().chain(&h.selected) {
                counts[k] += h.n;
            }
        }

        let rv = self.mutations.reconcile(self.generation, two_n);
        if !rv.fixed.is_empty() {
            let mut fixed = vec![false; self.mutations.len()];
            for &k in &rv.fixed {
                fixed[k] = true;
            }
            for h in self
                .haplotypes
                .haplotypes_mut()
                .iter_mut()
                .filter(|h| h.n > 0)
            {
                h.neutral.retain(|&k| !fixed[k]);
                h.selected.retain(|&k| !fixed[k]);
            }
        }

        self.haplotypes.rebuild_recycling_queue();
        self.mutations.rebuild_recycling_queue();
        log::debug!(
            "generation {}: {} fixed, {} lost, {} segregating, {} live haplotypes",
            self.generation,
            rv.fixed.len(),
            rv.lost.len(),
            self.mutations.num_segregating(),
            self.haplotypes.num_live()
        );
        rv
    }

    /// Check the cross-table invariants, reporting the first violation.
    pub fn check_invariants(&self) -> Result<()> {
        let fail = |msg: String| Err(SimError::Invariant(msg));
        let haps = self.haplotypes.haplotypes();
        let muts = self.mutations.mutations();
        let counts = self.mutations.counts();

        if self.diploids.is_empty() {
            return fail("empty diploid table".to_string());
        }
        if counts.len() != muts.len() {
            return fail(format!(
                "{} mutation counts for {} mutations",
                counts.len(),
                muts.len()
            ));
        }

        let mut uses = vec![0u32; haps.len()];
        for (i, d) in self.diploids.iter().enumerate() {
            if d.first >= haps.len() || d.second >= haps.len() {
                return fail(format!("diploid {i} references a missing haplotype"));
            }
            uses[d.first] += 1;
            uses[d.second] += 1;
        }
        let two_n = 2 * self.diploids.len() as u64;
        if self.haplotypes.total_copies() != two_n {
            return fail(format!(
                "haplotype copy numbers sum to {}, expected {two_n}",
                self.haplotypes.total_copies()
            ));
        }

        for (i, h) in haps.iter().enumerate() {
            if h.n != uses[i] {
                return fail(format!(
                    "haplotype {i} has copy number {} but {} uses",
                    h.n, uses[i]
                ));
            }
            if h.n == 0 {
                continue;
            }
            for (keys, neutral) in [(&h.neutral, true), (&h.selected, false)] {
                for &k in keys.iter() {
                    if k >= muts.len() {
                        return fail(format!("haplotype {i} references missing mutation {k}"));
                    }
                    if counts[k] == 0 {
                        return fail(format!("haplotype {i} references dead mutation {k}"));
                    }
                    if muts[k].neutral != neutral {
                        return fail(format!(
                            "mutation {k} stored in the wrong sequence of haplotype {i}"
                        ));
                    }
                }
                if !is_sorted_by_position(keys, muts) {
                    return fail(format!("haplotype {i} is not sorted by position"));
                }
            }
        }

        let mut live: Vec<f64> = muts
            .iter()
            .zip(counts)
            .filter(|&(_, &c)| c > 0)
            .map(|(m, _)| m.position)
            .collect();
        live.sort_unstable_by(f64::total_cmp);
        if let Some(w) = live.windows(2).find(|w| same_position(w[0], w[1])) {
            return fail(format!("two live mutations at position {}", w[0]));
        }
        Ok(())
    }

    /// Place a new mutation on chosen chromosomes of chosen diploids.
    ///
    /// Each targeted chromosome gets a fresh haplotype copy carrying the
    /// mutation; counts are then reconciled. Returns the mutation's index.
    ///
    /// `targets` must be non-empty and name each chromosome at most once,
    /// with `Both` counting as `First` and `Second`. Nothing is modified when
    /// a precondition fails.
    pub fn add_mutation(
        &mut self,
        targets: &[(usize, Chromosome)],
        mutation: Mutation,
    ) -> Result<usize> {
        if !mutation.position.is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "mutation position {} is not finite",
                mutation.position
            )));
        }
        if targets.is_empty() {
            return Err(SimError::InvalidParameter(
                "mutation has no target chromosomes".to_string(),
            ));
        }
        if let Some(&(i, _)) = targets.iter().find(|&&(i, _)| i >= self.diploids.len()) {
            return Err(SimError::index("diploid", i, self.diploids.len()));
        }
        let slots = expand_targets(targets)?;
        if self.mutations.is_segregating_position(mutation.position) {
            return Err(SimError::PositionCollision(mutation.position));
        }

        let position = mutation.position;
        let is_neutral = mutation.neutral;
        let key = self.mutations.recycle_or_append(mutation);
        self.mutations.insert_position(position, key);

        for (i, first) in slots {
            let d = &self.diploids[i];
            let old = if first { d.first } else { d.second };
            let h = &self.haplotypes.haplotypes()[old];
            let mut neutral = h.neutral.clone();
            let mut selected = h.selected.clone();
            let keys = if is_neutral {
                &mut neutral
            } else {
                &mut selected
            };
            insert_sorted(keys, key, self.mutations.mutations());
            let new = self.haplotypes.recycle_or_append(1, &neutral, &selected);
            let d = &mut self.diploids[i];
            if first {
                d.first = new;
            } else {
                d.second = new;
            }
        }

        self.reconcile_counts();
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_diploids_are_rejected() {
        assert!(matches!(
            DiploidPopulation::<()>::new(0),
            Err(SimError::EmptyPopulation)
        ));
    }

    #[test]
    fn new_population_is_monomorphic() {
        let pop = DiploidPopulation::<()>::new(4).unwrap();
        assert_eq!(pop.size(), 4);
        assert_eq!(pop.haplotypes().total_copies(), 8);
        assert!(pop.mutations().is_empty());
        assert!(pop.diploids().iter().all(|d| d.first == 0 && d.second == 0));
        pop.check_invariants().unwrap();
    }

    #[test]
    fn injected_mutation_is_counted() {
        let mut pop = DiploidPopulation::<()>::new(5).unwrap();
        let m = Mutation::selected(0.5, 0, -0.1, 0.5, 7);
        let key = pop
            .add_mutation(&[(0, Chromosome::Both), (3, Chromosome::Second)], m)
            .unwrap();
        assert_eq!(pop.mutations().counts()[key], 3);
        pop.check_invariants().unwrap();
        let (a, b) = pop.genotype(0).unwrap();
        assert_eq!(a.selected, vec![key]);
        assert_eq!(b.selected, vec![key]);
        let (a, b) = pop.genotype(3).unwrap();
        assert!(a.selected.is_empty());
        assert_eq!(b.selected, vec![key]);
    }

    #[test]
    fn injection_preconditions() {
        let mut pop = DiploidPopulation::<()>::new(2).unwrap();
        assert!(matches!(
            pop.add_mutation(&[(2, Chromosome::First)], Mutation::neutral(0.1, 0, 0)),
            Err(SimError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
        pop.add_mutation(&[(0, Chromosome::First)], Mutation::neutral(0.1, 0, 0))
            .unwrap();
        assert!(matches!(
            pop.add_mutation(&[(1, Chromosome::First)], Mutation::neutral(0.1, 0, 0)),
            Err(SimError::PositionCollision(_))
        ));
    }

    #[test]
    fn repeated_or_empty_targets_are_rejected() {
        let mut pop = DiploidPopulation::<()>::new(1).unwrap();
        let before = pop.clone();
        for targets in [
            vec![(0, Chromosome::First), (0, Chromosome::First)],
            vec![(0, Chromosome::Both), (0, Chromosome::Second)],
            vec![],
        ] {
            assert!(matches!(
                pop.add_mutation(&targets, Mutation::neutral(0.5, 0, 0)),
                Err(SimError::InvalidParameter(_))
            ));
            assert!(pop.mutations().is_empty());
            assert_eq!(pop.haplotypes().len(), before.haplotypes().len());
            assert_eq!(pop.diploids(), before.diploids());
        }

        // One copy out of two stays segregating rather than being archived.
        let key = pop
            .add_mutation(&[(0, Chromosome::First)], Mutation::neutral(0.5, 0, 0))
            .unwrap();
        assert_eq!(pop.mutations().counts()[key], 1);
        assert!(pop.mutations().fixations().is_empty());
        let (a, b) = pop.genotype(0).unwrap();
        assert_eq!(a.neutral, vec![key]);
        assert!(b.neutral.is_empty());
        pop.check_invariants().unwrap();
    }

    #[test]
    fn fixed_mutations_are_archived_and_stripped() {
        let mut pop = DiploidPopulation::<()>::new(2).unwrap();
        let all: Vec<_> = (0..2).map(|i| (i, Chromosome::Both)).collect();
        let key = pop.add_mutation(&all, Mutation::neutral(0.3, 0, 0)).unwrap();
        assert_eq!(pop.mutations().fixations().len(), 1);
        assert_eq!(pop.mutations().counts()[key], 0);
        assert!(
            pop.haplotypes()
                .haplotypes()
                .iter()
                .filter(|h| h.n > 0)
                .all(|h| h.num_mutations() == 0)
        );
        assert_eq!(
            pop.mutations().recycling_queue().iter().collect::<Vec<_>>(),
            vec![key]
        );
        pop.check_invariants().unwrap();
    }

    #[test]
    fn invariant_check_catches_bad_counts() {
        let mut pop = DiploidPopulation::<()>::new(2).unwrap();
        pop.haplotypes.haplotypes_mut()[0].n = 3;
        assert!(matches!(pop.check_invariants(), Err(SimError::Invariant(_))));
    }

    #[test]
    fn payload_is_mutable() {
        let mut pop = DiploidPopulation::<u8>::new(2).unwrap();
        *pop.data_mut(1).unwrap() = 9;
        assert_eq!(pop.diploid(1).unwrap().data, 9);
        assert!(pop.data_mut(2).is_err());
    }
}
