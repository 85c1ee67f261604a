//! Mutation records and the registry that owns them.
//!
//! A [`MutationRegistry`] is an arena of [`Mutation`] records addressed by
//! index, with a parallel vector of population-wide copy numbers and a
//! position lookup that enforces the infinite-sites constraint. Slots whose
//! count drops to zero are recycled in FIFO order rather than growing the
//! arena.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::recycling::{RecyclingQueue, make_recycling_queue};

/// Relative tolerance used when comparing mutation positions.
pub const POSITION_TOLERANCE: f64 = 4.0 * f64::EPSILON;

/// Whether two positions refer to the same site.
pub fn same_position(a: f64, b: f64) -> bool {
    (a - b).abs() <= tolerance_at(a.abs().max(b.abs()))
}

fn tolerance_at(magnitude: f64) -> f64 {
    POSITION_TOLERANCE * magnitude.max(1.0)
}

/// A single variant.
///
/// Identity is by registry index, not by value: two records at the same
/// position are distinct mutations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub position: f64,
    /// Generation in which the mutation arose.
    pub origin: u32,
    /// Selection coefficient.
    pub s: f64,
    /// Dominance coefficient.
    pub h: f64,
    /// Opaque user tag.
    pub label: u16,
    /// True iff the mutation has no fitness effect.
    pub neutral: bool,
}

impl Mutation {
    pub fn neutral(position: f64, origin: u32, label: u16) -> Self {
        Self {
            position,
            origin,
            s: 0.0,
            h: 0.0,
            label,
            neutral: true,
        }
    }

    /// A mutation with effect `s` and dominance `h`. Neutrality is derived
    /// from `s`, so `s == 0` yields a neutral record.
    pub fn selected(position: f64, origin: u32, s: f64, h: f64, label: u16) -> Self {
        Self {
            position,
            origin,
            s,
            h,
            label,
            neutral: s == 0.0,
        }
    }
}

/// A mutation that reached copy number 2N, with the generation it did so.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    pub mutation: Mutation,
    pub generation: u32,
}

/// Indices touched by [`MutationRegistry::reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Mutations that were fixed, archived and zeroed.
    pub fixed: Vec<usize>,
    /// Mutations that went extinct since the previous sweep.
    pub lost: Vec<usize>,
}

/// Totally ordered wrapper so positions can key a `BTreeMap`.
#[derive(Clone, Copy, Debug)]
struct PositionKey(f64);

impl PartialEq for PositionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PositionKey {}

impl PartialOrd for PositionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PositionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MutationRegistry {
    mutations: Vec<Mutation>,
    counts: Vec<u32>,
    lookup: BTreeMap<PositionKey, usize>,
    queue: RecyclingQueue,
    fixations: Vec<Fixation>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.mutations.reserve(additional);
        self.counts.reserve(additional);
    }

    /// Number of slots, live or dead.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Mutation> {
        self.mutations.get(index)
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub(crate) fn counts_mut(&mut self) -> &mut [u32] {
        &mut self.counts
    }

    pub fn fixations(&self) -> &[Fixation] {
        &self.fixations
    }

    pub fn recycling_queue(&self) -> &RecyclingQueue {
        &self.queue
    }

    /// Number of mutations currently present in at least one copy.
    pub fn num_segregating(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Whether `position` coincides with a mutation in the lookup table.
    pub fn is_segregating_position(&self, position: f64) -> bool {
        let tol = tolerance_at(position.abs());
        self.lookup
            .range(PositionKey(position - tol)..=PositionKey(position + tol))
            .next()
            .is_some()
    }

    /// Record that mutation `index` occupies `position`.
    pub fn insert_position(&mut self, position: f64, index: usize) {
        self.lookup.insert(PositionKey(position), index);
    }

    pub fn num_positions(&self) -> usize {
        self.lookup.len()
    }

    fn remove_position(&mut self, index: usize) -> bool {
        let key = PositionKey(self.mutations[index].position);
        match self.lookup.get(&key) {
            Some(&i) if i == index => {
                self.lookup.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Store `mutation` in the first dead slot, or append it.
    ///
    /// Neither the count vector nor the position lookup is updated; both are
    /// the caller's responsibility. Appending grows the count vector with a
    /// zero entry so the two stay parallel.
    pub fn recycle_or_append(&mut self, mutation: Mutation) -> usize {
        if let Some(index) = self.queue.pop() {
            self.mutations[index] = mutation;
            return index;
        }
        self.mutations.push(mutation);
        self.counts.push(0);
        self.mutations.len() - 1
    }

    /// Rebuild the recycling queue from the current counts.
    pub fn rebuild_recycling_queue(&mut self) {
        self.queue = make_recycling_queue(self.counts.iter().copied());
    }

    /// Archive fixed mutations and purge fixed or lost ones from the position
    /// lookup.
    ///
    /// A mutation with count `two_n` is copied to the fixation archive and
    /// its count set to zero. This is the only place positions leave the
    /// lookup table. Callers must strip fixed indices from haplotypes before
    /// the slots are recycled.
    pub fn reconcile(&mut self, generation: u32, two_n: u32) -> Reconciliation {
        let mut rv = Reconciliation::default();
        for i in 0..self.mutations.len() {
            if self.counts[i] == two_n {
                self.fixations.push(Fixation {
                    mutation: self.mutations[i].clone(),
                    generation,
                });
                self.counts[i] = 0;
                self.remove_position(i);
                rv.fixed.push(i);
            } else if self.counts[i] == 0 && self.remove_position(i) {
                rv.lost.push(i);
            }
        }
        rv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(positions: &[f64]) -> MutationRegistry {
        let mut reg = MutationRegistry::new();
        for &p in positions {
            let i = reg.recycle_or_append(Mutation::neutral(p, 0, 0));
            reg.insert_position(p, i);
        }
        reg
    }

    #[test]
    fn append_grows_counts_in_parallel() {
        let reg = registry_with(&[0.1, 0.2]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.counts(), &[0, 0]);
        assert_eq!(reg.num_positions(), 2);
    }

    #[test]
    fn selected_with_zero_effect_is_neutral() {
        assert!(Mutation::selected(0.5, 1, 0.0, 0.5, 0).neutral);
        assert!(!Mutation::selected(0.5, 1, -0.01, 0.5, 0).neutral);
    }

    #[test]
    fn lookup_uses_tolerance() {
        let reg = registry_with(&[0.25]);
        assert!(reg.is_segregating_position(0.25));
        assert!(reg.is_segregating_position(0.25 + f64::EPSILON));
        assert!(!reg.is_segregating_position(0.2500001));
        assert!(same_position(0.1 + 0.2, 0.3));
    }

    #[test]
    fn reconcile_archives_fixed_and_purges_lost() {
        let mut reg = registry_with(&[0.1, 0.2, 0.3]);
        reg.counts_mut().copy_from_slice(&[8, 0, 3]);
        let rv = reg.reconcile(12, 8);
        assert_eq!(rv.fixed, vec![0]);
        assert_eq!(rv.lost, vec![1]);
        assert_eq!(reg.counts(), &[0, 0, 3]);
        assert_eq!(reg.fixations().len(), 1);
        assert_eq!(reg.fixations()[0].generation, 12);
        assert_eq!(reg.fixations()[0].mutation.position, 0.1);
        assert!(!reg.is_segregating_position(0.1));
        assert!(!reg.is_segregating_position(0.2));
        assert!(reg.is_segregating_position(0.3));

        // A second sweep has nothing new to report.
        let rv = reg.reconcile(13, 8);
        assert!(rv.fixed.is_empty());
        assert!(rv.lost.is_empty());
    }

    #[test]
    fn recycled_slots_are_reused_fifo() {
        let mut reg = registry_with(&[0.1, 0.2, 0.3, 0.4]);
        reg.counts_mut().copy_from_slice(&[1, 0, 2, 0]);
        reg.reconcile(1, 100);
        reg.rebuild_recycling_queue();
        assert_eq!(reg.recycling_queue().iter().collect::<Vec<_>>(), vec![1, 3]);

        let a = reg.recycle_or_append(Mutation::neutral(0.9, 2, 0));
        let b = reg.recycle_or_append(Mutation::neutral(0.8, 2, 0));
        let c = reg.recycle_or_append(Mutation::neutral(0.7, 2, 0));
        assert_eq!((a, b, c), (1, 3, 4));
        assert_eq!(reg.len(), 5);
        assert_eq!(reg.get(1).map(|m| m.position), Some(0.9));
    }
}
