//! Haplotype records and their recycling registry.

use serde::{Deserialize, Serialize};

use crate::mutation::Mutation;
use crate::recycling::{RecyclingQueue, make_recycling_queue};

/// One transmissible chromosome.
///
/// `neutral` and `selected` hold mutation-registry indices, each sorted by
/// the referenced mutation's position. `n` is the population-wide copy
/// number; zero marks a dead slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Haplotype {
    pub n: u32,
    pub neutral: Vec<usize>,
    pub selected: Vec<usize>,
}

impl Haplotype {
    pub fn new(n: u32) -> Self {
        Self {
            n,
            neutral: Vec::new(),
            selected: Vec::new(),
        }
    }

    pub fn num_mutations(&self) -> usize {
        self.neutral.len() + self.selected.len()
    }

    pub fn same_content(&self, neutral: &[usize], selected: &[usize]) -> bool {
        self.neutral == neutral && self.selected == selected
    }

    /// Both index sequences strictly ascending by position.
    pub fn is_sorted(&self, mutations: &[Mutation]) -> bool {
        is_sorted_by_position(&self.neutral, mutations)
            && is_sorted_by_position(&self.selected, mutations)
    }
}

pub(crate) fn is_sorted_by_position(keys: &[usize], mutations: &[Mutation]) -> bool {
    keys.windows(2)
        .all(|w| mutations[w[0]].position < mutations[w[1]].position)
}

/// How newly produced haplotypes are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaplotypePolicy {
    /// Every new haplotype gets its own slot (infinite sites).
    #[default]
    Distinct,
    /// Identical live haplotypes share one slot.
    Deduplicate,
}

#[derive(Clone, Debug, Default)]
pub struct HaplotypeRegistry {
    haplotypes: Vec<Haplotype>,
    queue: RecyclingQueue,
}

impl HaplotypeRegistry {
    /// A registry holding a single mutation-free haplotype with copy number
    /// `two_n`.
    pub fn with_ancestor(two_n: u32) -> Self {
        Self {
            haplotypes: vec![Haplotype::new(two_n)],
            queue: RecyclingQueue::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.haplotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.haplotypes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Haplotype> {
        self.haplotypes.get(index)
    }

    pub fn haplotypes(&self) -> &[Haplotype] {
        &self.haplotypes
    }

    pub(crate) fn haplotypes_mut(&mut self) -> &mut [Haplotype] {
        &mut self.haplotypes
    }

    pub fn recycling_queue(&self) -> &RecyclingQueue {
        &self.queue
    }

    /// Sum of copy numbers over all slots.
    pub fn total_copies(&self) -> u64 {
        self.haplotypes.iter().map(|h| h.n as u64).sum()
    }

    pub fn num_live(&self) -> usize {
        self.haplotypes.iter().filter(|h| h.n > 0).count()
    }

    /// Store a haplotype in the first dead slot, or append it.
    ///
    /// A recycled slot keeps its allocations; only its contents change.
    pub fn recycle_or_append(&mut self, n: u32, neutral: &[usize], selected: &[usize]) -> usize {
        if let Some(index) = self.queue.pop() {
            let slot = &mut self.haplotypes[index];
            slot.n = n;
            slot.neutral.clear();
            slot.neutral.extend_from_slice(neutral);
            slot.selected.clear();
            slot.selected.extend_from_slice(selected);
            return index;
        }
        self.haplotypes.push(Haplotype {
            n,
            neutral: neutral.to_vec(),
            selected: selected.to_vec(),
        });
        self.haplotypes.len() - 1
    }

    /// Add `n` copies to a live haplotype with identical content, or store a
    /// new one.
    ///
    /// Dead slots are never matched: their content is stale and they may be
    /// handed out by the recycling queue.
    pub fn dedup_insert(&mut self, n: u32, neutral: &[usize], selected: &[usize]) -> usize {
        let found = self
            .haplotypes
            .iter()
            .position(|h| h.n > 0 && h.same_content(neutral, selected));
        match found {
            Some(index) => {
                self.haplotypes[index].n += n;
                index
            }
            None => self.recycle_or_append(n, neutral, selected),
        }
    }

    pub fn insert(
        &mut self,
        policy: HaplotypePolicy,
        n: u32,
        neutral: &[usize],
        selected: &[usize],
    ) -> usize {
        match policy {
            HaplotypePolicy::Distinct => self.recycle_or_append(n, neutral, selected),
            HaplotypePolicy::Deduplicate => self.dedup_insert(n, neutral, selected),
        }
    }

    pub(crate) fn increment(&mut self, index: usize) {
        self.haplotypes[index].n += 1;
    }

    /// Rebuild the recycling queue from the current copy numbers.
    pub fn rebuild_recycling_queue(&mut self) {
        self.queue = make_recycling_queue(self.haplotypes.iter().map(|h| h.n));
    }
}
