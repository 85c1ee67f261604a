use std::collections::VecDeque;

/// FIFO queue of dead registry slots.
///
/// Slots are handed out in ascending index order, so reuse is deterministic
/// for a given count vector.
#[derive(Clone, Debug, Default)]
pub struct RecyclingQueue {
    slots: VecDeque<usize>,
}

impl RecyclingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&mut self) -> Option<usize> {
        let slot = self.slots.pop_front();
        if let Some(i) = slot {
            log::trace!("recycling slot {i}");
        }
        slot
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().copied()
    }
}

/// Enqueue every index whose count is zero, in ascending order.
pub fn make_recycling_queue<I>(counts: I) -> RecyclingQueue
where
    I: IntoIterator<Item = u32>,
{
    let slots = counts
        .into_iter()
        .enumerate()
        .filter(|&(_, c)| c == 0)
        .map(|(i, _)| i)
        .collect();
    RecyclingQueue { slots }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_counts_are_queued_in_index_order() {
        let mut q = make_recycling_queue([3, 0, 1, 0, 0, 7]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(4));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn no_dead_slots() {
        let q = make_recycling_queue([1, 2, 3]);
        assert!(q.is_empty());
    }
}
