//! Victim selection for a collection pass.
//!
//! Candidates arrive in list order, not age order. Selection keeps a max-heap
//! of the tentatively evicted candidates keyed by version snapshot, so the
//! newest selected candidate is always on top and can be swapped out when an
//! older one shows up:
//!
//! ```text
//!   goal = used - target
//!
//!   selected < goal          → accept
//!   older than heap top      → accept, then pop tops while the rest
//!                              still cover the goal
//!   otherwise                → retain (second chance)
//! ```
//!
//! The result evicts at least `min(goal, total)` bytes and prefers low
//! snapshots, without a full sort of the candidate list.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::common::Epoch;

/// One detached record offered for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<R> {
    pub item: R,
    /// Slot version at detach time. Lower means touched longer ago.
    pub snapshot: Epoch,
    /// Bytes freed if this candidate is evicted.
    pub size: u64,
}

/// Outcome of [`select_victims`]. Every candidate ends up in exactly one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<R> {
    pub evict: Vec<R>,
    pub retain: Vec<R>,
}

/// Heap entry. `seq` breaks snapshot ties so ordering is total.
struct Ranked<R> {
    candidate: Candidate<R>,
    seq: usize,
}

impl<R> Ranked<R> {
    fn key(&self) -> (Epoch, usize) {
        (self.candidate.snapshot, self.seq)
    }
}

impl<R> PartialEq for Ranked<R> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<R> Eq for Ranked<R> {}

impl<R> PartialOrd for Ranked<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for Ranked<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Split `candidates` into records to evict and records to keep.
///
/// `goal` is the number of bytes the pass wants to free. A zero goal evicts
/// nothing. The first candidate is always accepted when the goal is
/// non-zero, even if it alone exceeds the goal.
pub fn select_victims<R, I>(candidates: I, goal: u64) -> Selection<R>
where
    I: IntoIterator<Item = Candidate<R>>,
{
    let mut heap: BinaryHeap<Ranked<R>> = BinaryHeap::new();
    let mut retain = Vec::new();
    let mut selected = 0u64;

    for (seq, candidate) in candidates.into_iter().enumerate() {
        if goal == 0 {
            retain.push(candidate.item);
            continue;
        }

        if selected < goal {
            selected += candidate.size;
            heap.push(Ranked { candidate, seq });
            continue;
        }

        // Goal already covered. Replacement only makes sense against a
        // non-empty heap.
        let older_than_top = match heap.peek() {
            Some(top) => candidate.snapshot < top.candidate.snapshot,
            None => false,
        };

        if !older_than_top {
            retain.push(candidate.item);
            continue;
        }

        selected += candidate.size;
        heap.push(Ranked { candidate, seq });

        while let Some(top) = heap.peek() {
            let size = top.candidate.size;
            if selected - size < goal {
                break;
            }
            if let Some(top) = heap.pop() {
                selected -= size;
                retain.push(top.candidate.item);
            }
        }
    }

    Selection {
        evict: heap.into_iter().map(|ranked| ranked.candidate.item).collect(),
        retain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cand(item: u32, snapshot: u64, size: u64) -> Candidate<u32> {
        Candidate {
            item,
            snapshot: Epoch::new(snapshot),
            size,
        }
    }

    fn sorted(mut v: Vec<u32>) -> Vec<u32> {
        v.sort_unstable();
        v
    }

    #[test]
    fn test_zero_goal_evicts_nothing() {
        let selection = select_victims(vec![cand(1, 1, 10), cand(2, 2, 10)], 0);
        assert!(selection.evict.is_empty());
        assert_eq!(sorted(selection.retain), vec![1, 2]);
    }

    #[test]
    fn test_empty_candidates() {
        let selection = select_victims(Vec::<Candidate<u32>>::new(), 100);
        assert!(selection.evict.is_empty());
        assert!(selection.retain.is_empty());
    }

    #[test]
    fn test_first_candidate_larger_than_goal() {
        // One candidate alone overshoots the goal; it is still taken, and
        // later newer candidates never touch an empty heap.
        let selection = select_victims(
            vec![cand(1, 5, 1000), cand(2, 9, 10), cand(3, 7, 10)],
            100,
        );
        assert_eq!(selection.evict, vec![1]);
        assert_eq!(sorted(selection.retain), vec![2, 3]);
    }

    #[test]
    fn test_older_candidate_replaces_newest() {
        // Arrival order is newest first; oldest four must win.
        let candidates = (0..8u32).map(|i| cand(i, 100 - i as u64, 10));
        let selection = select_victims(candidates, 40);

        assert_eq!(sorted(selection.evict), vec![4, 5, 6, 7]);
        assert_eq!(sorted(selection.retain), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_large_old_candidate_displaces_several() {
        let selection = select_victims(
            vec![cand(1, 10, 10), cand(2, 11, 10), cand(3, 12, 10), cand(4, 1, 30)],
            30,
        );
        // 4 alone covers the goal, so 1..3 all go back
        assert_eq!(selection.evict, vec![4]);
        assert_eq!(sorted(selection.retain), vec![1, 2, 3]);
    }

    #[test]
    fn test_goal_above_total_evicts_everything() {
        let selection = select_victims(vec![cand(1, 3, 10), cand(2, 1, 10)], 1000);
        assert_eq!(sorted(selection.evict), vec![1, 2]);
        assert!(selection.retain.is_empty());
    }

    proptest! {
        #[test]
        fn prop_partition_and_coverage(
            entries in prop::collection::vec((0u64..50, 1u64..200), 0..64),
            goal in 0u64..4000,
        ) {
            let candidates: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, &(snapshot, size))| cand(i as u32, snapshot, size))
                .collect();
            let total: u64 = entries.iter().map(|&(_, size)| size).sum();

            let selection = select_victims(candidates, goal);

            let mut all = selection.evict.clone();
            all.extend(selection.retain.iter().copied());
            prop_assert_eq!(sorted(all), (0..entries.len() as u32).collect::<Vec<_>>());

            let evicted: u64 = selection.evict.iter().map(|&i| entries[i as usize].1).sum();
            prop_assert!(evicted >= goal.min(total));
            if goal == 0 {
                prop_assert!(selection.evict.is_empty());
            }
        }

        #[test]
        fn prop_equal_sizes_pick_oldest(
            snapshots in prop::collection::vec(0u64..1000, 1..64),
            k in 1usize..64,
        ) {
            let size = 16u64;
            let k = k.min(snapshots.len());
            let candidates: Vec<_> = snapshots
                .iter()
                .enumerate()
                .map(|(i, &snapshot)| cand(i as u32, snapshot, size))
                .collect();

            let selection = select_victims(candidates, k as u64 * size);

            let mut chosen: Vec<u64> = selection
                .evict
                .iter()
                .map(|&i| snapshots[i as usize])
                .collect();
            chosen.sort_unstable();

            let mut expected = snapshots.clone();
            expected.sort_unstable();
            expected.truncate(k);

            prop_assert_eq!(chosen, expected);
        }
    }
}
