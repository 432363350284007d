//! Strips of consideration.
//!
//! Seeds are bucketed by their diagonal: a strip groups all seeds whose
//! bucketing position falls into a window of one strip width on the
//! reference. Non-overlapping window maxima go into a priority queue ordered
//! by accumulated seed length, so harmonization can consume the most
//! promising strips first.

use std::collections::BinaryHeap;

use crate::seeds::seed::{Seed, Seeds};

/// Ordering handle of one strip: more accumulated seed length wins, lower
/// ambiguity breaks ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocOrder {
    pub accumulative_len: u64,
    pub ambiguity: u64,
    pub seed_count: u32,
}

impl SocOrder {
    pub fn add(&mut self, seed: &Seed) {
        self.accumulative_len += seed.value();
        self.ambiguity += seed.ambiguity as u64;
        self.seed_count += 1;
    }

    pub fn remove(&mut self, seed: &Seed) {
        debug_assert!(self.accumulative_len >= seed.value());
        self.accumulative_len -= seed.value();
        self.ambiguity -= seed.ambiguity as u64;
        self.seed_count -= 1;
    }
}

impl Ord for SocOrder {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.accumulative_len
            .cmp(&other.accumulative_len)
            .then(other.ambiguity.cmp(&self.ambiguity))
    }
}

impl PartialOrd for SocOrder {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct StripCandidate {
    order: SocOrder,
    begin: usize,
    end: usize,
}

impl Ord for StripCandidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order
            .cmp(&other.order)
            .then(other.begin.cmp(&self.begin))
    }
}

impl PartialOrd for StripCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Position a seed is bucketed at: where the read would start on the
/// reference if the seed were part of a gapless alignment.
#[inline]
pub fn soc_position(query_len: u64, seed: &Seed) -> u64 {
    seed.r_start + (query_len - seed.q_start)
}

/// Strips in score order over one shared, delta-sorted seed vector.
#[derive(Debug, Default)]
pub struct SocPriorityQueue {
    seeds: Vec<Seed>,
    heap: BinaryHeap<StripCandidate>,
    next_strip_index: u32,
}

impl SocPriorityQueue {
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Remove and return the best strip.
    pub fn pop(&mut self) -> Option<Seeds> {
        let candidate = self.heap.pop()?;
        let mut strip = Seeds::with_capacity(candidate.end - candidate.begin);
        for seed in &self.seeds[candidate.begin..candidate.end] {
            strip.push(*seed);
        }
        strip.stats.index_of_strip = self.next_strip_index;
        self.next_strip_index += 1;
        strip.stats.num_seeds_in_strip = candidate.order.seed_count;
        if let Some(anchor) = strip.iter().max_by_key(|s| s.len) {
            let (len, ambiguity) = (anchor.len, anchor.ambiguity);
            strip.stats.anchor_size = len;
            strip.stats.anchor_ambiguity = ambiguity;
        }
        Some(strip)
    }
}

/// Collect window maxima of the delta-sorted seeds into a priority queue.
///
/// A sliding window of one strip width moves over the bucketing positions;
/// of any run of overlapping windows only the best-scoring one is kept.
pub fn collect_strips(seeds: Seeds, query_len: u64, strip_width: u64) -> SocPriorityQueue {
    let mut sorted = seeds.as_slice().to_vec();
    sorted.sort_by_key(|s| soc_position(query_len, s));
    for seed in &mut sorted {
        seed.delta = soc_position(query_len, seed);
    }

    let mut queue = SocPriorityQueue::default();
    let mut maxima: Vec<StripCandidate> = Vec::new();
    let mut last_end_pos = 0u64;

    let mut order = SocOrder::default();
    let mut window_end = 0usize;
    for begin in 0..sorted.len() {
        if begin > 0 {
            order.remove(&sorted[begin - 1]);
        }
        let window_limit = sorted[begin].delta + strip_width;
        while window_end < sorted.len() && sorted[window_end].delta <= window_limit {
            order.add(&sorted[window_end]);
            window_end += 1;
        }
        let start_pos = sorted[begin].delta;
        let end_pos = sorted[window_end - 1].delta;

        // keep only the best of any run of overlapping windows
        let overlaps = !maxima.is_empty() && last_end_pos >= start_pos;
        if !overlaps || maxima.last().unwrap().order < order {
            if overlaps {
                maxima.pop();
            }
            maxima.push(StripCandidate {
                order,
                begin,
                end: window_end,
            });
            last_end_pos = end_pos;
        }
    }

    for candidate in maxima.iter() {
        for i in candidate.begin..candidate.end {
            sorted[i].soc_count += 1;
        }
    }
    queue.seeds = sorted;
    queue.heap = maxima.into_iter().collect();
    queue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_of(queue: &mut SocPriorityQueue) -> Vec<(u64, u64)> {
        queue
            .pop()
            .map(|s| s.iter().map(|x| (x.q_start, x.r_start)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn best_strip_pops_first() {
        // two diagonals: a strong one near r=1000 and a weak one near r=5000
        let seeds = Seeds::from_vec(vec![
            Seed::new(0, 30, 1000, true),
            Seed::new(40, 25, 1040, true),
            Seed::new(10, 12, 5000, true),
        ]);
        let mut queue = collect_strips(seeds, 100, 100);
        assert_eq!(queue.len(), 2);
        let best = strip_of(&mut queue);
        assert_eq!(best.len(), 2);
        assert!(best.contains(&(0, 1000)));
        assert!(best.contains(&(40, 1040)));
        let weak = strip_of(&mut queue);
        assert_eq!(weak, vec![(10, 5000)]);
    }

    #[test]
    fn ambiguity_breaks_score_ties() {
        let mut clean = Seed::new(0, 20, 1000, true);
        clean.ambiguity = 1;
        let mut noisy = Seed::new(0, 20, 9000, true);
        noisy.ambiguity = 7;
        let seeds = Seeds::from_vec(vec![clean, noisy]);
        let mut queue = collect_strips(seeds, 50, 50);
        let first = queue.pop().unwrap();
        assert_eq!(first[0].r_start, 1000);
    }

    #[test]
    fn strip_stats_carry_the_anchor() {
        let seeds = Seeds::from_vec(vec![
            Seed::new(0, 30, 1000, true),
            Seed::new(40, 25, 1040, true),
        ]);
        let mut queue = collect_strips(seeds, 100, 100);
        let strip = queue.pop().unwrap();
        assert_eq!(strip.stats.num_seeds_in_strip, 2);
        assert_eq!(strip.stats.anchor_size, 30);
    }
}
