//! Segments and seed emission.
//!
//! A segment pairs a query sub-range with a suffix-array interval of an
//! external index. The index itself (typically an FM-index) is an input to
//! the pipeline; this module owns only the emission policy that turns
//! segments into concrete seeds.

use std::sync::Mutex;

use crate::core::interval::Interval;
use crate::seeds::seed::{Seed, Seeds};

/// Suffix-array lookup surface the emission policy needs from the external
/// index. Ranks are global: a segment's interval indexes into this space.
pub trait SeedIndex: Send + Sync {
    /// Reference position (dual-strand address space) of the occurrence with
    /// the given suffix-array rank.
    fn locate(&self, sa_rank: u64) -> u64;

    /// Size of the dual-strand address space (2x forward length).
    fn address_space_len(&self) -> u64;
}

/// A suffix-array interval together with the query range it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub query: Interval,
    pub sa: Interval,
}

impl Segment {
    pub fn new(q_start: u64, q_len: u64, sa_start: u64, sa_len: u64) -> Self {
        Segment {
            query: Interval::new(q_start, q_len),
            sa: Interval::new(sa_start, sa_len),
        }
    }

    /// Number of occurrences on the reference.
    #[inline]
    pub fn ambiguity(&self) -> u64 {
        self.sa.size
    }

    /// Materialize every occurrence as a seed in address-space coordinates.
    pub fn for_each_seed<I: SeedIndex + ?Sized>(&self, index: &I, mut f: impl FnMut(Seed)) {
        let forward_len = index.address_space_len() / 2;
        for rank in self.sa.start..self.sa.end() {
            let pos = index.locate(rank);
            let mut seed = Seed::new(self.query.start, self.query.size, pos, pos < forward_len);
            seed.ambiguity = self.sa.size as u32;
            f(seed);
        }
    }
}

/// Running totals of the delta-based ambiguity filter, aggregated at
/// end-of-read under a mutex and reported once per run.
#[derive(Debug, Default)]
pub struct AmbiguityFilterStats {
    inner: Mutex<(u64, u64)>,
}

impl AmbiguityFilterStats {
    pub fn record(&self, kept: u64, eliminated: u64) {
        let mut guard = self.inner.lock().unwrap();
        guard.0 += kept;
        guard.1 += eliminated;
    }

    pub fn counts(&self) -> (u64, u64) {
        *self.inner.lock().unwrap()
    }

    pub fn log_summary(&self) {
        let (kept, eliminated) = self.counts();
        let total = kept + eliminated;
        if total > 0 {
            log::info!(
                "ambiguity filter kept {} and eliminated {} seeds ({:.1}% / {:.1}%)",
                kept,
                eliminated,
                100.0 * kept as f64 / total as f64,
                100.0 * eliminated as f64 / total as f64
            );
        }
    }
}

/// Emit every occurrence of each segment that passes the length and
/// ambiguity gates.
pub fn emit_all_seeds<I: SeedIndex + ?Sized>(
    segments: &[Segment],
    index: &I,
    min_seed_size: u64,
    max_ambiguity: u64,
    out: &mut Seeds,
) {
    for segment in segments {
        if segment.query.size < min_seed_size || segment.ambiguity() > max_ambiguity {
            continue;
        }
        segment.for_each_seed(index, |seed| out.push(seed));
    }
}

/// Delta-based ambiguity filter.
///
/// Segments that occur more than once on the reference contribute exactly
/// one seed: the occurrence whose diagonal is closest to that of the nearest
/// unique segment on the query axis (minimum over the previous and the next
/// unique neighbour). Unique segments are emitted as-is.
pub fn emit_filtered_seeds<I: SeedIndex + ?Sized>(
    segments: &mut [Segment],
    index: &I,
    min_seed_size: u64,
    stats: &AmbiguityFilterStats,
    out: &mut Seeds,
) {
    segments.sort_by_key(|s| s.query.start);

    let mut pending: Vec<&Segment> = Vec::new();
    let mut total_occurrences = 0u64;
    let mut last_unique_delta: Option<i64> = None;

    let flush = |pending: &mut Vec<&Segment>,
                 prev_delta: Option<i64>,
                 next_delta: Option<i64>,
                 out: &mut Seeds| {
        for segment in pending.drain(..) {
            let mut best: Option<(i64, Seed)> = None;
            segment.for_each_seed(index, |seed| {
                let delta = seed.diagonal();
                let dist = [prev_delta, next_delta]
                    .iter()
                    .flatten()
                    .map(|d| (delta - d).abs())
                    .min()
                    .unwrap_or(0);
                if best.map_or(true, |(d, _)| dist < d) {
                    best = Some((dist, seed));
                }
            });
            if let Some((_, seed)) = best {
                out.push(seed);
            }
        }
    };

    for i in 0..segments.len() {
        let segment = segments[i];
        if segment.query.size < min_seed_size {
            continue;
        }
        total_occurrences += segment.ambiguity();
        if segment.ambiguity() == 1 {
            let mut unique_seed = None;
            segment.for_each_seed(index, |seed| unique_seed = Some(seed));
            let seed = unique_seed.expect("unique segment yields one seed");
            flush(
                &mut pending,
                last_unique_delta,
                Some(seed.diagonal()),
                out,
            );
            last_unique_delta = Some(seed.diagonal());
            out.push(seed);
        } else {
            pending.push(&segments[i]);
        }
    }
    flush(&mut pending, last_unique_delta, None, out);

    stats.record(out.len() as u64, total_occurrences - out.len() as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Index over an explicit occurrence table, as used by the hash-backed
    /// seed source.
    pub struct TableIndex {
        pub occurrences: Vec<u64>,
        pub address_space: u64,
    }

    impl SeedIndex for TableIndex {
        fn locate(&self, sa_rank: u64) -> u64 {
            self.occurrences[sa_rank as usize]
        }
        fn address_space_len(&self) -> u64 {
            self.address_space
        }
    }

    #[test]
    fn emission_honors_length_and_ambiguity_gates() {
        let index = TableIndex {
            occurrences: vec![100, 200, 300],
            address_space: 10_000,
        };
        let segments = vec![
            Segment::new(0, 25, 0, 1),  // passes
            Segment::new(30, 10, 1, 1), // too short
            Segment::new(50, 25, 1, 2), // too ambiguous
        ];
        let mut out = Seeds::new();
        emit_all_seeds(&segments, &index, 20, 1, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].r_start, 100);
        assert_eq!(out[0].ambiguity, 1);
    }

    #[test]
    fn reverse_half_of_address_space_flags_strand() {
        let index = TableIndex {
            occurrences: vec![9_000],
            address_space: 10_000,
        };
        let segments = vec![Segment::new(0, 25, 0, 1)];
        let mut out = Seeds::new();
        emit_all_seeds(&segments, &index, 20, 1, &mut out);
        assert!(!out[0].forward);
    }

    #[test]
    fn ambiguity_filter_picks_delta_closest_to_unique_neighbours() {
        // unique at q=0 with delta 0, ambiguous at q=10 with occurrence
        // deltas {-5, 0, +100}, unique at q=50 with delta 2
        let index = TableIndex {
            occurrences: vec![0, 15, 10, 4_000, 48],
            address_space: 100_000,
        };
        let mut segments = vec![
            Segment::new(0, 25, 0, 1),
            Segment::new(10, 25, 1, 3),
            Segment::new(50, 25, 4, 1),
        ];
        let stats = AmbiguityFilterStats::default();
        let mut out = Seeds::new();
        emit_filtered_seeds(&mut segments, &index, 20, &stats, &mut out);
        assert_eq!(out.len(), 3);
        let middle = out
            .iter()
            .find(|s| s.q_start == 10)
            .expect("middle segment yields one seed");
        assert_eq!(middle.diagonal(), 0);
        assert_eq!(middle.r_start, 10);
        let (kept, eliminated) = stats.counts();
        assert_eq!(kept, 3);
        assert_eq!(eliminated, 2);
    }
}
