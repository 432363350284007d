// The delta-based ambiguity filter keeps, per ambiguous segment, only the
// occurrence closest to its unique neighbours on the query.

use svalign::core::interval::Interval;
use svalign::seeds::seed::Seeds;
use svalign::seeds::segment::{
    emit_filtered_seeds, AmbiguityFilterStats, SeedIndex, Segment,
};

struct TableIndex {
    occurrences: Vec<u64>,
    address_space: u64,
}

impl SeedIndex for TableIndex {
    fn locate(&self, sa_rank: u64) -> u64 {
        self.occurrences[sa_rank as usize]
    }
    fn address_space_len(&self) -> u64 {
        self.address_space
    }
}

fn segment(q_start: u64, q_len: u64, sa: Interval) -> Segment {
    Segment::new(q_start, q_len, sa.start, sa.size)
}

#[test]
fn ambiguous_segment_resolves_to_the_neighbour_delta() {
    // unique at q=0 (delta 0), ambiguous at q=10 with occurrence deltas
    // {-5, 0, -3990}, unique at q=50 (delta 2)
    let index = TableIndex {
        occurrences: vec![0, 15, 10, 4_000, 48],
        address_space: 100_000,
    };
    let mut segments = vec![
        segment(0, 25, Interval::new(0, 1)),
        segment(10, 25, Interval::new(1, 3)),
        segment(50, 25, Interval::new(4, 1)),
    ];
    let stats = AmbiguityFilterStats::default();
    let mut out = Seeds::new();
    emit_filtered_seeds(&mut segments, &index, 20, &stats, &mut out);

    assert_eq!(out.len(), 3);
    let resolved = out.iter().find(|s| s.q_start == 10).unwrap();
    assert_eq!(resolved.diagonal(), 0);
    let (kept, eliminated) = stats.counts();
    assert_eq!((kept, eliminated), (3, 2));
}

#[test]
fn trailing_ambiguous_segment_uses_the_previous_unique() {
    // unique at q=0 (delta 0), then an ambiguous tail segment
    let index = TableIndex {
        occurrences: vec![100, 950, 130],
        address_space: 100_000,
    };
    let mut segments = vec![
        segment(100, 30, Interval::new(0, 1)), // delta 0
        segment(140, 30, Interval::new(1, 2)), // deltas -810 and 10
    ];
    let stats = AmbiguityFilterStats::default();
    let mut out = Seeds::new();
    emit_filtered_seeds(&mut segments, &index, 20, &stats, &mut out);

    assert_eq!(out.len(), 2);
    let tail = out.iter().find(|s| s.q_start == 140).unwrap();
    assert_eq!(tail.r_start, 130);
}

#[test]
fn short_segments_are_ignored_entirely() {
    let index = TableIndex {
        occurrences: vec![100],
        address_space: 100_000,
    };
    let mut segments = vec![segment(0, 10, Interval::new(0, 1))];
    let stats = AmbiguityFilterStats::default();
    let mut out = Seeds::new();
    emit_filtered_seeds(&mut segments, &index, 20, &stats, &mut out);
    assert!(out.is_empty());
}
