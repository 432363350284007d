//! Alignment container and CIGAR handling.

use crate::seeds::seed::{Seed, Seeds};

/// One run type of an alignment. `Seed` marks bases matched during seeding
/// rather than by dynamic programming; downstream both render as matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Seed,
    Match,
    Mismatch,
    Insertion,
    Deletion,
}

impl MatchType {
    /// CIGAR operation character.
    pub fn cigar_char(&self) -> char {
        match self {
            MatchType::Seed | MatchType::Match => 'M',
            MatchType::Mismatch => 'X',
            MatchType::Insertion => 'I',
            MatchType::Deletion => 'D',
        }
    }

    #[inline]
    pub fn consumes_query(&self) -> bool {
        !matches!(self, MatchType::Deletion)
    }

    #[inline]
    pub fn consumes_reference(&self) -> bool {
        !matches!(self, MatchType::Insertion)
    }
}

/// A finished alignment of one query against one reference region.
///
/// `mate` is an index into the per-batch alignment arena, never a pointer;
/// when the arena goes away all indices die with it.
#[derive(Debug, Clone)]
pub struct Alignment {
    ops: Vec<(MatchType, u64)>,
    pub q_begin: u64,
    pub q_end: u64,
    pub r_begin: u64,
    pub r_end: u64,
    pub score: i64,
    /// Mapping confidence in `[0, 1]`; NaN when the alignment scored below
    /// the reporting threshold.
    pub mapping_quality: f64,
    pub secondary: bool,
    pub supplementary: bool,
    pub mate: Option<usize>,
    pub query_name: String,
    pub on_forward_strand: bool,
}

impl Alignment {
    pub fn new(r_begin: u64, q_begin: u64) -> Self {
        Alignment {
            ops: Vec::new(),
            q_begin,
            q_end: q_begin,
            r_begin,
            r_end: r_begin,
            score: 0,
            mapping_quality: f64::NAN,
            secondary: false,
            supplementary: false,
            mate: None,
            query_name: String::new(),
            on_forward_strand: true,
        }
    }

    pub fn ops(&self) -> &[(MatchType, u64)] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Append a run, merging with the trailing run of the same type.
    pub fn append(&mut self, op: MatchType, len: u64) {
        if len == 0 {
            return;
        }
        if op.consumes_query() {
            self.q_end += len;
        }
        if op.consumes_reference() {
            self.r_end += len;
        }
        match self.ops.last_mut() {
            Some((last, run)) if *last == op => *run += len,
            _ => self.ops.push((op, len)),
        }
    }

    /// Query bases covered by this alignment.
    pub fn query_span(&self) -> u64 {
        self.q_end - self.q_begin
    }

    /// Overlap on the query with another alignment, in bases.
    pub fn query_overlap(&self, other: &Alignment) -> u64 {
        let begin = self.q_begin.max(other.q_begin);
        let end = self.q_end.min(other.q_end);
        end.saturating_sub(begin)
    }

    /// Render the CIGAR, with soft clips for uncovered query ends.
    pub fn cigar(&self, query_len: u64) -> String {
        let mut out = String::new();
        if self.q_begin > 0 {
            out.push_str(&format!("{}S", self.q_begin));
        }
        let mut merged: Vec<(char, u64)> = Vec::new();
        for (op, len) in &self.ops {
            let c = op.cigar_char();
            // mismatches render as M alongside matches
            let c = if c == 'X' { 'M' } else { c };
            match merged.last_mut() {
                Some((lc, run)) if *lc == c => *run += len,
                _ => merged.push((c, *len)),
            }
        }
        for (c, len) in merged {
            out.push_str(&format!("{}{}", len, c));
        }
        if self.q_end < query_len {
            out.push_str(&format!("{}S", query_len - self.q_end));
        }
        if out.is_empty() {
            out.push('*');
        }
        out
    }

    /// Convert match and seed runs back into seeds, in the alignment's own
    /// coordinate frame. Used by the DP path of rectangle reseeding.
    pub fn to_seeds(&self) -> Seeds {
        let mut out = Seeds::new();
        let mut q = self.q_begin;
        let mut r = self.r_begin;
        for (op, len) in &self.ops {
            if matches!(op, MatchType::Seed | MatchType::Match) {
                out.push(Seed::new(q, *len, r, true));
            }
            if op.consumes_query() {
                q += len;
            }
            if op.consumes_reference() {
                r += len;
            }
        }
        out
    }

    /// Number of match, mismatch, insertion and deletion columns.
    pub fn op_counts(&self) -> (u64, u64, u64, u64) {
        let mut counts = (0, 0, 0, 0);
        for (op, len) in &self.ops {
            match op {
                MatchType::Seed | MatchType::Match => counts.0 += len,
                MatchType::Mismatch => counts.1 += len,
                MatchType::Insertion => counts.2 += len,
                MatchType::Deletion => counts.3 += len,
            }
        }
        counts
    }
}
