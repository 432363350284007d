//! Statistical k-mer analysis of reference windows.
//!
//! Before reseeding a rectangle, the reference window is probed for
//! repetitiveness: in a repetitive window, hash seeding would drown the
//! signal in random matches, so the caller switches to dynamic programming
//! instead.

use rustc_hash::FxHashMap;

/// Smallest k so that the expected number of random k-mer matches inside an
/// area of the given size stays below `p_random`.
pub fn k_for_area(area: u64, p_random: f64) -> usize {
    let mut k = 1usize;
    let mut expectation = area as f64 * 0.25;
    while expectation > p_random && k < 32 {
        k += 1;
        expectation *= 0.25;
    }
    k
}

/// Sampled ambiguity of a reference window given as forward sequence and its
/// reverse complement.
///
/// With k sized for the window, every k-mer of a unique sequence occurs once
/// and the sum of occurrence counts over the forward positions equals the
/// number of forward k-mers (roughly the window width). Repeats and inverted
/// repeats inflate the sum; values above `width * (1 + max_similarity)`
/// indicate a window where hash seeding is unreliable.
pub fn sample_sequence_ambiguity(forward: &[u8], revcomp: &[u8], p_random: f64) -> u64 {
    let len = forward.len();
    let k = k_for_area((len as u64).saturating_mul(len as u64), p_random);
    if len < k {
        return 0;
    }
    let mut counts: FxHashMap<u64, u32> = FxHashMap::default();
    let mut add = |codes: &[u8]| {
        for pos in 0..=codes.len().saturating_sub(k) {
            if let Some(key) = pack_kmer(codes, pos, k) {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    };
    add(forward);
    add(revcomp);

    let mut ambiguity = 0u64;
    for pos in 0..=len - k {
        if let Some(key) = pack_kmer(forward, pos, k) {
            ambiguity += counts[&key] as u64;
        }
    }
    ambiguity
}

#[inline]
fn pack_kmer(codes: &[u8], pos: usize, k: usize) -> Option<u64> {
    let mut key = 0u64;
    for &c in &codes[pos..pos + k] {
        if c >= 4 {
            return None;
        }
        key = (key << 2) | c as u64;
    }
    Some(key)
}
