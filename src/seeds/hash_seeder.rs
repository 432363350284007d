//! Exact k-mer seeding via a hash map.
//!
//! Used by the recursive reseeding inside rectangles and by the built-in
//! seed source. Reference k-mers go into an `FxHashMap`; every query k-mer
//! hit becomes a length-k seed, which the lumper later merges into maximal
//! matches.

use rustc_hash::FxHashMap;

use crate::seeds::lumping::lump_seeds;
use crate::seeds::seed::{Seed, Seeds};

/// Pack `k` base codes into one integer key; `None` when the window holds an
/// ambiguous base.
#[inline]
fn kmer_at(codes: &[u8], pos: usize, k: usize) -> Option<u64> {
    let mut key = 0u64;
    for &c in &codes[pos..pos + k] {
        if c >= 4 {
            return None;
        }
        key = (key << 2) | c as u64;
    }
    Some(key)
}

/// Index of all k-mers of one reference window.
pub struct KmerIndex {
    k: usize,
    map: FxHashMap<u64, Vec<u32>>,
}

impl KmerIndex {
    pub fn build(reference: &[u8], k: usize) -> Self {
        let mut map: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
        if k > 0 && reference.len() >= k && k <= 32 {
            for pos in 0..=reference.len() - k {
                if let Some(key) = kmer_at(reference, pos, k) {
                    map.entry(key).or_default().push(pos as u32);
                }
            }
        }
        KmerIndex { k, map }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn occurrences(&self, key: u64) -> Option<&[u32]> {
        self.map.get(&key).map(Vec::as_slice)
    }
}

/// All maximal exact matches of length >= k between `query` and `reference`,
/// in window-local forward coordinates.
pub fn hash_map_seeding(query: &[u8], reference: &[u8], k: usize) -> Seeds {
    let mut out = Seeds::new();
    if k == 0 || query.len() < k || reference.len() < k {
        return out;
    }
    let index = KmerIndex::build(reference, k);
    for q_pos in 0..=query.len() - k {
        if let Some(key) = kmer_at(query, q_pos, k) {
            if let Some(hits) = index.occurrences(key) {
                for &r_pos in hits {
                    out.push(Seed::new(q_pos as u64, k as u64, r_pos as u64, true));
                }
            }
        }
    }
    lump_seeds(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nucseq::NucSeq;

    fn codes(s: &str) -> Vec<u8> {
        NucSeq::from_ascii("t", s.as_bytes()).unwrap().codes().to_vec()
    }

    #[test]
    fn exact_match_becomes_one_maximal_seed() {
        let reference = codes("TTTTACGTACGTAGGG");
        let query = codes("ACGTACGTAG");
        let seeds = hash_map_seeding(&query, &reference, 4);
        assert_eq!(seeds.len(), 1);
        let s = &seeds[0];
        assert_eq!((s.q_start, s.len, s.r_start), (0, 10, 4));
    }

    #[test]
    fn ambiguous_bases_never_seed() {
        let reference = codes("AANNNNAA");
        let query = codes("NNNN");
        assert!(hash_map_seeding(&query, &reference, 4).is_empty());
    }

    #[test]
    fn repeats_yield_one_seed_per_occurrence() {
        let reference = codes("ACGTACGT");
        let query = codes("ACGT");
        let seeds = hash_map_seeding(&query, &reference, 4);
        assert_eq!(seeds.len(), 2);
    }

    #[test]
    fn window_smaller_than_k_is_empty() {
        let reference = codes("ACG");
        let query = codes("ACG");
        assert!(hash_map_seeding(&query, &reference, 4).is_empty());
    }
}
