//! Built-in seed source backed by a k-mer hash index.
//!
//! The segmenter proper is an external collaborator (an FM-index driven
//! binary seeder). This module provides a self-contained replacement so the
//! pipeline runs end-to-end without external index files: maximal exact
//! k-mer matches of the query against both strands, grouped into segments
//! with an explicit occurrence table standing in for the suffix array.

use rustc_hash::FxHashMap;

use crate::core::nucseq::NucSeq;
use crate::index::pack::Pack;
use crate::seeds::lumping::lump_seeds;
use crate::seeds::seed::{Seed, Seeds};
use crate::seeds::segment::{SeedIndex, Segment};

/// Segments of one query plus the occurrence table their suffix-array
/// intervals index into.
#[derive(Debug, Default)]
pub struct SegmentSet {
    pub segments: Vec<Segment>,
    occurrences: Vec<u64>,
    address_space: u64,
}

impl SeedIndex for SegmentSet {
    fn locate(&self, sa_rank: u64) -> u64 {
        self.occurrences[sa_rank as usize]
    }
    fn address_space_len(&self) -> u64 {
        self.address_space
    }
}

/// Produces segments for a query. The production pipeline feeds an external
/// FM-index seeder through this seam; `HashSeedIndex` is the built-in
/// implementation.
pub trait SegmentSource: Send + Sync {
    fn segments(&self, query: &NucSeq) -> SegmentSet;
}

pub struct HashSeedIndex {
    k: usize,
    forward_len: u64,
    map: FxHashMap<u64, Vec<u32>>,
}

impl HashSeedIndex {
    /// Index every k-mer of the forward strand. Holes are materialized as N
    /// first, so no k-mer spans ambiguous bases.
    pub fn build(pack: &Pack, k: usize) -> crate::error::Result<Self> {
        assert!(k >= 1 && k <= 32, "k must fit a 2-bit packed u64");
        let mut map: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
        let mut window = NucSeq::new();
        for id in 0..pack.num_contigs() {
            let start = pack.start_of_contig(id);
            let end = pack.end_of_contig(id);
            pack.extract_with_n_into(start, end, &mut window, false)?;
            let codes = window.codes();
            if codes.len() < k {
                continue;
            }
            let mut key = 0u64;
            let mask = if k == 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
            let mut valid = 0usize;
            for (i, &c) in codes.iter().enumerate() {
                if c >= 4 {
                    valid = 0;
                    key = 0;
                    continue;
                }
                key = ((key << 2) | c as u64) & mask;
                valid += 1;
                if valid >= k {
                    let pos = start + (i + 1 - k) as u64;
                    map.entry(key).or_default().push(pos as u32);
                }
            }
        }
        log::debug!("hash seed index: {} distinct {}-mers", map.len(), k);
        Ok(HashSeedIndex {
            k,
            forward_len: pack.forward_len(),
            map,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Maximal exact matches of `codes` against the forward strand, in
    /// forward coordinates.
    fn maximal_matches(&self, codes: &[u8]) -> Seeds {
        let mut raw = Seeds::new();
        if codes.len() < self.k {
            return raw;
        }
        let mask = if self.k == 32 {
            u64::MAX
        } else {
            (1u64 << (2 * self.k)) - 1
        };
        let mut key = 0u64;
        let mut valid = 0usize;
        for (i, &c) in codes.iter().enumerate() {
            if c >= 4 {
                valid = 0;
                key = 0;
                continue;
            }
            key = ((key << 2) | c as u64) & mask;
            valid += 1;
            if valid >= self.k {
                if let Some(hits) = self.map.get(&key) {
                    let q_pos = (i + 1 - self.k) as u64;
                    for &r_pos in hits {
                        raw.push(Seed::new(q_pos, self.k as u64, r_pos as u64, true));
                    }
                }
            }
        }
        lump_seeds(raw)
    }
}

impl SegmentSource for HashSeedIndex {
    fn segments(&self, query: &NucSeq) -> SegmentSet {
        let qlen = query.len();
        let mut matches: Vec<Seed> = Vec::new();

        // forward strand
        for seed in &self.maximal_matches(query.codes()) {
            matches.push(*seed);
        }
        // reverse strand: hits of the reverse-complemented query, mapped
        // into the virtual reverse address space
        let revcomp = query.reverse_complement();
        for seed in &self.maximal_matches(revcomp.codes()) {
            let q_start = qlen - seed.q_end();
            let r_start = 2 * self.forward_len - seed.r_start - seed.len;
            matches.push(Seed::new(q_start, seed.len, r_start, false));
        }

        // group occurrences of the same query interval into one segment
        matches.sort_by_key(|s| (s.q_start, s.len, s.r_start));
        let mut set = SegmentSet {
            address_space: 2 * self.forward_len,
            ..SegmentSet::default()
        };
        let mut i = 0;
        while i < matches.len() {
            let q = (matches[i].q_start, matches[i].len);
            let sa_start = set.occurrences.len() as u64;
            while i < matches.len() && (matches[i].q_start, matches[i].len) == q {
                set.occurrences.push(matches[i].r_start);
                i += 1;
            }
            set.segments.push(Segment::new(
                q.0,
                q.1,
                sa_start,
                set.occurrences.len() as u64 - sa_start,
            ));
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeds::segment::emit_all_seeds;

    fn test_pack(seqs: &[(&str, &str)]) -> Pack {
        let mut pack = Pack::new();
        for (name, seq) in seqs {
            pack.append(name, "", &NucSeq::from_ascii(name, seq.as_bytes()).unwrap());
        }
        pack
    }

    #[test]
    fn forward_query_is_found() {
        let pack = test_pack(&[("a", "TTTTTTACGTACGTCCCCGGGGAAAATTTT")]);
        let index = HashSeedIndex::build(&pack, 8).unwrap();
        let query = NucSeq::from_ascii("q", b"ACGTACGTCCCC").unwrap();
        let set = index.segments(&query);
        assert!(!set.segments.is_empty());
        let mut seeds = Seeds::new();
        emit_all_seeds(&set.segments, &set, 8, 4, &mut seeds);
        assert!(seeds.iter().any(|s| s.forward && s.r_start == 6 && s.len == 12));
    }

    #[test]
    fn reverse_query_maps_into_reverse_address_space() {
        let reference = "TTTTTTACGTACGTCCCCGGGGAAAATTTT";
        let pack = test_pack(&[("a", reference)]);
        let index = HashSeedIndex::build(&pack, 8).unwrap();
        // reverse complement of the 6..18 window of the reference
        let query = NucSeq::from_ascii("q", b"GGGGACGTACGT").unwrap();
        let set = index.segments(&query);
        let mut seeds = Seeds::new();
        emit_all_seeds(&set.segments, &set, 8, 4, &mut seeds);
        let rev: Vec<_> = seeds.iter().filter(|s| !s.forward).collect();
        assert!(!rev.is_empty());
        let l = pack.forward_len();
        for s in rev {
            assert!(s.r_start >= l, "reverse seed must use the reverse space");
        }
    }

    #[test]
    fn kmers_never_cross_contig_borders() {
        let pack = test_pack(&[("a", "AAAACCCC"), ("b", "GGGGTTTT")]);
        let index = HashSeedIndex::build(&pack, 8).unwrap();
        // the concatenation boundary k-mer CCCCGGGG exists only across contigs
        let query = NucSeq::from_ascii("q", b"CCCCGGGG").unwrap();
        let set = index.segments(&query);
        let mut seeds = Seeds::new();
        emit_all_seeds(&set.segments, &set, 8, 64, &mut seeds);
        assert!(seeds.is_empty());
    }
}
