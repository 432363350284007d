//! Filtering palindromic seed artifacts.
//!
//! An inverted repeat that reads the same forwards and backwards produces a
//! forward and a reverse seed covering the same query range and the same
//! stretch of the reference. Such twin pairs carry no strand information and
//! mislead the jump inference; by default both twins are dropped.

use rustc_hash::FxHashSet;

use crate::seeds::seed::{Seed, Seeds};

#[derive(Debug, Default)]
pub struct PalindromeFilter {
    /// Keep flagged seeds instead of dropping them.
    pub keep: bool,
    /// Twins removed by the last run, for diagnostics.
    pub palindromes: Seeds,
}

impl PalindromeFilter {
    pub fn new(keep: bool) -> Self {
        PalindromeFilter {
            keep,
            palindromes: Seeds::new(),
        }
    }

    fn twin_key(seed: &Seed) -> (u64, u64, u64) {
        (seed.q_start, seed.len, seed.start_ref_cons_rev())
    }

    /// Flag seeds whose reverse-complement twin is present at the symmetric
    /// position. Returns the surviving seeds; the flagged ones are kept in
    /// `self.palindromes`.
    pub fn filter(&mut self, seeds: Seeds) -> Seeds {
        self.palindromes.clear();
        let forward_keys: FxHashSet<_> = seeds
            .iter()
            .filter(|s| s.forward)
            .map(Self::twin_key)
            .collect();
        let reverse_keys: FxHashSet<_> = seeds
            .iter()
            .filter(|s| !s.forward)
            .map(Self::twin_key)
            .collect();

        let mut out = Seeds::with_capacity(seeds.len());
        for seed in &seeds {
            let twin_present = if seed.forward {
                reverse_keys.contains(&Self::twin_key(seed))
            } else {
                forward_keys.contains(&Self::twin_key(seed))
            };
            if twin_present {
                self.palindromes.push(*seed);
                if self.keep {
                    out.push(*seed);
                }
            } else {
                out.push(*seed);
            }
        }
        out
    }
}
