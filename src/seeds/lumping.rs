//! Merging collinear seeds.

use crate::seeds::seed::{Seed, Seeds};

/// Bucketing key of a seed's diagonal, strand-aware: collinear forward seeds
/// share `q - r`, collinear reverse seeds (walking leftwards on the
/// reference) share `q + r`.
fn lump_key(seed: &Seed) -> (bool, i64) {
    if seed.forward {
        (true, seed.q_start as i64 - seed.r_start as i64)
    } else {
        (false, seed.q_start as i64 + seed.r_start as i64)
    }
}

/// Merge seeds on the same diagonal that overlap or touch on the query into
/// one spanning seed. Identical seeds collapse to a single copy.
pub fn lump_seeds(seeds: Seeds) -> Seeds {
    if seeds.is_empty() {
        return seeds;
    }
    let mut sorted = seeds.as_slice().to_vec();
    sorted.sort_by(|a, b| lump_key(a).cmp(&lump_key(b)).then(a.q_start.cmp(&b.q_start)));

    let mut out = Seeds::with_capacity(sorted.len());
    let mut current = sorted[0];
    for seed in &sorted[1..] {
        if lump_key(seed) == lump_key(&current) && seed.q_start <= current.q_end() {
            if seed.q_end() > current.q_end() {
                current.len += seed.q_end() - current.q_end();
            }
        } else {
            out.push(current);
            current = *seed;
        }
    }
    out.push(current);
    out
}
