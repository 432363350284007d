//! Harmonization: turning one strip of consideration into a consistent chain.
//!
//! Three stages: a RANSAC line fit over the seed diagonals throws out gross
//! outliers, two linesweeps over the seed shadows remove geometrically
//! contradicting seeds, and a gap-cost scan cuts the chain where bridging
//! the remaining gaps could never pay for itself.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::chaining::soc::SocPriorityQueue;
use crate::opts::AlignOpts;
use crate::seeds::seed::{Seed, Seeds};

/// One projected shadow of a seed onto a strip border, kept as a
/// (start, size) pair like the geometry primitives.
#[derive(Debug, Clone, Copy)]
struct Shadow {
    start: u64,
    size: u64,
    seed_idx: usize,
}

impl Shadow {
    /// Shadow cast on the left strip border: starts at the seed's query
    /// position, sized `r_end - q_start + query_len`.
    fn left(seed_idx: usize, s: &Seed, query_len: u64) -> Shadow {
        Shadow {
            start: s.q_start,
            size: s.r_end() + query_len - s.q_start,
            seed_idx,
        }
    }

    /// Shadow cast on the right strip border: starts at the seed's
    /// reference position, sized `q_end - r_start + ref_len`.
    fn right(seed_idx: usize, s: &Seed, ref_len: u64) -> Shadow {
        Shadow {
            start: s.r_start,
            size: s.q_end() + ref_len - s.r_start,
            seed_idx,
        }
    }

    #[inline]
    fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// Sweep one set of shadows; marks dominated seeds in `eliminated`.
///
/// Shadows are processed in (start ascending, size descending, seed id)
/// order. A shadow contained in a still-active earlier shadow belongs to a
/// dominated seed.
fn linesweep(shadows: &mut Vec<Shadow>, eliminated: &mut [bool]) {
    shadows.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.size.cmp(&a.size))
            .then(a.seed_idx.cmp(&b.seed_idx))
    });

    let mut active: BTreeSet<(u64, usize)> = BTreeSet::new();
    for shadow in shadows.iter() {
        while let Some(&(end, idx)) = active.first() {
            if end > shadow.start {
                break;
            }
            active.remove(&(end, idx));
        }
        if let Some(&(max_end, _)) = active.last() {
            if max_end >= shadow.end() {
                eliminated[shadow.seed_idx] = true;
                continue;
            }
        }
        active.insert((shadow.end(), shadow.seed_idx));
    }
}

/// Both sweeps; returns the seeds surviving left and right projection.
pub fn apply_linesweeps(seeds: Seeds, query_len: u64, ref_len: u64) -> Seeds {
    if seeds.len() < 2 {
        return seeds;
    }
    let mut eliminated = vec![false; seeds.len()];

    // left border: project along the query axis
    let mut shadows: Vec<Shadow> = seeds
        .iter()
        .enumerate()
        .map(|(i, s)| Shadow::left(i, s, query_len))
        .collect();
    linesweep(&mut shadows, &mut eliminated);

    // right border: project along the reference axis
    shadows = seeds
        .iter()
        .enumerate()
        .filter(|(i, _)| !eliminated[*i])
        .map(|(i, s)| Shadow::right(i, s, ref_len))
        .collect();
    linesweep(&mut shadows, &mut eliminated);

    let mut out = Seeds::with_capacity(seeds.len());
    out.stats = seeds.stats.clone();
    for (i, seed) in seeds.iter().enumerate() {
        if !eliminated[i] {
            out.push(*seed);
        }
    }
    out
}

/// Fit a line through the (query position, diagonal) points by sampled-pair
/// voting and drop the outliers.
fn ransac_filter(seeds: Seeds, query_len: u64, opts: &AlignOpts) -> Seeds {
    if seeds.len() < 5 {
        return seeds;
    }
    let points: Vec<(f64, f64)> = seeds
        .iter()
        .map(|s| (s.q_start as f64, s.diagonal() as f64))
        .collect();
    let tolerance = (opts.min_delta_dist as f64).max(opts.max_delta_dist * query_len as f64);

    // deterministic sampling so identical inputs harmonize identically
    let mut rng = StdRng::seed_from_u64(seeds.len() as u64 ^ (query_len << 16));
    let mut best: Option<(usize, f64, f64)> = None;
    let samples = 64.min(points.len() * (points.len() - 1) / 2);
    for _ in 0..samples {
        let i = rng.gen_range(0..points.len());
        let j = rng.gen_range(0..points.len());
        if i == j || (points[i].0 - points[j].0).abs() < f64::EPSILON {
            continue;
        }
        let slope = (points[j].1 - points[i].1) / (points[j].0 - points[i].0);
        let intercept = points[i].1 - slope * points[i].0;
        let inliers = points
            .iter()
            .filter(|(q, d)| (d - (slope * q + intercept)).abs() <= tolerance)
            .count();
        if best.map_or(true, |(n, _, _)| inliers > n) {
            best = Some((inliers, slope, intercept));
        }
    }

    let Some((_, slope, intercept)) = best else {
        return seeds;
    };
    let mut out = Seeds::with_capacity(seeds.len());
    out.stats = seeds.stats.clone();
    for seed in &seeds {
        let predicted = slope * seed.q_start as f64 + intercept;
        if (seed.diagonal() as f64 - predicted).abs() <= tolerance {
            out.push(*seed);
        }
    }
    out
}

/// Estimated score penalty for bridging the gap between two chained seeds.
fn gap_cost(a: &Seed, b: &Seed, opts: &AlignOpts) -> u64 {
    let q_gap = b.q_start.saturating_sub(a.q_end());
    let r_gap = b.r_start.saturating_sub(a.r_end());
    if opts.optimistic_gap_estimation {
        q_gap.min(r_gap) * opts.match_score as u64
    } else {
        (q_gap + r_gap) * opts.mismatch_penalty as u64
    }
}

/// Cut the chain where the accumulated gap cost would drive the extension
/// score negative; the best-scoring contiguous stretch survives.
fn gap_cost_cut(seeds: Seeds, opts: &AlignOpts) -> Seeds {
    if seeds.len() < 2 {
        return seeds;
    }
    let slice = seeds.as_slice();
    let mut running = slice[0].value() as i64 * opts.match_score as i64;
    let mut cut_start = 0usize;
    let mut best = (running, 0usize, 0usize);
    for i in 1..slice.len() {
        let bridge = gap_cost(&slice[i - 1], &slice[i], opts) as i64;
        running -= bridge;
        if running <= 0 {
            running = 0;
            cut_start = i;
        }
        running += slice[i].value() as i64 * opts.match_score as i64;
        if running > best.0 {
            best = (running, cut_start, i);
        }
    }
    let (_, from, to) = best;
    let mut out = Seeds::with_capacity(to - from + 1);
    out.stats = seeds.stats.clone();
    for seed in &slice[from..=to] {
        out.push(*seed);
    }
    out
}

/// Harmonize one strip into a consistent, strand-uniform, monotone chain.
pub fn harmonize_single(
    mut strip: Seeds,
    query_len: u64,
    ref_len: u64,
    opts: &AlignOpts,
) -> Seeds {
    if strip.is_empty() {
        return strip;
    }
    let main_forward = strip.main_strand_is_forward();
    let mut seeds = strip.extract_strand(main_forward);
    seeds.stats = strip.stats.clone();
    seeds.sort_by_q_pos();

    // the fit runs before the sweeps: a gross outlier casts a shadow wide
    // enough to dominate every genuine seed behind it
    let seeds = ransac_filter(seeds, query_len, opts);
    let mut seeds = apply_linesweeps(seeds, query_len, ref_len);
    seeds.sort_by_q_pos();
    let mut seeds = gap_cost_cut(seeds, opts);

    debug_assert!(seeds
        .as_slice()
        .windows(2)
        .all(|w| w[0].q_start < w[1].q_start));
    seeds.consistent = true;
    seeds
}

/// Harmonize strips from the queue in score order with a score-tolerant
/// stopping rule: give up once the harmonized score stops improving within
/// the lookahead window, or after `max_tries` strips. The cancel token is
/// honored between strips.
pub fn harmonize_all(
    queue: &mut SocPriorityQueue,
    query_len: u64,
    ref_len: u64,
    opts: &AlignOpts,
    cancel: &crate::core::cancel::CancelToken,
) -> Vec<Seeds> {
    let mut out = Vec::new();
    let mut last_harm_score = 0u64;
    let mut equal_score_count = 0usize;

    // absolute floor for short queries, relative beyond the switch length
    let min_score = if query_len < opts.switch_q_len {
        opts.curr_harm_score_min
    } else {
        (opts.curr_harm_score_min_rel * query_len as f64) as u64
    };

    for tries in 0..opts.max_tries {
        if cancel.is_cancelled() {
            break;
        }
        let Some(strip) = queue.pop() else { break };
        let chain = harmonize_single(strip, query_len, ref_len, opts);
        let score = chain.score();

        if score < min_score {
            if tries >= opts.min_tries {
                break;
            }
            continue;
        }

        if tries >= opts.min_tries {
            // tolerance is relative for short queries, absolute beyond the
            // switch length
            let (dropped, equal) = if query_len < opts.switch_q_len {
                let tol = last_harm_score as f64 * opts.score_diff_tolerance;
                (
                    (score as f64) < last_harm_score as f64 * (1.0 - opts.score_tolerance),
                    (score as f64 - last_harm_score as f64).abs() <= tol,
                )
            } else {
                let tol = (opts.score_diff_tolerance * opts.switch_q_len as f64) as i64;
                let diff = score as i64 - last_harm_score as i64;
                (
                    (score as f64) < last_harm_score as f64 * (1.0 - opts.score_tolerance),
                    diff.abs() <= tol,
                )
            };
            if dropped {
                break;
            }
            if equal {
                equal_score_count += 1;
                if equal_score_count >= opts.max_equal_score_lookahead {
                    break;
                }
            } else {
                equal_score_count = 0;
            }
        }
        last_harm_score = last_harm_score.max(score);
        out.push(chain);
    }
    out
}
