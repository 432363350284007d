//! SV-jump inference via recursive reseeding.
//!
//! Between every pair of consecutive filtered seeds (with sentinels before
//! the first and after the last) a bounded rectangle on the
//! (reference, query) plane is reseeded with a finer seeder. Where new seeds
//! turn up, the recursion descends into the sub-rectangles; where none do,
//! the gap is a breakpoint candidate and SV jumps are emitted.
//!
//! Seeds in this module use forward coordinates with a strand flag; a
//! reverse seed walks leftwards on the reference as the read advances.

use crate::align::alignment::MatchType;
use crate::align::banded::{banded_align, DpMode, DpParams};
use crate::core::cancel::CancelToken;
use crate::core::interval::Rectangle;
use crate::core::nucseq::{complement, NucSeq};
use crate::error::Result;
use crate::index::pack::Pack;
use crate::opts::AlignOpts;
use crate::seeds::ambiguity::{k_for_area, sample_sequence_ambiguity};
use crate::seeds::hash_seeder::hash_map_seeding;
use crate::seeds::lumping::lump_seeds;
use crate::seeds::palindrome::PalindromeFilter;
use crate::seeds::seed::{Seed, Seeds};
use crate::seeds::segment::{
    emit_all_seeds, emit_filtered_seeds, AmbiguityFilterStats, SeedIndex, Segment,
};
use crate::sv::jump::SvJump;

pub struct SvJumpsFromSeeds<'a> {
    opts: &'a AlignOpts,
    pack: &'a Pack,
    params: DpParams,
}

impl<'a> SvJumpsFromSeeds<'a> {
    pub fn new(opts: &'a AlignOpts, pack: &'a Pack) -> Self {
        SvJumpsFromSeeds {
            opts,
            pack,
            params: DpParams::from_opts(opts),
        }
    }

    /// Reseeding rectangle(s) between two seeds, either of which may be the
    /// sentinel (`None`) marking the start or end of the read.
    ///
    /// With both seeds real the single rectangle between them is returned,
    /// unless they point in opposite directions, lie on different contigs or
    /// are further apart than `max_reseed_size`; then the area is covered by
    /// two anchored rectangles, one per seed.
    pub fn rectangles_for_seeds(
        &self,
        last: Option<&Seed>,
        next: Option<&Seed>,
        q_start: u64,
        q_end: u64,
    ) -> (Rectangle, Rectangle) {
        let empty = (Rectangle::empty(), Rectangle::empty());
        if let (Some(l), Some(n)) = (last, next) {
            if n.q_start < l.q_end() {
                return empty;
            }
        }
        if last.is_some_and(|l| l.q_end() >= q_end) {
            return empty;
        }
        if next.is_some_and(|n| n.q_start <= q_start) {
            return empty;
        }

        let half_reseed = (self.opts.max_reseed_size / 2) as i64;
        let pack = self.pack;

        // inclusive left reference bound
        let last_ref: i64 = match last {
            Some(l) => {
                if l.forward {
                    l.end_ref_cons_rev() as i64
                } else {
                    l.start_ref_cons_rev() as i64
                }
            }
            None => {
                let n = next.expect("both sides cannot be sentinels");
                let mut reach =
                    ((n.q_start - q_start) as f64 * self.opts.extra_seeding_area_factor) as i64;
                reach = reach.min(half_reseed);
                if n.forward {
                    let contig_start =
                        pack.start_of_contig(pack.contig_id_for_pos(n.r_start)) as i64;
                    contig_start.max(n.r_start as i64 - reach)
                } else {
                    let contig_end = pack.end_of_contig(pack.contig_id_for_pos(n.r_start)) as i64;
                    contig_end.min(n.r_start as i64 + 1 + reach)
                }
            }
        };

        // exclusive right reference bound
        let next_ref: i64 = match next {
            Some(n) => {
                if n.forward {
                    n.r_start as i64
                } else {
                    n.r_start as i64 + 1
                }
            }
            None => {
                let l = last.expect("both sides cannot be sentinels");
                let mut reach =
                    ((q_end - l.q_end()) as f64 * self.opts.extra_seeding_area_factor) as i64;
                reach = reach.min(half_reseed);
                if l.forward {
                    let anchor = l.end_ref_cons_rev();
                    let contig_end =
                        pack.end_of_contig(pack.contig_id_for_pos(anchor.saturating_sub(1))) as i64;
                    contig_end.min(anchor as i64 + reach)
                } else {
                    let anchor = l.start_ref_cons_rev();
                    let contig_start = pack.start_of_contig(pack.contig_id_for_pos(anchor)) as i64;
                    contig_start.max(anchor as i64 - reach)
                }
            }
        };

        if last_ref == next_ref {
            return empty;
        }

        if let (Some(l), Some(n)) = (last, next) {
            let ref_size = match (l.forward, n.forward) {
                (true, true) => next_ref - last_ref,
                (false, false) => last_ref - next_ref,
                // seeds on different strands always get separate rectangles
                _ => -1,
            };
            let hi = last_ref.max(next_ref);
            let lo = last_ref.min(next_ref);
            let crosses_contig = pack.contig_id_for_pos(lo as u64)
                != pack.contig_id_for_pos((hi - 1).max(0) as u64);
            if ref_size > self.opts.max_reseed_size as i64 || ref_size < 0 || crosses_contig {
                return (
                    self.rectangles_for_seeds(Some(l), None, l.q_end(), n.q_start).0,
                    self.rectangles_for_seeds(None, Some(n), l.q_end(), n.q_start).0,
                );
            }
        }

        let ref_start = last_ref.min(next_ref).max(0) as u64;
        let ref_size = last_ref.abs_diff(next_ref);
        let rect_q_start = last.map_or(q_start, |l| l.q_end());
        let rect_q_end = next.map_or(q_end, |n| n.q_start);
        (
            Rectangle::new(ref_start, rect_q_start, ref_size, rect_q_end - rect_q_start),
            Rectangle::empty(),
        )
    }

    /// Verify reseeded coordinates by direct base comparison; drops any seed
    /// whose fix-up went wrong.
    fn confirm_seeds(&self, seeds: &mut Seeds, query: &NucSeq) {
        let pack = self.pack;
        seeds.as_mut_vec().retain(|seed| {
            (0..seed.len).all(|i| {
                let q = query.get(seed.q_start + i);
                if seed.forward {
                    pack.base_forward(seed.r_start + i) == q
                } else {
                    complement(pack.base_forward(seed.r_start - i)) == q
                }
            })
        });
    }

    /// All statistically relevant seeds inside one rectangle, appended to
    /// `out` in forward coordinates.
    fn compute_seeds_in_rect(
        &self,
        rect: &Rectangle,
        query: &NucSeq,
        out: &mut Seeds,
    ) -> Result<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let ref_fwd = self.pack.extract(rect.x_axis.start, rect.x_axis.end())?;
        let ref_rc = ref_fwd.reverse_complement();
        let width = rect.x_axis.size;

        let sampled = sample_sequence_ambiguity(
            ref_fwd.codes(),
            ref_rc.codes(),
            self.opts.probability_for_random_match,
        );
        let threshold = (width as f64 * (1.0 + self.opts.max_sequence_similarity)) as u64;

        if sampled <= threshold {
            // unique enough for hash seeding
            let k = k_for_area(rect.area(), self.opts.probability_for_random_match);
            if k as u64 > width || k as u64 > rect.y_axis.size {
                return Ok(());
            }
            let query_segment =
                &query.codes()[rect.y_axis.start as usize..rect.y_axis.end() as usize];

            let mut forward = hash_map_seeding(query_segment, ref_fwd.codes(), k);
            for seed in forward.iter_mut() {
                seed.r_start += rect.x_axis.start;
                seed.q_start += rect.y_axis.start;
            }
            let mut reverse = hash_map_seeding(query_segment, ref_rc.codes(), k);
            for seed in reverse.iter_mut() {
                seed.forward = false;
                // undo the window reversal
                seed.r_start = rect.x_axis.end() - seed.r_start - 1;
                seed.q_start += rect.y_axis.start;
            }
            self.confirm_seeds(&mut forward, query);
            self.confirm_seeds(&mut reverse, query);
            out.append(&forward);
            out.append(&reverse);
        } else {
            // repetitive region: the quadratic method is the only reliable one
            // above the matrix budget the gap stays a jump candidate
            if rect.area() > self.opts.max_gap_area * 16 {
                return Ok(());
            }
            let query_segment =
                &query.codes()[rect.y_axis.start as usize..rect.y_axis.end() as usize];
            let diff = rect.y_axis.size.abs_diff(width);
            let band = self.opts.min_bandwidth_gap_filling + diff;

            let fwd = banded_align(
                query_segment,
                ref_fwd.codes(),
                band,
                &self.params,
                DpMode::Global,
            );
            let rev = banded_align(
                query_segment,
                ref_rc.codes(),
                band,
                &self.params,
                DpMode::Global,
            );
            let (result, forward) = if fwd.score >= rev.score {
                (fwd, true)
            } else {
                (rev, false)
            };
            if result.zdropped {
                return Ok(());
            }
            let mut q = 0u64;
            let mut r = 0u64;
            let mut seeds = Seeds::new();
            for (op, len) in &result.ops {
                if matches!(op, MatchType::Match | MatchType::Seed) {
                    let seed = if forward {
                        Seed::new(
                            q + rect.y_axis.start,
                            *len,
                            r + rect.x_axis.start,
                            true,
                        )
                    } else {
                        Seed::new(
                            q + rect.y_axis.start,
                            *len,
                            rect.x_axis.end() - r - 1,
                            false,
                        )
                    };
                    seeds.push(seed);
                }
                if op.consumes_query() {
                    q += len;
                }
                if op.consumes_reference() {
                    r += len;
                }
            }
            self.confirm_seeds(&mut seeds, query);
            out.append(&seeds);
        }
        Ok(())
    }

    /// Reseed both rectangles, lump the k-mers into maximal seeds and strip
    /// palindromic artifacts.
    fn compute_seeds(
        &self,
        rects: &(Rectangle, Rectangle),
        query: &NucSeq,
        palindromes: &mut PalindromeFilter,
    ) -> Result<Seeds> {
        let mut seeds = Seeds::new();
        self.compute_seeds_in_rect(&rects.0, query, &mut seeds)?;
        self.compute_seeds_in_rect(&rects.1, query, &mut seeds)?;
        if seeds.is_empty() {
            return Ok(seeds);
        }
        Ok(palindromes.filter(lump_seeds(seeds)))
    }

    /// The recursion: reseed between `last` and `next`; descend where seeds
    /// were found, emit jumps where none were.
    fn jumps_recursive(
        &self,
        last: Option<&Seed>,
        next: Option<&Seed>,
        query: &NucSeq,
        palindromes: &mut PalindromeFilter,
        out: &mut Vec<SvJump>,
        layer: usize,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        let rects = self.rectangles_for_seeds(last, next, 0, query.len());
        let mut seeds = self.compute_seeds(&rects, query, palindromes)?;
        seeds.sort_by_q_pos();

        if !seeds.is_empty() {
            log::trace!(
                "reseeding layer {}: {} new seeds in {:?}",
                layer,
                seeds.len(),
                rects.0
            );
            let mut current = last;
            for seed in seeds.iter() {
                self.jumps_recursive(current, Some(seed), query, palindromes, out, layer + 1, cancel)?;
                current = Some(seed);
            }
            self.jumps_recursive(current, next, query, palindromes, out, layer + 1, cancel)?;
            // seeds bridge the gap, no jump between last and next
            return Ok(());
        }

        match (last, next) {
            (Some(l), Some(n)) => {
                if SvJump::valid_jump(l, n, self.opts) {
                    out.push(SvJump::from_seeds(l, n, true, query.id));
                    out.push(SvJump::from_seeds(l, n, false, query.id));
                }
            }
            (None, Some(n)) if self.opts.do_dummy_jumps => {
                if n.q_start > self.opts.min_dist_dummy {
                    out.push(SvJump::dummy_to(n, query.id, self.opts.max_dist_dummy));
                }
            }
            (Some(l), None) if self.opts.do_dummy_jumps => {
                if l.q_end() + self.opts.min_dist_dummy <= query.len() {
                    out.push(SvJump::dummy_from(
                        l,
                        query.len(),
                        query.id,
                        self.opts.max_dist_dummy,
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Compute all SV jumps of one read from its segments. Ambiguity-filter
    /// hit counts aggregate into `stats`, which outlives the per-read call.
    pub fn compute_jumps<I: SeedIndex + ?Sized>(
        &self,
        segments: &mut [Segment],
        index: &I,
        query: &NucSeq,
        stats: &AmbiguityFilterStats,
        cancel: &CancelToken,
    ) -> Result<Vec<SvJump>> {
        let mut initial = Seeds::with_capacity(segments.len() * 2);
        if self.opts.use_ambiguity_filter {
            emit_filtered_seeds(
                segments,
                index,
                self.opts.min_seed_size_sv,
                stats,
                &mut initial,
            );
        } else {
            emit_all_seeds(
                segments,
                index,
                self.opts.min_seed_size_sv,
                self.opts.max_ambiguity_sv,
                &mut initial,
            );
        }

        // the jump geometry works on forward coordinates
        let converted: Vec<Seed> = initial
            .iter()
            .map(|s| s.to_forward_coords(self.pack))
            .collect();
        let mut palindromes = PalindromeFilter::new(self.opts.keep_palindromes);
        let mut seeds = palindromes.filter(Seeds::from_vec(converted));
        seeds.sort_by_q_pos();

        let mut out = Vec::new();
        let mut current: Option<&Seed> = None;
        for seed in seeds.iter() {
            self.jumps_recursive(current, Some(seed), query, &mut palindromes, &mut out, 1, cancel)?;
            current = Some(seed);
        }
        self.jumps_recursive(current, None, query, &mut palindromes, &mut out, 1, cancel)?;
        Ok(out)
    }
}
