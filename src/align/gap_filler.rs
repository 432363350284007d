//! Turning a harmonized chain into a finished alignment.
//!
//! The seeds themselves become match runs; the stretches between
//! consecutive seeds are closed with banded dynamic programming, and the
//! query ends before the first and after the last seed are extended
//! semi-globally with free end gaps.

use crate::align::alignment::{Alignment, MatchType};
use crate::align::banded::{banded_align, DpMode, DpParams, DpResult};
use crate::core::nucseq::NucSeq;
use crate::error::Result;
use crate::index::pack::Pack;
use crate::opts::AlignOpts;
use crate::seeds::seed::{Seed, Seeds};

// terminal extensions keep a full traceback matrix; overhangs beyond this
// many bases stay soft-clipped
const MAX_EXTENSION_SPAN: u64 = 1 << 14;

/// Score one finished alignment under the dual-gap model.
fn score_alignment(alignment: &Alignment, params: &DpParams) -> i64 {
    let mut score = 0i64;
    for (op, len) in alignment.ops() {
        match op {
            MatchType::Seed | MatchType::Match => {
                score += *len as i64 * params.match_score as i64
            }
            MatchType::Mismatch => score -= *len as i64 * params.mismatch_penalty as i64,
            MatchType::Insertion | MatchType::Deletion => {
                score -= params.gap_cost(*len) as i64
            }
        }
    }
    score
}

/// Close the gap `[q_from, q_to) x [r_from, r_to)` with banded DP and append
/// the result. A z-dropped or over-budget gap is bridged as an unaligned
/// insertion/deletion pair instead, splitting the alignment in place.
fn fill_gap(
    alignment: &mut Alignment,
    query: &[u8],
    reference: &NucSeq,
    q_gap: u64,
    r_gap: u64,
    opts: &AlignOpts,
    params: &DpParams,
) {
    if q_gap == 0 && r_gap == 0 {
        return;
    }
    if q_gap == 0 {
        alignment.append(MatchType::Deletion, r_gap);
        return;
    }
    if r_gap == 0 {
        alignment.append(MatchType::Insertion, q_gap);
        return;
    }

    let area = q_gap * r_gap;
    let result = if area <= opts.max_gap_area {
        let diff = q_gap.abs_diff(r_gap);
        let band = opts.min_bandwidth_gap_filling + diff;
        banded_align(query, reference.codes(), band, params, DpMode::Global)
    } else if opts.allow_full_nw {
        banded_align(
            query,
            reference.codes(),
            q_gap.max(r_gap),
            params,
            DpMode::Global,
        )
    } else {
        DpResult {
            zdropped: true,
            ..DpResult::default()
        }
    };

    if result.zdropped {
        alignment.append(MatchType::Insertion, q_gap);
        alignment.append(MatchType::Deletion, r_gap);
        return;
    }
    for (op, len) in result.ops {
        alignment.append(op, len);
    }
}

/// Extend leftwards from the first seed to the start of the query.
fn extend_left(
    first: &Seed,
    query: &NucSeq,
    pack: &Pack,
    opts: &AlignOpts,
    params: &DpParams,
) -> Result<(u64, u64, Vec<(MatchType, u64)>)> {
    let q_head = first.q_start.min(MAX_EXTENSION_SPAN);
    if q_head == 0 {
        return Ok((first.q_start, first.r_start, Vec::new()));
    }
    let contig_start = pack.start_of_contig_or_rev(pack.contig_id_or_rev(first.r_start));
    let reach = (q_head + opts.padding).min(first.r_start - contig_start);
    let mut reference = pack.extract(first.r_start - reach, first.r_start)?;

    // extend the reversed sequences rightwards, then mirror the result back
    let head_from = (first.q_start - q_head) as usize;
    let mut query_head: Vec<u8> =
        query.codes()[head_from..first.q_start as usize].to_vec();
    query_head.reverse();
    reference.reverse();
    let result = banded_align(
        &query_head,
        reference.codes(),
        opts.bandwidth_dp_extension,
        params,
        DpMode::Extend,
    );
    let mut ops = result.ops;
    ops.reverse();
    Ok((
        first.q_start - result.q_consumed,
        first.r_start - result.t_consumed,
        ops,
    ))
}

/// Extend rightwards from the last seed to the end of the query.
fn extend_right(
    last: &Seed,
    query: &NucSeq,
    pack: &Pack,
    opts: &AlignOpts,
    params: &DpParams,
) -> Result<Vec<(MatchType, u64)>> {
    let q_tail = (query.len() - last.q_end()).min(MAX_EXTENSION_SPAN);
    if q_tail == 0 {
        return Ok(Vec::new());
    }
    let contig_end = pack.end_of_contig_or_rev(pack.contig_id_or_rev(last.r_end() - 1));
    let reach = (q_tail + opts.padding).min(contig_end - last.r_end());
    let reference = pack.extract(last.r_end(), last.r_end() + reach)?;
    let query_tail =
        &query.codes()[last.q_end() as usize..(last.q_end() + q_tail) as usize];
    let result = banded_align(
        query_tail,
        reference.codes(),
        opts.bandwidth_dp_extension,
        params,
        DpMode::Extend,
    );
    Ok(result.ops)
}

/// Produce one alignment from a harmonized chain. Returns `None` for an
/// empty chain.
pub fn align_chain(
    chain: &Seeds,
    query: &NucSeq,
    pack: &Pack,
    opts: &AlignOpts,
) -> Result<Option<Alignment>> {
    if chain.is_empty() {
        return Ok(None);
    }
    debug_assert!(chain.consistent, "gap filling expects a harmonized chain");
    let params = DpParams::from_opts(opts);

    let first = chain[0];
    let (q_begin, r_begin, left_ops) = extend_left(&first, query, pack, opts, &params)?;

    let mut alignment = Alignment::new(r_begin, q_begin);
    alignment.query_name = query.name.clone();
    alignment.on_forward_strand = first.forward;
    for (op, len) in left_ops {
        alignment.append(op, len);
    }
    alignment.append(MatchType::Seed, first.len);

    let mut prev = first;
    let mut scratch = NucSeq::new();
    for cur in chain.iter().skip(1) {
        // trim away any overlap with the previous seed; the diagonal shift
        // this introduces is bridged as an indel below
        let dq = prev.q_end().saturating_sub(cur.q_start);
        let dr = prev.r_end().saturating_sub(cur.r_start);
        let trim = dq.max(dr);
        if trim >= cur.len {
            continue;
        }
        let mut cur = *cur;
        cur.q_start += trim;
        cur.r_start += trim;
        cur.len -= trim;

        let q_gap = cur.q_start - prev.q_end();
        let r_gap = cur.r_start - prev.r_end();
        if r_gap > 0 {
            pack.extract_into(prev.r_end(), cur.r_start, &mut scratch, false)?;
        } else {
            scratch.clear();
        }
        let query_gap = &query.codes()[prev.q_end() as usize..cur.q_start as usize];
        fill_gap(
            &mut alignment,
            query_gap,
            &scratch,
            q_gap,
            r_gap,
            opts,
            &params,
        );
        alignment.append(MatchType::Seed, cur.len);
        prev = cur;
    }

    for (op, len) in extend_right(&prev, query, pack, opts, &params)? {
        alignment.append(op, len);
    }

    alignment.score = score_alignment(&alignment, &params);
    Ok(Some(alignment))
}
