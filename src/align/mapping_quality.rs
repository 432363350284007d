//! Mapping quality and secondary/supplementary classification.

use crate::align::alignment::Alignment;
use crate::opts::AlignOpts;

/// Rank the alignments of one read, assign mapping qualities and flags, and
/// truncate to the reporting limit.
///
/// The best alignment becomes primary with
/// `mapq = clamp(ln(best / second), 0, 1)`, or 1.0 without a competitor, or
/// NaN when it scored below the reporting threshold. Runner-ups that barely
/// overlap the primary on the query become supplementary parts of a split
/// read; the rest are secondary.
pub fn process_alignments(mut alignments: Vec<Alignment>, opts: &AlignOpts) -> Vec<Alignment> {
    if alignments.is_empty() {
        return alignments;
    }
    alignments.sort_by(|a, b| b.score.cmp(&a.score));
    alignments.truncate(opts.report_n_best.max(1));

    let best_score = alignments[0].score;
    let second_score = alignments.get(1).map(|a| a.score);

    let mapq = if best_score < opts.min_alignment_score {
        f64::NAN
    } else {
        match second_score {
            None => 1.0,
            Some(second) if second <= 0 => 1.0,
            Some(second) => (best_score as f64 / second as f64).ln().clamp(0.0, 1.0),
        }
    };
    alignments[0].mapping_quality = mapq;
    alignments[0].secondary = false;
    alignments[0].supplementary = false;

    let primary = alignments[0].clone();
    let mut supplementary_count = 0usize;
    for alignment in alignments.iter_mut().skip(1) {
        let overlap = alignment.query_overlap(&primary) as f64;
        let shorter = alignment.query_span().min(primary.query_span()).max(1) as f64;
        if overlap / shorter <= opts.max_overlap_supplementary
            && supplementary_count < opts.max_supplementary_per_prim
        {
            alignment.supplementary = true;
            alignment.secondary = false;
            alignment.mapping_quality = mapq;
            supplementary_count += 1;
        } else {
            alignment.secondary = true;
            alignment.supplementary = false;
            alignment.mapping_quality = 0.0;
        }
    }
    alignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::alignment::MatchType;

    fn alignment(q_begin: u64, span: u64, score: i64) -> Alignment {
        let mut a = Alignment::new(1000 + q_begin, q_begin);
        a.append(MatchType::Seed, span);
        a.score = score;
        a
    }

    fn opts() -> AlignOpts {
        AlignOpts::default()
    }

    #[test]
    fn lone_alignment_gets_full_confidence() {
        let out = process_alignments(vec![alignment(0, 100, 200)], &opts());
        assert_eq!(out[0].mapping_quality, 1.0);
        assert!(!out[0].secondary);
    }

    #[test]
    fn close_competitor_shrinks_confidence() {
        let out = process_alignments(
            vec![alignment(0, 100, 200), alignment(0, 100, 190)],
            &opts(),
        );
        let expected = (200f64 / 190f64).ln();
        assert!((out[0].mapping_quality - expected).abs() < 1e-9);
        assert!(out[1].secondary);
        assert_eq!(out[1].mapping_quality, 0.0);
    }

    #[test]
    fn low_scoring_best_gets_nan() {
        let out = process_alignments(vec![alignment(0, 20, 10)], &opts());
        assert!(out[0].mapping_quality.is_nan());
    }

    #[test]
    fn disjoint_runner_up_becomes_supplementary() {
        // the runner-up covers a disjoint part of the query: a split read
        let out = process_alignments(
            vec![alignment(0, 100, 200), alignment(150, 100, 150)],
            &opts(),
        );
        assert!(out[1].supplementary);
        assert!(!out[1].secondary);
    }

    #[test]
    fn supplementary_count_is_capped() {
        let mut opts = opts();
        opts.max_supplementary_per_prim = 1;
        opts.report_n_best = 5;
        let out = process_alignments(
            vec![
                alignment(0, 100, 200),
                alignment(150, 100, 150),
                alignment(300, 100, 140),
            ],
            &opts,
        );
        assert!(out[1].supplementary);
        assert!(out[2].secondary);
    }

    #[test]
    fn report_limit_truncates() {
        let mut opts = opts();
        opts.report_n_best = 2;
        let out = process_alignments(
            vec![
                alignment(0, 100, 200),
                alignment(0, 100, 190),
                alignment(0, 100, 180),
            ],
            &opts,
        );
        assert_eq!(out.len(), 2);
    }
}
