//! Alignment and SV-calling options.

/// How to treat paired read files with unequal record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairedTailPolicy {
    /// Mismatched counts abort the run.
    Fatal,
    /// The longer file is truncated to the shorter one, with a warning.
    TruncateToShorter,
}

/// All tunables of the core, one plain struct with canonical defaults.
#[derive(Debug, Clone)]
pub struct AlignOpts {
    // Scoring (affine dual-gap model)
    pub match_score: i32,     // score for a base match
    pub mismatch_penalty: i32, // penalty for a mismatch (positive)
    pub gap_open: i32,        // first gap model: open
    pub gap_ext: i32,         // first gap model: extend
    pub gap_open2: i32,       // second gap model: open
    pub gap_ext2: i32,        // second gap model: extend

    // Dynamic programming
    pub z_drop: i32,                  // banded DP early termination
    pub min_bandwidth_gap_filling: u64, // minimal band when filling between seeds
    pub bandwidth_dp_extension: u64,  // band for terminal extensions
    pub padding: u64,                 // extra reference bases around terminal extensions
    pub max_gap_area: u64,            // above this, banded DP is not attempted

    /// Permit a full (unbanded) Needleman-Wunsch when a gap exceeds
    /// `max_gap_area`; when false the alignment is split instead.
    pub allow_full_nw: bool,

    // Seeding and reseeding
    pub min_seed_size_sv: u64, // minimal segment length emitted as seeds
    pub max_ambiguity_sv: u64, // maximal suffix-array interval size emitted
    pub max_reseed_size: u64,  // maximal reference width of a reseeding rectangle
    pub seed_k: usize,         // k-mer size of the built-in hash seed source

    // SV dummy jumps
    pub do_dummy_jumps: bool,
    pub min_dist_dummy: u64,
    pub max_dist_dummy: u64,
    pub max_sv_distance_recorded: u64, // reference distance cap for a valid jump

    // Reseeding statistics model
    pub probability_for_random_match: f64,
    pub max_sequence_similarity: f64,
    pub extra_seeding_area_factor: f64,
    /// Keep seeds flagged as palindromic instead of dropping them.
    pub keep_palindromes: bool,
    /// Use the delta-based ambiguity filter instead of emitting every
    /// occurrence of ambiguous segments.
    pub use_ambiguity_filter: bool,

    // Harmonization
    pub optimistic_gap_estimation: bool,
    pub min_query_coverage: f64,
    pub score_tolerance: f64,
    pub min_tries: usize,
    pub max_tries: usize,
    pub max_equal_score_lookahead: usize,
    pub score_diff_tolerance: f64,
    pub switch_q_len: u64,
    pub curr_harm_score_min: u64,
    pub curr_harm_score_min_rel: f64,
    pub max_delta_dist: f64, // RANSAC outlier cutoff, relative to query length
    pub min_delta_dist: u64, // RANSAC outlier cutoff, absolute floor
    pub soc_width: u64,      // strip width; 0 means query length

    // Reporting
    pub report_n_best: usize,
    pub min_alignment_score: i64,
    pub max_overlap_supplementary: f64,
    pub max_supplementary_per_prim: usize,

    // Process
    pub n_threads: usize,
    pub batch_size: usize,
    pub paired_tail_policy: PairedTailPolicy,
    /// Optional per-read wall-clock budget in milliseconds.
    pub read_timeout_ms: Option<u64>,
}

impl Default for AlignOpts {
    fn default() -> Self {
        AlignOpts {
            match_score: 2,
            mismatch_penalty: 4,
            gap_open: 4,
            gap_ext: 2,
            gap_open2: 24,
            gap_ext2: 1,

            z_drop: 200,
            min_bandwidth_gap_filling: 20,
            bandwidth_dp_extension: 512,
            padding: 500,
            max_gap_area: 10_000,
            allow_full_nw: false,

            min_seed_size_sv: 18,
            max_ambiguity_sv: 1,
            max_reseed_size: 2_000,
            seed_k: 18,

            do_dummy_jumps: true,
            min_dist_dummy: 50,
            max_dist_dummy: 200,
            max_sv_distance_recorded: 1_000_000,

            probability_for_random_match: 0.01,
            max_sequence_similarity: 0.2,
            extra_seeding_area_factor: 1.5,
            keep_palindromes: false,
            use_ambiguity_filter: false,

            optimistic_gap_estimation: true,
            min_query_coverage: 0.25,
            score_tolerance: 0.1,
            min_tries: 2,
            max_tries: 50,
            max_equal_score_lookahead: 3,
            score_diff_tolerance: 0.0001,
            switch_q_len: 800,
            curr_harm_score_min: 18,
            curr_harm_score_min_rel: 0.002,
            max_delta_dist: 0.1,
            min_delta_dist: 16,
            soc_width: 0,

            report_n_best: 3,
            min_alignment_score: 75,
            max_overlap_supplementary: 0.1,
            max_supplementary_per_prim: 1,

            n_threads: 0,
            batch_size: 512,
            paired_tail_policy: PairedTailPolicy::Fatal,
            read_timeout_ms: None,
        }
    }
}

impl AlignOpts {
    /// Effective strip width for a query of the given length.
    pub fn strip_width(&self, query_len: u64) -> u64 {
        if self.soc_width == 0 {
            query_len
        } else {
            self.soc_width
        }
    }
}
