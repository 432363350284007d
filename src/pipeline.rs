//! The per-read pipeline and the batch driver.
//!
//! Each read runs synchronously through seeding, strip collection,
//! harmonization, gap filling and mapping quality (alignment branch) or
//! through the recursive reseeding (SV branch). Reads are dispatched over a
//! rayon pool; the pack and the seed source are shared read-only, output is
//! funneled to a single writer through a channel.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::align::alignment::Alignment;
use crate::align::gap_filler::align_chain;
use crate::align::mapping_quality::process_alignments;
use crate::chaining::harmonization::harmonize_all;
use crate::chaining::soc::collect_strips;
use crate::core::cancel::CancelToken;
use crate::core::nucseq::NucSeq;
use crate::error::{Result, SvalignError};
use crate::index::hash_index::SegmentSource;
use crate::index::pack::Pack;
use crate::io::readers::{PairedSeqReader, SeqReader, SeqRecord};
use crate::io::sam::{MateInfo, SamWriter};
use crate::io::sv_table::SvTableWriter;
use crate::opts::AlignOpts;
use crate::seeds::seed::Seeds;
use crate::seeds::segment::{emit_all_seeds, AmbiguityFilterStats};
use crate::sv::jump::SvJump;
use crate::sv::reseeding::SvJumpsFromSeeds;

pub struct Aligner {
    pub pack: Arc<Pack>,
    pub source: Arc<dyn SegmentSource>,
    pub opts: AlignOpts,
    pub filter_stats: AmbiguityFilterStats,
}

impl Aligner {
    pub fn new(pack: Arc<Pack>, source: Arc<dyn SegmentSource>, opts: AlignOpts) -> Self {
        Aligner {
            pack,
            source,
            opts,
            filter_stats: AmbiguityFilterStats::default(),
        }
    }

    fn read_token(&self) -> CancelToken {
        match self.opts.read_timeout_ms {
            Some(ms) => CancelToken::with_deadline(Instant::now() + Duration::from_millis(ms)),
            None => CancelToken::new(),
        }
    }

    /// Alignment branch for one read.
    pub fn align_read(&self, query: &NucSeq, cancel: &CancelToken) -> Result<Vec<Alignment>> {
        let set = self.source.segments(query);
        let mut seeds = Seeds::with_capacity(set.segments.len() * 2);
        emit_all_seeds(
            &set.segments,
            &set,
            self.opts.min_seed_size_sv,
            self.opts.max_ambiguity_sv,
            &mut seeds,
        );
        cancel.check()?;
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let qlen = query.len();
        let mut queue = collect_strips(seeds, qlen, self.opts.strip_width(qlen));
        let chains = harmonize_all(&mut queue, qlen, self.pack.total_len(), &self.opts, cancel);
        cancel.check()?;

        let mut alignments = Vec::new();
        let min_coverage = (self.opts.min_query_coverage * qlen as f64) as u64;
        for chain in chains {
            cancel.check()?;
            if chain.score() < min_coverage {
                continue;
            }
            if let Some(alignment) = align_chain(&chain, query, &self.pack, &self.opts)? {
                alignments.push(alignment);
            }
        }
        Ok(process_alignments(alignments, &self.opts))
    }

    /// SV branch for one read.
    pub fn sv_jumps_read(&self, query: &NucSeq, cancel: &CancelToken) -> Result<Vec<SvJump>> {
        let mut set = self.source.segments(query);
        let sv = SvJumpsFromSeeds::new(&self.opts, &self.pack);
        let mut segments = std::mem::take(&mut set.segments);
        sv.compute_jumps(&mut segments, &set, query, &self.filter_stats, cancel)
    }

    /// Run one batch through the pool. Cancelled or timed-out reads come
    /// back as empty results and are reported unaligned; malformed ones are
    /// logged and skipped.
    fn process_batch<T, F>(&self, batch: &[SeqRecord], f: F) -> Vec<Vec<T>>
    where
        T: Send,
        F: Fn(&NucSeq, &CancelToken) -> Result<Vec<T>> + Sync,
    {
        batch
            .par_iter()
            .map(|record| {
                let token = self.read_token();
                match f(&record.seq, &token) {
                    Ok(results) => results,
                    Err(SvalignError::Cancelled) => {
                        log::warn!("read {} cancelled, reported unaligned", record.seq.name);
                        Vec::new()
                    }
                    Err(e) => {
                        log::warn!("skipping read {}: {}", record.seq.name, e);
                        Vec::new()
                    }
                }
            })
            .collect()
    }

    /// Feed batches from a dedicated reader thread so decompression and
    /// parsing overlap with alignment.
    fn with_batches<F>(&self, reads: &Path, mut consume: F) -> Result<()>
    where
        F: FnMut(Vec<SeqRecord>) -> Result<()>,
    {
        let mut reader = SeqReader::open(reads)?;
        let batch_size = self.opts.batch_size;
        let (tx, rx) = crossbeam_channel::bounded::<Result<Vec<SeqRecord>>>(4);
        std::thread::scope(|scope| {
            scope.spawn(move || loop {
                match reader.read_batch(batch_size) {
                    Ok(batch) if batch.is_empty() => break,
                    other => {
                        let done = other.is_err();
                        if tx.send(other).is_err() || done {
                            break;
                        }
                    }
                }
            });
            let mut result = Ok(());
            for batch in rx.iter() {
                if let Err(e) = batch.and_then(&mut consume) {
                    result = Err(e);
                    break;
                }
            }
            // unblock the reader before the scope joins it
            drop(rx);
            result
        })
    }

    /// Align all reads of one file into a SAM writer.
    pub fn run_alignment<W: Write>(
        &self,
        reads: &Path,
        sam: &mut SamWriter<W>,
    ) -> Result<(u64, u64)> {
        let mut aligned = 0u64;
        let mut total = 0u64;
        self.with_batches(reads, |batch| {
            let results = self.process_batch(&batch, |query, token| self.align_read(query, token));
            for (record, alignments) in batch.iter().zip(results) {
                total += 1;
                if alignments.is_empty() {
                    sam.write_unmapped(&record.seq, record.qual.as_deref())?;
                } else {
                    aligned += 1;
                    for alignment in &alignments {
                        sam.write_alignment(
                            alignment,
                            &record.seq,
                            record.qual.as_deref(),
                            &self.pack,
                            None,
                        )?;
                    }
                }
            }
            Ok(())
        })?;
        sam.flush()?;
        Ok((aligned, total))
    }

    /// Align paired reads in lock-step; primaries are cross-linked through
    /// their arena indices.
    pub fn run_alignment_paired<W: Write>(
        &self,
        first: &Path,
        second: &Path,
        sam: &mut SamWriter<W>,
    ) -> Result<(u64, u64)> {
        let mut reader = PairedSeqReader::open(first, second, self.opts.paired_tail_policy)?;
        let mut aligned = 0u64;
        let mut total = 0u64;

        loop {
            let mut batch: Vec<(SeqRecord, SeqRecord)> = Vec::with_capacity(self.opts.batch_size);
            while batch.len() < self.opts.batch_size {
                match reader.next_pair() {
                    Some(Ok(pair)) => batch.push(pair),
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }

            let results: Vec<(Vec<Alignment>, Vec<Alignment>)> = batch
                .par_iter()
                .map(|(a, b)| {
                    let token = self.read_token();
                    let first = self.align_read(&a.seq, &token).unwrap_or_default();
                    let second = self.align_read(&b.seq, &token).unwrap_or_default();
                    (first, second)
                })
                .collect();

            for ((rec_a, rec_b), (al_a, al_b)) in batch.iter().zip(results) {
                total += 2;
                self.write_mate(sam, rec_a, &al_a, al_b.first(), true)?;
                self.write_mate(sam, rec_b, &al_b, al_a.first(), false)?;
                aligned += u64::from(!al_a.is_empty()) + u64::from(!al_b.is_empty());
            }
        }
        sam.flush()?;
        Ok((aligned, total))
    }

    fn write_mate<W: Write>(
        &self,
        sam: &mut SamWriter<W>,
        record: &SeqRecord,
        own: &[Alignment],
        mate_primary: Option<&Alignment>,
        first_in_pair: bool,
    ) -> Result<()> {
        if own.is_empty() {
            return sam.write_unmapped(&record.seq, record.qual.as_deref());
        }
        let mate_info = |own_alignment: &Alignment| -> MateInfo {
            match mate_primary {
                None => MateInfo {
                    unmapped: true,
                    first_in_pair,
                    ..MateInfo::default()
                },
                Some(mate) => {
                    let mate_reverse = self.pack.is_reverse(mate.r_begin);
                    let mate_leftmost = if mate_reverse {
                        self.pack.abs_pos(mate.r_end - 1)
                    } else {
                        mate.r_begin
                    };
                    let mate_contig = self.pack.contig_id_for_pos(mate_leftmost);
                    let own_leftmost = if self.pack.is_reverse(own_alignment.r_begin) {
                        self.pack.abs_pos(own_alignment.r_end - 1)
                    } else {
                        own_alignment.r_begin
                    };
                    let own_contig = self.pack.contig_id_for_pos(own_leftmost);
                    let same = mate_contig == own_contig;
                    let tlen = if same {
                        mate_leftmost as i64 - own_leftmost as i64
                    } else {
                        0
                    };
                    MateInfo {
                        ref_name_same: same,
                        ref_name: Some(mate_contig),
                        pos_1based: mate_leftmost - self.pack.start_of_contig(mate_contig) + 1,
                        reverse: mate_reverse,
                        unmapped: false,
                        first_in_pair,
                        tlen,
                    }
                }
            }
        };
        for alignment in own {
            sam.write_alignment(
                alignment,
                &record.seq,
                record.qual.as_deref(),
                &self.pack,
                Some(mate_info(alignment)),
            )?;
        }
        Ok(())
    }

    /// Compute SV jumps for all reads of one file.
    pub fn run_sv<W: Write>(&self, reads: &Path, table: &mut SvTableWriter<W>) -> Result<u64> {
        table.write_header()?;
        let mut total_jumps = 0u64;
        self.with_batches(reads, |batch| {
            let results =
                self.process_batch(&batch, |query, token| self.sv_jumps_read(query, token));
            for (record, jumps) in batch.iter().zip(results) {
                for jump in &jumps {
                    table.write_jump(jump, &record.seq.name, &self.pack)?;
                }
                total_jumps += jumps.len() as u64;
            }
            Ok(())
        })?;
        table.flush()?;
        self.filter_stats.log_summary();
        Ok(total_jumps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::hash_index::HashSeedIndex;

    fn toy_aligner(reference: &str, mut opts: AlignOpts) -> Aligner {
        let mut pack = Pack::new();
        pack.append(
            "chr1",
            "",
            &NucSeq::from_ascii("chr1", reference.as_bytes()).unwrap(),
        );
        let pack = Arc::new(pack);
        opts.seed_k = 16;
        opts.min_seed_size_sv = 16;
        let index = HashSeedIndex::build(&pack, opts.seed_k).unwrap();
        Aligner::new(pack, Arc::new(index), opts)
    }

    fn random_reference(len: usize) -> String {
        // deterministic pseudo-random sequence with enough entropy to avoid
        // spurious seed-length repeats
        let mut state = 0x2545f4914f6cdd1du64;
        let mut out = String::with_capacity(len);
        for _ in 0..len {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            out.push(match state % 4 {
                0 => 'A',
                1 => 'C',
                2 => 'G',
                _ => 'T',
            });
        }
        out
    }

    #[test]
    fn perfect_read_aligns_end_to_end() {
        let reference = random_reference(800);
        let mut opts = AlignOpts::default();
        opts.min_alignment_score = 10;
        let aligner = toy_aligner(&reference, opts);
        let query_str = &reference[100..300];
        let query = NucSeq::from_ascii("q1", query_str.as_bytes()).unwrap();
        let alignments = aligner.align_read(&query, &CancelToken::new()).unwrap();
        assert!(!alignments.is_empty());
        let primary = &alignments[0];
        assert_eq!(primary.r_begin, 100);
        assert_eq!(primary.q_begin, 0);
        assert_eq!(primary.cigar(query.len()), "200M");
        assert_eq!(primary.mapping_quality, 1.0);
    }

    #[test]
    fn deletion_read_produces_jump_candidates() {
        let reference = random_reference(3000);
        let mut opts = AlignOpts::default();
        opts.min_dist_dummy = 1000; // keep dummy jumps out of this test
        let aligner = toy_aligner(&reference, opts);
        // read skips reference bases 400..1400
        let mut query_str = reference[200..400].to_string();
        query_str.push_str(&reference[1400..1600]);
        let query = NucSeq::from_ascii("q1", query_str.as_bytes()).unwrap();
        let jumps = aligner.sv_jumps_read(&query, &CancelToken::new()).unwrap();
        assert!(!jumps.is_empty());
        assert!(jumps.iter().any(|j| !j.dummy
            && j.distance() > 900
            && j.distance() < 1100));
    }

    #[test]
    fn cancelled_read_reports_cancelled() {
        let reference = random_reference(500);
        let aligner = toy_aligner(&reference, AlignOpts::default());
        let query = NucSeq::from_ascii("q1", reference[0..100].as_bytes()).unwrap();
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            aligner.align_read(&query, &token),
            Err(SvalignError::Cancelled)
        ));
    }
}
