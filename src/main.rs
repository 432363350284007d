use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use svalign::error::SvalignError;
use svalign::index::hash_index::HashSeedIndex;
use svalign::index::pack::Pack;
use svalign::io::readers::SeqReader;
use svalign::io::sam::SamWriter;
use svalign::io::sv_table::SvTableWriter;
use svalign::opts::{AlignOpts, PairedTailPolicy};
use svalign::pipeline::Aligner;

#[derive(Parser)]
#[command(name = "svalign")]
#[command(about = "Seed-driven long-read aligner with SV-jump inference", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity: 1=error, 2=warning, 3=message, 4+=debugging
    #[arg(short = 'v', long, global = true, default_value = "3")]
    verbosity: i32,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a reference FASTA into .pac/.ann/.amb files
    Index {
        /// Input FASTA file
        #[arg(value_name = "REF.FA")]
        fasta: PathBuf,

        /// Prefix for the pack files (default: same as FASTA)
        #[arg(short = 'p', long, value_name = "PREFIX")]
        prefix: Option<PathBuf>,
    },

    /// Align reads against a packed reference
    Align {
        #[command(flatten)]
        common: CommonArgs,

        /// Second file of a read pair
        #[arg(long, value_name = "READS2")]
        paired: Option<PathBuf>,

        /// Truncate to the shorter side when paired files disagree in length
        #[arg(long)]
        truncate_unequal_pairs: bool,

        /// Output SAM file (default: stdout)
        #[arg(short = 'o', long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Compute SV jumps for a set of reads
    Sv {
        #[command(flatten)]
        common: CommonArgs,

        /// Suppress dummy jumps at unaligned read ends
        #[arg(long)]
        no_dummy_jumps: bool,

        /// Output table (default: stdout)
        #[arg(short = 'o', long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Pack prefix written by 'index'
    #[arg(long, value_name = "PREFIX")]
    reference: PathBuf,

    /// Input reads, FASTA or FASTQ, optionally gzipped
    #[arg(long, value_name = "READS")]
    reads: PathBuf,

    /// Match score
    #[arg(long, default_value = "2")]
    match_score: i32,

    /// Mismatch penalty
    #[arg(long, default_value = "4")]
    mismatch: i32,

    /// Gap open / extend penalties of the first gap model
    #[arg(long, default_value = "4")]
    gap_open: i32,
    #[arg(long, default_value = "2")]
    gap_ext: i32,

    /// Gap open / extend penalties of the second gap model
    #[arg(long, default_value = "24")]
    gap_open2: i32,
    #[arg(long, default_value = "1")]
    gap_ext2: i32,

    /// Banded-DP early-termination threshold
    #[arg(long, default_value = "200")]
    z_drop: i32,

    /// Minimal seed length
    #[arg(short = 'k', long, default_value = "18")]
    min_seed_size: u64,

    /// Maximal seed occurrence count
    #[arg(long, default_value = "1")]
    max_ambiguity: u64,

    /// Maximal reference width of a reseeding rectangle
    #[arg(long, default_value = "2000")]
    max_reseed_size: u64,

    /// Minimal score for a reported alignment
    #[arg(long, default_value = "75")]
    min_alignment_score: i64,

    /// Worker threads (default: all cores)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Per-read wall-clock budget in milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,
}

impl CommonArgs {
    fn to_opts(&self) -> AlignOpts {
        let mut opts = AlignOpts::default();
        opts.match_score = self.match_score;
        opts.mismatch_penalty = self.mismatch;
        opts.gap_open = self.gap_open;
        opts.gap_ext = self.gap_ext;
        opts.gap_open2 = self.gap_open2;
        opts.gap_ext2 = self.gap_ext2;
        opts.z_drop = self.z_drop;
        opts.min_seed_size_sv = self.min_seed_size;
        opts.max_ambiguity_sv = self.max_ambiguity;
        opts.max_reseed_size = self.max_reseed_size;
        opts.min_alignment_score = self.min_alignment_score;
        opts.seed_k = (self.min_seed_size as usize).clamp(8, 32);
        opts.read_timeout_ms = self.read_timeout_ms;
        opts.n_threads = self.threads.unwrap_or_else(num_cpus::get);
        opts
    }
}

fn init_logger(verbosity: i32) {
    let level = match verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn build_index(fasta: &PathBuf, prefix: &PathBuf) -> svalign::error::Result<()> {
    log::info!("packing reference {}", fasta.display());
    let mut reader = SeqReader::open(fasta)?;
    let mut pack = Pack::new();
    while let Some(record) = reader.next_record() {
        let record = record?;
        log::info!(
            "  contig {} ({} bp, {} ambiguous)",
            record.seq.name,
            record.seq.len(),
            record.seq.count_ambiguous()
        );
        let name = record.seq.name.clone();
        pack.append(&name, "", &record.seq);
    }
    pack.store(prefix)?;
    log::info!(
        "pack written: {} contigs, {} bp, {} holes",
        pack.num_contigs(),
        pack.forward_len(),
        pack.holes().len()
    );
    Ok(())
}

fn build_aligner(common: &CommonArgs) -> svalign::error::Result<Aligner> {
    let opts = common.to_opts();
    let pack = Arc::new(Pack::load(&common.reference)?);
    log::info!(
        "loaded pack: {} contigs, {} bp forward strand",
        pack.num_contigs(),
        pack.forward_len()
    );
    log::info!("building {}-mer seed index", opts.seed_k);
    let index = HashSeedIndex::build(&pack, opts.seed_k)?;

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.n_threads)
        .build_global()
    {
        log::warn!("thread pool already configured: {}", e);
    }
    log::info!("using {} threads", rayon::current_num_threads());

    Ok(Aligner::new(pack, Arc::new(index), opts))
}

fn run() -> Result<(), SvalignError> {
    let cli = Cli::parse();
    init_logger(cli.verbosity);

    match cli.command {
        Commands::Index { fasta, prefix } => {
            let prefix = prefix.unwrap_or_else(|| fasta.clone());
            build_index(&fasta, &prefix)
        }
        Commands::Align {
            common,
            paired,
            truncate_unequal_pairs,
            out,
        } => {
            let mut aligner = build_aligner(&common)?;
            if truncate_unequal_pairs {
                aligner.opts.paired_tail_policy = PairedTailPolicy::TruncateToShorter;
            }
            let command_line = std::env::args().collect::<Vec<_>>().join(" ");

            let write = |sink: Box<dyn std::io::Write>| -> Result<(u64, u64), SvalignError> {
                let mut sam = SamWriter::new(sink);
                sam.write_header(&aligner.pack, &command_line)?;
                match &paired {
                    Some(second) => {
                        aligner.run_alignment_paired(&common.reads, second, &mut sam)
                    }
                    None => aligner.run_alignment(&common.reads, &mut sam),
                }
            };
            let (aligned, total) = match out {
                Some(path) => write(Box::new(File::create(path)?))?,
                None => write(Box::new(std::io::stdout().lock()))?,
            };
            log::info!("aligned {} of {} reads", aligned, total);
            Ok(())
        }
        Commands::Sv {
            common,
            no_dummy_jumps,
            out,
        } => {
            let mut aligner = build_aligner(&common)?;
            aligner.opts.do_dummy_jumps = !no_dummy_jumps;

            let write = |sink: Box<dyn std::io::Write>| -> Result<u64, SvalignError> {
                let mut table = SvTableWriter::new(sink);
                aligner.run_sv(&common.reads, &mut table)
            };
            let jumps = match out {
                Some(path) => write(Box::new(File::create(path)?))?,
                None => write(Box::new(std::io::stdout().lock()))?,
            };
            log::info!("recorded {} SV jumps", jumps);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
