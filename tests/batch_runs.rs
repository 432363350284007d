// File-level batch runs: FASTA in, SAM / jump table out.

use std::io::Write as _;
use std::sync::Arc;

use svalign::core::nucseq::NucSeq;
use svalign::index::hash_index::HashSeedIndex;
use svalign::index::pack::Pack;
use svalign::io::sam::SamWriter;
use svalign::io::sv_table::SvTableWriter;
use svalign::opts::AlignOpts;
use svalign::pipeline::Aligner;

fn random_bases(len: usize, mut state: u64) -> String {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.push(['A', 'C', 'G', 'T'][(state % 4) as usize]);
    }
    out
}

fn aligner_for(reference: &str) -> Aligner {
    let mut pack = Pack::new();
    pack.append(
        "chr1",
        "",
        &NucSeq::from_ascii("chr1", reference.as_bytes()).unwrap(),
    );
    let pack = Arc::new(pack);
    let mut opts = AlignOpts::default();
    opts.seed_k = 16;
    opts.min_seed_size_sv = 16;
    opts.batch_size = 2; // force several batches
    let index = HashSeedIndex::build(&pack, opts.seed_k).unwrap();
    Aligner::new(pack, Arc::new(index), opts)
}

#[test]
fn fasta_to_sam_run() {
    let reference = random_bases(3000, 0xfeed);
    let aligner = aligner_for(&reference);

    let mut fasta = tempfile::Builder::new().suffix(".fa").tempfile().unwrap();
    let windows = [(0, 200), (500, 700), (1000, 1200), (1500, 1700), (2000, 2200)];
    for (i, (from, to)) in windows.iter().enumerate() {
        writeln!(fasta, ">read{}\n{}", i, &reference[*from..*to]).unwrap();
    }
    writeln!(fasta, ">junk\n{}", "A".repeat(150)).unwrap();
    fasta.flush().unwrap();

    let mut sam = SamWriter::new(Vec::new());
    sam.write_header(&aligner.pack, "svalign test").unwrap();
    let (aligned, total) = aligner.run_alignment(fasta.path(), &mut sam).unwrap();
    assert_eq!(total, 6);
    assert_eq!(aligned, 5);

    let text = String::from_utf8(sam.into_inner().unwrap()).unwrap();
    assert!(text.starts_with("@HD"));
    assert!(text.contains("@SQ\tSN:chr1\tLN:3000"));
    let body: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with('@'))
        .collect();
    assert_eq!(body.len(), 6);
    // the junk read is flagged unmapped
    let junk = body.iter().find(|l| l.starts_with("junk")).unwrap();
    assert_eq!(junk.split('\t').nth(1), Some("4"));
    // an aligned read reports a 1-based position and a full-match CIGAR
    let read0 = body.iter().find(|l| l.starts_with("read0")).unwrap();
    let fields: Vec<&str> = read0.split('\t').collect();
    assert_eq!(fields[3], "1");
    assert_eq!(fields[5], "200M");
}

#[test]
fn fasta_to_jump_table_run() {
    let reference = random_bases(5000, 0xbead);
    let aligner = aligner_for(&reference);

    // one read with a 1000-base deletion, one clean read
    let mut fasta = tempfile::Builder::new().suffix(".fa").tempfile().unwrap();
    let mut sv_read = reference[500..700].to_string();
    sv_read.push_str(&reference[1700..1900]);
    writeln!(fasta, ">sv_read\n{}", sv_read).unwrap();
    writeln!(fasta, ">clean\n{}", &reference[3000..3200]).unwrap();
    fasta.flush().unwrap();

    let mut table = SvTableWriter::new(Vec::new());
    let jumps = aligner.run_sv(fasta.path(), &mut table).unwrap();
    assert!(jumps >= 2);

    let text = String::from_utf8(table.into_inner().unwrap()).unwrap();
    assert!(text.starts_with("#read_id"));
    assert!(text.lines().any(|l| l.contains("sv_read")));
    // the clean read bridges nothing, so it contributes no jump rows
    assert!(!text.lines().any(|l| l.contains("clean")));
}
