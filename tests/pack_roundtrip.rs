// Round-trip tests for the packed reference store: append, serialize,
// reload, extract.

use svalign::core::nucseq::NucSeq;
use svalign::error::SvalignError;
use svalign::index::pack::Pack;

fn seq(name: &str, bases: &str) -> NucSeq {
    NucSeq::from_ascii(name, bases.as_bytes()).unwrap()
}

#[test]
fn two_contig_pack_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("toy");

    let mut pack = Pack::new();
    pack.append("A", "", &seq("A", "ACGTACGT"));
    pack.append("B", "", &seq("B", "GGNNCCAA"));
    pack.store(&prefix).unwrap();

    let loaded = Pack::load(&prefix).unwrap();
    assert_eq!(loaded.forward_len(), 16);
    assert_eq!(loaded.num_contigs(), 2);

    let contigs = loaded.contigs();
    assert_eq!(contigs[0].name, "A");
    assert_eq!((contigs[0].start, contigs[0].length, contigs[0].hole_count), (0, 8, 0));
    assert_eq!(contigs[1].name, "B");
    assert_eq!((contigs[1].start, contigs[1].length, contigs[1].hole_count), (8, 8, 1));

    let holes = loaded.holes();
    assert_eq!(holes.len(), 1);
    assert_eq!((holes[0].offset, holes[0].length, holes[0].character), (10, 2, b'N'));

    // forward strand with N reinstatement
    assert_eq!(
        loaded.extract_with_n(0, 16).unwrap().to_string(),
        "ACGTACGTGGNNCCAA"
    );
    // reverse strand is the reverse complement
    assert_eq!(
        loaded.extract_with_n(16, 32).unwrap().to_string(),
        "TTGGNNCCACGTACGT"
    );
}

#[test]
fn packed_bits_survive_the_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("bits");

    let mut pack = Pack::new();
    pack.append("A", "", &seq("A", "ACGTACGTACGTA")); // 13 bases, not a multiple of 4
    pack.store(&prefix).unwrap();
    let loaded = Pack::load(&prefix).unwrap();
    for pos in 0..13 {
        assert_eq!(loaded.base_forward(pos), pack.base_forward(pos));
    }
    // hole-free raw extraction equals the original bases
    assert_eq!(loaded.extract(0, 13).unwrap().to_string(), "ACGTACGTACGTA");
}

#[test]
fn multiple_of_four_gets_the_extra_zero_byte() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("pad");

    let mut pack = Pack::new();
    pack.append("A", "", &seq("A", "ACGTACGT"));
    pack.store(&prefix).unwrap();

    let bytes = std::fs::read(dir.path().join("pad.pac")).unwrap();
    // 2 payload bytes + injected zero + checksum byte
    assert_eq!(bytes.len(), 4);
    assert_eq!(bytes[2], 0);
    assert_eq!(bytes[3], 0); // 8 % 4

    assert!(Pack::load(&prefix).is_ok());
}

#[test]
fn tampered_checksum_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("bad");

    let mut pack = Pack::new();
    pack.append("A", "", &seq("A", "ACGTACGTA"));
    pack.store(&prefix).unwrap();

    let pac = dir.path().join("bad.pac");
    let mut bytes = std::fs::read(&pac).unwrap();
    let last = bytes.len() - 1;
    bytes[last] = bytes[last].wrapping_add(1);
    std::fs::write(&pac, &bytes).unwrap();

    assert!(matches!(
        Pack::load(&prefix),
        Err(SvalignError::PackCorrupt { .. })
    ));
}

#[test]
fn missing_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("gone");

    let mut pack = Pack::new();
    pack.append("A", "", &seq("A", "ACGTACGTA"));
    pack.store(&prefix).unwrap();
    std::fs::remove_file(dir.path().join("gone.amb")).unwrap();

    assert!(matches!(
        Pack::load(&prefix),
        Err(SvalignError::PackCorrupt { .. })
    ));
}

#[test]
fn inconsistent_offset_chain_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("chain");

    let mut pack = Pack::new();
    pack.append("A", "", &seq("A", "ACGTACGTA"));
    pack.append("B", "", &seq("B", "CCCC"));
    pack.store(&prefix).unwrap();

    // corrupt the second contig's start offset in the .ann file
    let ann = dir.path().join("chain.ann");
    let text = std::fs::read_to_string(&ann).unwrap();
    let tampered = text.replace("9 4 0", "11 4 0");
    assert_ne!(text, tampered);
    std::fs::write(&ann, tampered).unwrap();

    assert!(matches!(
        Pack::load(&prefix),
        Err(SvalignError::PackCorrupt { .. })
    ));
}

#[test]
fn every_contig_extracts_back_to_its_input() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("contigs");

    let inputs = [
        ("chrA", "ACGTACGTGGCCNNTTAA"),
        ("chrB", "TTTTCCCCGGGGAAAA"),
        ("chrC", "NNACGTNN"),
    ];
    let mut pack = Pack::new();
    for (name, bases) in &inputs {
        pack.append(name, "", &seq(name, bases));
    }
    pack.store(&prefix).unwrap();

    let loaded = Pack::load(&prefix).unwrap();
    let contigs = loaded.contig_sequences().unwrap();
    assert_eq!(contigs.len(), inputs.len());
    for (contig, (name, bases)) in contigs.iter().zip(&inputs) {
        assert_eq!(&contig.name, name);
        assert_eq!(contig.to_string(), *bases);
    }
}

#[test]
fn hole_seed_is_persisted_for_deterministic_hole_bases() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("seeded");

    let mut pack = Pack::with_seed(1234);
    pack.append("A", "", &seq("A", "AANNNNAA"));
    pack.store(&prefix).unwrap();

    let loaded = Pack::load(&prefix).unwrap();
    assert_eq!(loaded.seed(), 1234);
    // the baked-in random hole bases come back bit-identical
    assert_eq!(
        loaded.extract(0, 8).unwrap().codes(),
        pack.extract(0, 8).unwrap().codes()
    );
}
