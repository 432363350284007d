// Boundary behavior of pack extraction around the forward/reverse seam.

use svalign::core::nucseq::NucSeq;
use svalign::error::SvalignError;
use svalign::index::pack::Pack;

fn thousand_base_pack() -> Pack {
    let mut bases = String::with_capacity(1000);
    let mut state = 88172645463325252u64;
    for _ in 0..1000 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        bases.push(['A', 'C', 'G', 'T'][(state % 4) as usize]);
    }
    let mut pack = Pack::new();
    pack.append("chr", "", &NucSeq::from_ascii("chr", bases.as_bytes()).unwrap());
    pack
}

#[test]
fn extraction_across_the_seam_is_rejected() {
    let pack = thousand_base_pack();
    assert_eq!(pack.forward_len(), 1000);
    let err = pack.extract(990, 1010).unwrap_err();
    assert!(matches!(err, SvalignError::BridgingExtraction { .. }));
}

#[test]
fn clipping_makes_the_request_extractable() {
    let pack = thousand_base_pack();
    assert!(pack.bridging_subsection(990, 20));
    let (begin, size) = pack.unbridge_subsection(990, 20);
    assert!(!pack.bridging_subsection(begin, size));
    assert!(pack.extract(begin, begin + size).is_ok());
}

#[test]
fn both_sides_of_the_seam_extract_fine() {
    let pack = thousand_base_pack();
    let fwd = pack.extract(990, 1000).unwrap();
    let rev = pack.extract(1000, 1010).unwrap();
    // the first reverse bases mirror the last forward ones
    let rc = fwd.reverse_complement();
    assert_eq!(rev.codes(), rc.codes());
}

#[test]
fn out_of_range_is_distinct_from_bridging() {
    let pack = thousand_base_pack();
    assert!(matches!(
        pack.extract(1990, 2010),
        Err(SvalignError::OutOfRange { .. })
    ));
}
