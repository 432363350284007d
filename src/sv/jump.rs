//! SV jumps: breakpoint candidates between two seeds of one read.

use crate::opts::AlignOpts;
use crate::seeds::seed::Seed;

/// A candidate structural-variant breakpoint: the read jumps from one
/// reference position to another. Seeds here use forward coordinates with a
/// strand flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvJump {
    /// Reference position the read leaves.
    pub from_pos: u64,
    /// Reference position the read continues at.
    pub to_pos: u64,
    pub q_from: u64,
    pub q_to: u64,
    pub from_forward: bool,
    pub to_forward: bool,
    pub read_id: i64,
    /// Sentinel jump at the start or end of the read.
    pub dummy: bool,
    /// Search radius downstream consumers may use around a dummy jump.
    pub max_dist: u64,
}

/// Reference position where the read exits a seed.
fn exit_pos(seed: &Seed) -> u64 {
    if seed.forward {
        seed.end_ref_cons_rev() - 1
    } else {
        seed.start_ref_cons_rev()
    }
}

/// Reference position where the read enters a seed.
fn entry_pos(seed: &Seed) -> u64 {
    if seed.forward {
        seed.start_ref_cons_rev()
    } else {
        seed.end_ref_cons_rev() - 1
    }
}

impl SvJump {
    /// May a jump be recorded between consecutive seeds `last` and `next`?
    /// Inversions (strand changes) are always of interest; on one strand the
    /// reference distance must stay within the recording window. The read
    /// itself may never move backwards.
    pub fn valid_jump(last: &Seed, next: &Seed, opts: &AlignOpts) -> bool {
        if next.q_start < last.q_end() {
            return false;
        }
        if last.forward != next.forward {
            return true;
        }
        exit_pos(last).abs_diff(entry_pos(next)) <= opts.max_sv_distance_recorded
    }

    /// Jump between two real seeds. The breakpoint edge connects where the
    /// read exits `last` with where it enters `next`; `forward_context`
    /// selects from which side the edge is recorded.
    pub fn from_seeds(last: &Seed, next: &Seed, forward_context: bool, read_id: i64) -> SvJump {
        let exit = exit_pos(last);
        let entry = entry_pos(next);
        let (from_pos, to_pos, from_forward, to_forward) = if forward_context {
            (entry, exit, next.forward, last.forward)
        } else {
            (exit, entry, last.forward, next.forward)
        };
        SvJump {
            from_pos,
            to_pos,
            q_from: last.q_end(),
            q_to: next.q_start,
            from_forward,
            to_forward,
            read_id,
            dummy: false,
            max_dist: 0,
        }
    }

    /// Sentinel jump for a read whose start maps nowhere: lands at the first
    /// seed from an unknown origin.
    pub fn dummy_to(next: &Seed, read_id: i64, max_dist: u64) -> SvJump {
        let entry = entry_pos(next);
        SvJump {
            from_pos: entry,
            to_pos: entry,
            q_from: 0,
            q_to: next.q_start,
            from_forward: next.forward,
            to_forward: next.forward,
            read_id,
            dummy: true,
            max_dist,
        }
    }

    /// Sentinel jump for a read whose tail maps nowhere: leaves the last
    /// seed towards an unknown destination.
    pub fn dummy_from(last: &Seed, query_len: u64, read_id: i64, max_dist: u64) -> SvJump {
        let exit = exit_pos(last);
        SvJump {
            from_pos: exit,
            to_pos: exit,
            q_from: last.q_end(),
            q_to: query_len,
            from_forward: last.forward,
            to_forward: last.forward,
            read_id,
            dummy: true,
            max_dist,
        }
    }

    /// Is this an inversion candidate?
    pub fn switches_strand(&self) -> bool {
        self.from_forward != self.to_forward
    }

    /// Reference span of the jump.
    pub fn distance(&self) -> u64 {
        self.from_pos.abs_diff(self.to_pos)
    }

    /// Query bases the jump skips.
    pub fn query_distance(&self) -> u64 {
        self.q_to.saturating_sub(self.q_from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> AlignOpts {
        AlignOpts::default()
    }

    #[test]
    fn deletion_like_jump_is_valid() {
        let a = Seed::new(0, 20, 1000, true);
        let b = Seed::new(20, 20, 5000, true);
        assert!(SvJump::valid_jump(&a, &b, &opts()));
        let jump = SvJump::from_seeds(&a, &b, false, 7);
        assert_eq!(jump.from_pos, 1019);
        assert_eq!(jump.to_pos, 5000);
        assert_eq!(jump.q_from, 20);
        assert_eq!(jump.q_to, 20);
        assert!(!jump.dummy);
        assert_eq!(jump.distance(), 3981);
    }

    #[test]
    fn forward_context_records_the_edge_from_the_far_side() {
        let a = Seed::new(0, 20, 1000, true);
        let b = Seed::new(20, 20, 5000, true);
        let jump = SvJump::from_seeds(&a, &b, true, 7);
        assert_eq!(jump.from_pos, 5000);
        assert_eq!(jump.to_pos, 1019);
    }

    #[test]
    fn overlong_jump_is_invalid() {
        let mut o = opts();
        o.max_sv_distance_recorded = 1000;
        let a = Seed::new(0, 20, 1000, true);
        let b = Seed::new(20, 20, 500_000, true);
        assert!(!SvJump::valid_jump(&a, &b, &o));
    }

    #[test]
    fn inversion_jump_is_always_of_interest() {
        let mut o = opts();
        o.max_sv_distance_recorded = 10;
        let a = Seed::new(0, 20, 1000, true);
        let b = Seed::new(20, 20, 900_000, false);
        assert!(SvJump::valid_jump(&a, &b, &o));
        let jump = SvJump::from_seeds(&a, &b, false, 1);
        assert!(jump.switches_strand());
        // the read enters a reverse seed at its largest forward coordinate
        assert_eq!(jump.to_pos, 900_000);
    }

    #[test]
    fn query_overlap_suppresses_the_jump() {
        let a = Seed::new(0, 30, 1000, true);
        let b = Seed::new(20, 20, 5000, true);
        assert!(!SvJump::valid_jump(&a, &b, &opts()));
    }

    #[test]
    fn dummy_jump_positions() {
        let next = Seed::new(50, 20, 1000, true);
        let jump = SvJump::dummy_to(&next, 3, 200);
        assert!(jump.dummy);
        assert_eq!(jump.q_from, 0);
        assert_eq!(jump.q_to, 50);
        assert_eq!(jump.to_pos, 1000);
        assert_eq!(jump.max_dist, 200);

        let last = Seed::new(400, 20, 2000, true);
        let jump = SvJump::dummy_from(&last, 500, 3, 200);
        assert_eq!(jump.q_from, 420);
        assert_eq!(jump.q_to, 500);
        assert_eq!(jump.from_pos, 2019);
    }
}
