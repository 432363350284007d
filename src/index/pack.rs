//! The packed reference store.
//!
//! Only the forward strand is kept, 2 bits per base. The reverse strand is
//! virtual: positions `[forward_len, 2 * forward_len)` address it, and its
//! bases are synthesized as the complement of the forward strand walked
//! backwards. Ambiguous input bases ("holes", typically `N`) cannot live in
//! the 2-bit store; they are recorded in a side table and baked into the
//! packed bits as deterministic pseudo-random nucleotides so that seeding
//! never matches them systematically.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::nucseq::{complement, NucSeq};
use crate::error::{Result, SvalignError};

/// One named sequence inside the pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub comment: String,
    /// Offset of the first base on the forward strand.
    pub start: u64,
    pub length: u64,
    pub hole_count: u32,
}

/// A maximal run of ambiguous bases at a known forward offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hole {
    pub offset: u64,
    pub length: u64,
    pub character: u8,
}

#[derive(Debug)]
pub struct Pack {
    contigs: Vec<Contig>,
    holes: Vec<Hole>,
    packed: Vec<u8>,
    forward_len: u64,
    /// RNG seed used for hole-base materialization; persisted in the `.ann`
    /// header so the packed bits are reproducible across load cycles.
    seed: u32,
    rng: StdRng,
}

impl Default for Pack {
    fn default() -> Self {
        Pack::with_seed(0x5eed)
    }
}

impl Pack {
    pub fn new() -> Self {
        Pack::default()
    }

    pub fn with_seed(seed: u32) -> Self {
        Pack {
            contigs: Vec::new(),
            holes: Vec::new(),
            packed: Vec::new(),
            forward_len: 0,
            seed,
            rng: StdRng::seed_from_u64(seed as u64),
        }
    }

    #[inline]
    pub fn forward_len(&self) -> u64 {
        self.forward_len
    }

    /// First position of the virtual reverse strand.
    #[inline]
    pub fn start_of_reverse_strand(&self) -> u64 {
        self.forward_len
    }

    #[inline]
    pub fn total_len(&self) -> u64 {
        self.forward_len * 2
    }

    #[inline]
    pub fn num_contigs(&self) -> usize {
        self.contigs.len()
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn holes(&self) -> &[Hole] {
        &self.holes
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    // ---- 2-bit store -----------------------------------------------------

    /// Forward-strand base at `pos`. Bases are MSB-first within each byte.
    #[inline]
    pub fn base_forward(&self, pos: u64) -> u8 {
        (self.packed[(pos >> 2) as usize] >> (((!pos) & 3) << 1)) & 3
    }

    #[inline]
    fn set_base_forward(&mut self, pos: u64, code: u8) {
        let byte = (pos >> 2) as usize;
        if self.packed.len() <= byte {
            self.packed.push(0);
        }
        self.packed[byte] |= code << (((!pos) & 3) << 1);
    }

    /// Base at any position of the dual-strand address space.
    #[inline]
    pub fn base(&self, pos: u64) -> u8 {
        if self.is_reverse(pos) {
            complement(self.base_forward(self.abs_pos(pos)))
        } else {
            self.base_forward(pos)
        }
    }

    // ---- addressing ------------------------------------------------------

    #[inline]
    pub fn is_reverse(&self, pos: u64) -> bool {
        pos >= self.forward_len
    }

    /// Forward-strand position corresponding to `pos`.
    #[inline]
    pub fn abs_pos(&self, pos: u64) -> u64 {
        if self.is_reverse(pos) {
            self.total_len() - 1 - pos
        } else {
            pos
        }
    }

    /// Mirror a forward-strand position onto the reverse strand.
    #[inline]
    pub fn pos_to_reverse_strand(&self, pos: u64) -> u64 {
        self.total_len() - 1 - pos
    }

    /// Contig id for an absolute (forward-strand) position, by binary search
    /// over the contig start offsets.
    pub fn contig_id_for_pos(&self, pos: u64) -> usize {
        let abs = self.abs_pos(pos);
        debug_assert!(abs < self.forward_len);
        match self
            .contigs
            .binary_search_by(|c| c.start.cmp(&abs))
        {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }

    /// Contig id in the dual-strand scheme: even ids are forward views,
    /// odd ids the reverse view of contig `id / 2`.
    pub fn contig_id_or_rev(&self, pos: u64) -> i64 {
        if self.is_reverse(pos) {
            self.contig_id_for_pos(self.abs_pos(pos)) as i64 * 2 + 1
        } else {
            self.contig_id_for_pos(pos) as i64 * 2
        }
    }

    pub fn start_of_contig(&self, id: usize) -> u64 {
        self.contigs[id].start
    }

    pub fn end_of_contig(&self, id: usize) -> u64 {
        self.contigs[id].start + self.contigs[id].length
    }

    pub fn length_of_contig(&self, id: usize) -> u64 {
        self.contigs[id].length
    }

    /// Start of a contig in the dual-strand scheme (inclusive).
    pub fn start_of_contig_or_rev(&self, id: i64) -> u64 {
        if id % 2 == 1 {
            self.pos_to_reverse_strand(self.end_of_contig((id / 2) as usize)) + 1
        } else {
            self.start_of_contig((id / 2) as usize)
        }
    }

    /// End of a contig in the dual-strand scheme (exclusive).
    pub fn end_of_contig_or_rev(&self, id: i64) -> u64 {
        if id % 2 == 1 {
            self.pos_to_reverse_strand(self.start_of_contig((id / 2) as usize)) + 1
        } else {
            self.end_of_contig((id / 2) as usize)
        }
    }

    pub fn name_of_contig(&self, id: usize) -> &str {
        &self.contigs[id].name
    }

    pub fn contig_id_for_name(&self, name: &str) -> Option<usize> {
        self.contigs.iter().position(|c| c.name == name)
    }

    /// Position relative to the start of the containing contig.
    pub fn pos_in_contig(&self, pos: u64) -> u64 {
        let abs = self.abs_pos(pos);
        abs - self.start_of_contig(self.contig_id_for_pos(pos))
    }

    // ---- bridging --------------------------------------------------------

    /// Does `[begin, begin + size)` cross the forward/reverse seam or a
    /// contig border?
    pub fn bridging_subsection(&self, begin: u64, size: u64) -> bool {
        if size == 0 {
            return false;
        }
        if begin + size > self.total_len() {
            return true;
        }
        let last = begin + size - 1;
        self.is_reverse(begin) != self.is_reverse(last)
            || self.contig_id_or_rev(begin) != self.contig_id_or_rev(last)
    }

    /// Are `a` and `b` on different strands or different contigs?
    pub fn bridging_positions(&self, a: u64, b: u64) -> bool {
        self.is_reverse(a) != self.is_reverse(b)
            || self.contig_id_or_rev(a) != self.contig_id_or_rev(b)
    }

    pub fn on_contig_border(&self, pos: u64) -> bool {
        pos == 0 || self.bridging_positions(pos - 1, pos)
    }

    /// Shrink a bridging `[begin, begin + size)` to the larger half that
    /// stays within one contig view.
    pub fn unbridge_subsection(&self, begin: u64, size: u64) -> (u64, u64) {
        debug_assert!(self.bridging_subsection(begin, size));
        let id = self.contig_id_or_rev(begin);
        let split = self.end_of_contig_or_rev(id);
        debug_assert!(begin <= split);
        if begin + size / 2 > split {
            (split, size - (split - begin))
        } else {
            (begin, split - begin)
        }
    }

    // ---- holes -----------------------------------------------------------

    /// Fraction of `[start, end)` (forward coordinates) covered by holes.
    pub fn hole_coverage(&self, start: u64, end: u64) -> f64 {
        debug_assert!(start < end);
        let mut covered = 0u64;
        for h in &self.holes {
            if h.offset <= end && h.offset + h.length > start {
                covered += h.offset.saturating_add(h.length).min(end) - h.offset.max(start);
            }
        }
        covered as f64 / (end - start) as f64
    }

    pub fn is_hole(&self, pos: u64) -> bool {
        let i = self.holes.partition_point(|h| h.offset + h.length <= pos);
        i < self.holes.len() && self.holes[i].offset <= pos
    }

    // ---- construction ----------------------------------------------------

    /// Append one contig. Ambiguous bases are recorded as holes and replaced
    /// in the 2-bit store by pseudo-random nucleotides from the pack's RNG.
    pub fn append(&mut self, name: &str, comment: &str, seq: &NucSeq) {
        if seq.is_empty() {
            log::warn!("skipping empty sequence {}", name);
            return;
        }
        let start = self.forward_len;
        let mut contig = Contig {
            name: name.to_string(),
            comment: if comment.is_empty() {
                "none".to_string()
            } else {
                comment.to_string()
            },
            start,
            length: seq.len(),
            hole_count: 0,
        };
        let mut prev_was_hole = false;
        for i in 0..seq.len() {
            let mut code = seq.get(i);
            if code >= 4 {
                if prev_was_hole {
                    self.holes.last_mut().unwrap().length += 1;
                } else {
                    self.holes.push(Hole {
                        offset: self.forward_len,
                        length: 1,
                        character: b'N',
                    });
                    contig.hole_count += 1;
                }
                prev_was_hole = true;
                code = self.rng.gen_range(0..4u8);
            } else {
                prev_was_hole = false;
            }
            let pos = self.forward_len;
            self.set_base_forward(pos, code);
            self.forward_len += 1;
        }
        self.contigs.push(contig);
    }

    // ---- extraction ------------------------------------------------------

    fn range_check(&self, begin: u64, end: u64) -> Result<()> {
        if begin > end {
            return Err(SvalignError::OutOfRange {
                pos: begin,
                size: self.total_len(),
            });
        }
        if end > self.total_len() {
            return Err(SvalignError::OutOfRange {
                pos: end,
                size: self.total_len(),
            });
        }
        Ok(())
    }

    /// Extract `[begin, end)` into `out`. Hole bases stay as the baked-in
    /// pseudo-random nucleotides. Fails with `BridgingExtraction` when the
    /// request crosses the forward/reverse seam.
    pub fn extract_into(&self, begin: u64, end: u64, out: &mut NucSeq, append: bool) -> Result<()> {
        if !append {
            out.clear();
        }
        if begin == end {
            return Ok(());
        }
        self.range_check(begin, end)?;
        if self.is_reverse(begin) != self.is_reverse(end - 1) {
            return Err(SvalignError::BridgingExtraction { begin, end });
        }
        if !self.is_reverse(begin) {
            for pos in begin..end {
                out.push(self.base_forward(pos));
            }
        } else {
            let abs_begin = self.abs_pos(begin);
            let abs_end = self.abs_pos(end - 1);
            for pos in (abs_end..=abs_begin).rev() {
                out.push(complement(self.base_forward(pos)));
            }
        }
        Ok(())
    }

    /// Like `extract_into`, but hole bases are materialized as code 4.
    pub fn extract_with_n_into(
        &self,
        begin: u64,
        end: u64,
        out: &mut NucSeq,
        append: bool,
    ) -> Result<()> {
        if !append {
            out.clear();
        }
        if begin == end {
            return Ok(());
        }
        self.range_check(begin, end)?;
        if self.is_reverse(begin) != self.is_reverse(end - 1) {
            return Err(SvalignError::BridgingExtraction { begin, end });
        }
        if !self.is_reverse(begin) {
            let mut hi = self.holes.partition_point(|h| h.offset + h.length <= begin);
            for pos in begin..end {
                while hi < self.holes.len() && self.holes[hi].offset + self.holes[hi].length <= pos {
                    hi += 1;
                }
                if hi < self.holes.len() && self.holes[hi].offset <= pos {
                    out.push(4);
                } else {
                    out.push(self.base_forward(pos));
                }
            }
        } else {
            let abs_begin = self.abs_pos(begin);
            let abs_end = self.abs_pos(end - 1);
            // walk holes backwards alongside the descending positions
            let mut hi = self.holes.partition_point(|h| h.offset <= abs_begin);
            for pos in (abs_end..=abs_begin).rev() {
                while hi > 0 && self.holes[hi - 1].offset > pos {
                    hi -= 1;
                }
                if hi > 0 && self.holes[hi - 1].offset + self.holes[hi - 1].length > pos {
                    out.push(4);
                } else {
                    out.push(complement(self.base_forward(pos)));
                }
            }
        }
        Ok(())
    }

    pub fn extract(&self, begin: u64, end: u64) -> Result<NucSeq> {
        let mut out = NucSeq::with_capacity((end.saturating_sub(begin)) as usize);
        self.extract_into(begin, end, &mut out, false)?;
        Ok(out)
    }

    pub fn extract_with_n(&self, begin: u64, end: u64) -> Result<NucSeq> {
        let mut out = NucSeq::with_capacity((end.saturating_sub(begin)) as usize);
        self.extract_with_n_into(begin, end, &mut out, false)?;
        Ok(out)
    }

    /// Extract from the start of the containing contig view up to `pos`.
    /// Returns the start position used.
    pub fn extract_until(&self, pos: u64, out: &mut NucSeq, append: bool) -> Result<u64> {
        let start = self.start_of_contig_or_rev(self.contig_id_or_rev(pos));
        self.extract_with_n_into(start, pos, out, append)?;
        Ok(start)
    }

    /// Extract from `pos` to the end of the containing contig view.
    /// Returns the end position used.
    pub fn extract_from(&self, pos: u64, out: &mut NucSeq, append: bool) -> Result<u64> {
        let end = self.end_of_contig_or_rev(self.contig_id_or_rev(pos));
        self.extract_with_n_into(pos, end, out, append)?;
        Ok(end)
    }

    /// Directional context extraction used by breakpoint evaluation.
    pub fn extract_context(
        &self,
        pos: u64,
        out: &mut NucSeq,
        append: bool,
        forward_context: bool,
    ) -> Result<u64> {
        if forward_context {
            self.extract_from(pos, out, append)
        } else {
            self.extract_until(pos, out, append)
        }
    }

    /// Whole contig (dual-strand id scheme), holes as N.
    pub fn extract_contig(&self, id_or_rev: i64) -> Result<NucSeq> {
        self.extract_with_n(
            self.start_of_contig_or_rev(id_or_rev),
            self.end_of_contig_or_rev(id_or_rev),
        )
    }

    pub fn contig_names(&self) -> Vec<String> {
        self.contigs.iter().map(|c| c.name.clone()).collect()
    }

    pub fn contig_lengths(&self) -> Vec<u64> {
        self.contigs.iter().map(|c| c.length).collect()
    }

    pub fn contig_starts(&self) -> Vec<u64> {
        self.contigs.iter().map(|c| c.start).collect()
    }

    /// Materialize every contig as a named sequence, holes as N.
    pub fn contig_sequences(&self) -> Result<Vec<NucSeq>> {
        let mut out = Vec::with_capacity(self.contigs.len());
        for id in 0..self.contigs.len() {
            let mut seq = self.extract_contig(id as i64 * 2)?;
            seq.name = self.contigs[id].name.clone();
            out.push(seq);
        }
        Ok(out)
    }

    // ---- serialization ---------------------------------------------------

    fn pac_path(prefix: &Path) -> PathBuf {
        with_suffix(prefix, "pac")
    }
    fn ann_path(prefix: &Path) -> PathBuf {
        with_suffix(prefix, "ann")
    }
    fn amb_path(prefix: &Path) -> PathBuf {
        with_suffix(prefix, "amb")
    }

    pub fn exists_on_disk(prefix: &Path) -> bool {
        Self::pac_path(prefix).exists()
            && Self::ann_path(prefix).exists()
            && Self::amb_path(prefix).exists()
    }

    /// Write `{prefix}.pac`, `{prefix}.ann` and `{prefix}.amb`.
    pub fn store(&self, prefix: &Path) -> Result<()> {
        // .pac: raw packed bytes, an extra zero byte when forward_len is a
        // multiple of 4, then a final byte holding forward_len % 4. The file
        // length is thereby always ceil(forward_len / 4) + 1 (+1).
        let mut pac = BufWriter::new(File::create(Self::pac_path(prefix))?);
        pac.write_all(&self.packed)?;
        if self.forward_len % 4 == 0 {
            pac.write_all(&[0u8])?;
        }
        pac.write_all(&[(self.forward_len % 4) as u8])?;
        pac.flush()?;

        let mut ann = BufWriter::new(File::create(Self::ann_path(prefix))?);
        writeln!(ann, "{} {} {}", self.forward_len, self.contigs.len(), self.seed)?;
        for c in &self.contigs {
            if c.comment.is_empty() || c.comment == "none" {
                writeln!(ann, "0 {}", c.name)?;
            } else {
                writeln!(ann, "0 {} {}", c.name, c.comment)?;
            }
            writeln!(ann, "{} {} {}", c.start, c.length, c.hole_count)?;
        }
        ann.flush()?;

        let mut amb = BufWriter::new(File::create(Self::amb_path(prefix))?);
        writeln!(
            amb,
            "{} {} {}",
            self.forward_len,
            self.contigs.len(),
            self.holes.len()
        )?;
        for h in &self.holes {
            writeln!(amb, "{} {} {}", h.offset, h.length, h.character as char)?;
        }
        amb.flush()?;
        Ok(())
    }

    /// Load a pack from its three files, verifying sizes, the checksum byte
    /// and the descriptor chains.
    pub fn load(prefix: &Path) -> Result<Pack> {
        let corrupt = |reason: String| SvalignError::PackCorrupt {
            prefix: prefix.to_path_buf(),
            reason,
        };
        if !Self::exists_on_disk(prefix) {
            return Err(corrupt("missing .pac, .ann or .amb file".into()));
        }

        // .ann
        let ann = BufReader::new(File::open(Self::ann_path(prefix))?);
        let mut lines = ann.lines();
        let header = lines
            .next()
            .ok_or_else(|| corrupt("empty .ann file".into()))??;
        let mut fields = header.split_whitespace();
        let forward_len: u64 = parse_field(fields.next(), "forward length", prefix)?;
        let n_contigs: usize = parse_field(fields.next(), "contig count", prefix)?;
        let seed: u32 = parse_field(fields.next(), "seed", prefix)?;

        let mut pack = Pack::with_seed(seed);
        pack.forward_len = forward_len;
        for _ in 0..n_contigs {
            let name_line = lines
                .next()
                .ok_or_else(|| corrupt("truncated .ann file".into()))??;
            let mut parts = name_line.splitn(3, ' ');
            let _gi = parts.next();
            let name = parts
                .next()
                .ok_or_else(|| corrupt("missing contig name in .ann".into()))?
                .to_string();
            let comment = parts.next().unwrap_or("none").to_string();
            let desc_line = lines
                .next()
                .ok_or_else(|| corrupt("truncated .ann file".into()))??;
            let mut desc = desc_line.split_whitespace();
            let start: u64 = parse_field(desc.next(), "contig offset", prefix)?;
            let length: u64 = parse_field(desc.next(), "contig length", prefix)?;
            let hole_count: u32 = parse_field(desc.next(), "contig hole count", prefix)?;
            pack.contigs.push(Contig {
                name,
                comment,
                start,
                length,
                hole_count,
            });
        }
        if lines.next().transpose()?.is_some_and(|l| !l.trim().is_empty()) {
            return Err(corrupt(".ann holds more contigs than declared".into()));
        }

        // .pac
        let mut pac_bytes = Vec::new();
        File::open(Self::pac_path(prefix))?.read_to_end(&mut pac_bytes)?;
        let zero_byte_injected = forward_len % 4 == 0;
        let trailer = 1 + usize::from(zero_byte_injected);
        if pac_bytes.len() < trailer {
            return Err(corrupt("pac file shorter than its trailer".into()));
        }
        let checksum = pac_bytes[pac_bytes.len() - 1];
        if checksum as u64 != forward_len % 4 {
            return Err(corrupt(format!(
                "pac checksum byte {} disagrees with forward length {}",
                checksum, forward_len
            )));
        }
        if zero_byte_injected && pac_bytes[pac_bytes.len() - 2] != 0 {
            return Err(corrupt("expected zero byte missing from pac file".into()));
        }
        pac_bytes.truncate(pac_bytes.len() - trailer);
        let expected = (forward_len / 4 + u64::from(forward_len % 4 != 0)) as usize;
        if pac_bytes.len() != expected {
            return Err(corrupt(format!(
                "pac payload holds {} bytes, expected {}",
                pac_bytes.len(),
                expected
            )));
        }
        pack.packed = pac_bytes;

        // .amb
        let amb = BufReader::new(File::open(Self::amb_path(prefix))?);
        let mut amb_lines = amb.lines();
        let amb_header = amb_lines
            .next()
            .ok_or_else(|| corrupt("empty .amb file".into()))??;
        let mut amb_fields = amb_header.split_whitespace();
        let amb_forward_len: u64 = parse_field(amb_fields.next(), "forward length", prefix)?;
        let amb_n_contigs: usize = parse_field(amb_fields.next(), "contig count", prefix)?;
        let n_holes: usize = parse_field(amb_fields.next(), "hole count", prefix)?;
        if amb_forward_len != forward_len || amb_n_contigs != n_contigs {
            return Err(corrupt(".amb header disagrees with .ann header".into()));
        }
        for _ in 0..n_holes {
            let line = amb_lines
                .next()
                .ok_or_else(|| corrupt("truncated .amb file".into()))??;
            let mut f = line.split_whitespace();
            let offset: u64 = parse_field(f.next(), "hole offset", prefix)?;
            let length: u64 = parse_field(f.next(), "hole length", prefix)?;
            let character = f
                .next()
                .and_then(|s| s.bytes().next())
                .ok_or_else(|| corrupt("missing hole character in .amb".into()))?;
            pack.holes.push(Hole {
                offset,
                length,
                character,
            });
        }
        if amb_lines
            .next()
            .transpose()?
            .is_some_and(|l| !l.trim().is_empty())
        {
            return Err(corrupt(".amb holds more holes than declared".into()));
        }

        pack.check_consistency(prefix)?;
        Ok(pack)
    }

    /// Verify the contig offset chain and the hole table.
    pub fn check_consistency(&self, prefix: &Path) -> Result<()> {
        let corrupt = |reason: String| SvalignError::PackCorrupt {
            prefix: prefix.to_path_buf(),
            reason,
        };
        let mut running = 0u64;
        for c in &self.contigs {
            if c.start != running {
                return Err(corrupt(format!(
                    "contig '{}' starts at {} but the running offset is {}",
                    c.name, c.start, running
                )));
            }
            running += c.length;
        }
        if running != self.forward_len {
            return Err(corrupt(format!(
                "contig lengths sum to {} but the forward strand holds {} bases",
                running, self.forward_len
            )));
        }
        let mut prev_end = 0u64;
        for h in &self.holes {
            if h.offset < prev_end {
                return Err(corrupt("holes overlap or are unsorted".into()));
            }
            if h.offset + h.length > self.forward_len {
                return Err(corrupt("hole extends past the forward strand".into()));
            }
            prev_end = h.offset + h.length;
        }
        Ok(())
    }
}

fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    what: &str,
    prefix: &Path,
) -> Result<T> {
    field
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SvalignError::PackCorrupt {
            prefix: prefix.to_path_buf(),
            reason: format!("missing or invalid {}", what),
        })
}
