//! SAM output.

use std::io::{BufWriter, Write};

use crate::align::alignment::Alignment;
use crate::core::nucseq::NucSeq;
use crate::error::Result;
use crate::index::pack::Pack;

// SAM flag bits
pub const FLAG_PAIRED: u16 = 0x1;
pub const FLAG_PROPER_PAIR: u16 = 0x2;
pub const FLAG_UNMAPPED: u16 = 0x4;
pub const FLAG_MATE_UNMAPPED: u16 = 0x8;
pub const FLAG_REVERSE: u16 = 0x10;
pub const FLAG_MATE_REVERSE: u16 = 0x20;
pub const FLAG_FIRST_IN_PAIR: u16 = 0x40;
pub const FLAG_LAST_IN_PAIR: u16 = 0x80;
pub const FLAG_SECONDARY: u16 = 0x100;
pub const FLAG_SUPPLEMENTARY: u16 = 0x800;

/// Mate placement of one record, resolved from the alignment arena before
/// writing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MateInfo {
    pub ref_name_same: bool,
    pub ref_name: Option<usize>,
    pub pos_1based: u64,
    pub reverse: bool,
    pub unmapped: bool,
    pub first_in_pair: bool,
    pub tlen: i64,
}

pub struct SamWriter<W: Write> {
    out: BufWriter<W>,
}

impl<W: Write> SamWriter<W> {
    pub fn new(inner: W) -> Self {
        SamWriter {
            out: BufWriter::new(inner),
        }
    }

    pub fn write_header(&mut self, pack: &Pack, command_line: &str) -> Result<()> {
        writeln!(self.out, "@HD\tVN:1.6\tSO:unsorted")?;
        for contig in pack.contigs() {
            writeln!(self.out, "@SQ\tSN:{}\tLN:{}", contig.name, contig.length)?;
        }
        writeln!(
            self.out,
            "@PG\tID:svalign\tPN:svalign\tVN:{}\tCL:{}",
            env!("CARGO_PKG_VERSION"),
            command_line
        )?;
        Ok(())
    }

    /// Scale the core's `[0, 1]` mapping confidence onto the SAM quality
    /// range; NaN (unusable score) maps to 255, "unavailable".
    fn scale_mapq(mapq: f64) -> u16 {
        if mapq.is_nan() {
            255
        } else {
            (mapq * 60.0).round().clamp(0.0, 254.0) as u16
        }
    }

    /// Write one aligned record. Alignments on the virtual reverse strand
    /// are flipped onto the forward strand here: coordinates mirror through
    /// the seam, the CIGAR reverses, and the sequence is emitted as its
    /// reverse complement.
    pub fn write_alignment(
        &mut self,
        alignment: &Alignment,
        query: &NucSeq,
        qual: Option<&str>,
        pack: &Pack,
        mate: Option<MateInfo>,
    ) -> Result<()> {
        let reverse = pack.is_reverse(alignment.r_begin);
        let leftmost = if reverse {
            pack.abs_pos(alignment.r_end - 1)
        } else {
            alignment.r_begin
        };
        let contig_id = pack.contig_id_for_pos(leftmost);
        let pos_1based = leftmost - pack.start_of_contig(contig_id) + 1;

        let mut flag = 0u16;
        if reverse {
            flag |= FLAG_REVERSE;
        }
        if alignment.secondary {
            flag |= FLAG_SECONDARY;
        }
        if alignment.supplementary {
            flag |= FLAG_SUPPLEMENTARY;
        }

        let cigar = if reverse {
            reverse_cigar(&alignment.cigar(query.len()))
        } else {
            alignment.cigar(query.len())
        };
        let seq = if reverse {
            query.reverse_complement().to_string()
        } else {
            query.to_string()
        };
        let qual_str = match qual {
            Some(q) if reverse => q.chars().rev().collect::<String>(),
            Some(q) => q.to_string(),
            None => "*".to_string(),
        };

        let (mate_ref, mate_pos, tlen) = match mate {
            Some(info) => {
                flag |= FLAG_PAIRED;
                if info.unmapped {
                    flag |= FLAG_MATE_UNMAPPED;
                }
                if info.reverse {
                    flag |= FLAG_MATE_REVERSE;
                }
                flag |= if info.first_in_pair {
                    FLAG_FIRST_IN_PAIR
                } else {
                    FLAG_LAST_IN_PAIR
                };
                if !info.unmapped && !alignment.secondary {
                    flag |= FLAG_PROPER_PAIR;
                }
                let name = if info.ref_name_same {
                    "=".to_string()
                } else {
                    info.ref_name
                        .map(|id| pack.name_of_contig(id).to_string())
                        .unwrap_or_else(|| "*".to_string())
                };
                (name, info.pos_1based, info.tlen)
            }
            None => ("*".to_string(), 0, 0),
        };

        writeln!(
            self.out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            alignment.query_name,
            flag,
            pack.name_of_contig(contig_id),
            pos_1based,
            Self::scale_mapq(alignment.mapping_quality),
            cigar,
            mate_ref,
            mate_pos,
            tlen,
            seq,
            qual_str,
        )?;
        Ok(())
    }

    /// Record for a read that produced no alignment.
    pub fn write_unmapped(&mut self, query: &NucSeq, qual: Option<&str>) -> Result<()> {
        writeln!(
            self.out,
            "{}\t{}\t*\t0\t0\t*\t*\t0\t0\t{}\t{}",
            query.name,
            FLAG_UNMAPPED,
            query.to_string(),
            qual.unwrap_or("*"),
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush and recover the underlying sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        self.out.into_inner().map_err(|e| e.into_error().into())
    }
}

fn reverse_cigar(cigar: &str) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut num = String::new();
    for c in cigar.chars() {
        if c.is_ascii_digit() {
            num.push(c);
        } else {
            runs.push(format!("{}{}", num, c));
            num.clear();
        }
    }
    runs.reverse();
    runs.concat()
}
