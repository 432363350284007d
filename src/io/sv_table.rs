//! Tab-separated SV-jump output.
//!
//! Downstream consumers persist jumps into their own stores; this writer
//! only renders the in-memory records.

use std::io::{BufWriter, Write};

use crate::error::Result;
use crate::index::pack::Pack;
use crate::sv::jump::SvJump;

pub struct SvTableWriter<W: Write> {
    out: BufWriter<W>,
}

impl<W: Write> SvTableWriter<W> {
    pub fn new(inner: W) -> Self {
        SvTableWriter {
            out: BufWriter::new(inner),
        }
    }

    pub fn write_header(&mut self) -> Result<()> {
        writeln!(
            self.out,
            "#read_id\tread_name\tfrom_contig\tfrom_pos\tto_contig\tto_pos\tq_from\tq_to\tfrom_forward\tto_forward\tdummy\tmax_dist"
        )?;
        Ok(())
    }

    pub fn write_jump(&mut self, jump: &SvJump, read_name: &str, pack: &Pack) -> Result<()> {
        let from_contig = pack.contig_id_for_pos(jump.from_pos);
        let to_contig = pack.contig_id_for_pos(jump.to_pos);
        writeln!(
            self.out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            jump.read_id,
            read_name,
            pack.name_of_contig(from_contig),
            jump.from_pos - pack.start_of_contig(from_contig),
            pack.name_of_contig(to_contig),
            jump.to_pos - pack.start_of_contig(to_contig),
            jump.q_from,
            jump.q_to,
            if jump.from_forward { '+' } else { '-' },
            if jump.to_forward { '+' } else { '-' },
            if jump.dummy { 1 } else { 0 },
            jump.max_dist,
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
