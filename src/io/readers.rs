//! FASTA/FASTQ input with gzip transparency.
//!
//! One reader type serves both formats, picked by the first byte of the
//! stream. The paired variant composes two readers and keeps them in
//! lock-step.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use bio::io::{fasta, fastq};
use flate2::read::MultiGzDecoder;

use crate::core::nucseq::NucSeq;
use crate::error::{Result, SvalignError};
use crate::opts::PairedTailPolicy;

const BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// One input read: the translated sequence plus its quality line, if any.
#[derive(Debug, Clone)]
pub struct SeqRecord {
    pub seq: NucSeq,
    pub qual: Option<String>,
}

fn open_stream(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    let file = File::open(path)?;
    // gzip magic bytes, regardless of the file extension
    if n == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

enum Records {
    Fasta(fasta::Records<Box<dyn BufRead + Send>>),
    Fastq(fastq::Records<BufReader<Box<dyn BufRead + Send>>>),
}

/// Reader over one FASTA or FASTQ file; assigns sequential read ids.
pub struct SeqReader {
    records: Records,
    next_id: i64,
    path: String,
}

impl SeqReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut stream = open_stream(path)?;
        // skip leading blank lines, then decide the format by the marker byte
        let format = loop {
            let first = {
                let buf = stream.fill_buf()?;
                if buf.is_empty() {
                    break b'>';
                }
                buf[0]
            };
            match first {
                b'\n' | b'\r' => stream.consume(1),
                other => break other,
            }
        };
        let records = match format {
            b'>' => Records::Fasta(fasta::Reader::from_bufread(stream).records()),
            b'@' => Records::Fastq(fastq::Reader::new(stream).records()),
            other => {
                return Err(SvalignError::InputMalformed {
                    record: path.display().to_string(),
                    reason: format!(
                        "expected '>' or '@' as the first record marker, found {:?}",
                        other as char
                    ),
                })
            }
        };
        Ok(SeqReader {
            records,
            next_id: 0,
            path: path.display().to_string(),
        })
    }

    /// Next record, or `None` at end of input. Malformed records surface as
    /// `InputMalformed`.
    pub fn next_record(&mut self) -> Option<Result<SeqRecord>> {
        let parsed: std::result::Result<(String, Vec<u8>, Option<String>), String> =
            match &mut self.records {
                Records::Fasta(records) => records
                    .next()?
                    .map(|r| (r.id().to_string(), r.seq().to_vec(), None))
                    .map_err(|e| e.to_string()),
                Records::Fastq(records) => records
                    .next()?
                    .map(|r| {
                        (
                            r.id().to_string(),
                            r.seq().to_vec(),
                            Some(String::from_utf8_lossy(r.qual()).into_owned()),
                        )
                    })
                    .map_err(|e| e.to_string()),
            };
        let (name, raw, qual) = match parsed {
            Ok(x) => x,
            Err(reason) => {
                return Some(Err(SvalignError::InputMalformed {
                    record: self.path.clone(),
                    reason,
                }))
            }
        };
        let mut seq = match NucSeq::from_ascii(&name, &raw) {
            Ok(s) => s,
            Err(e) => return Some(Err(e)),
        };
        seq.id = self.next_id;
        self.next_id += 1;
        Some(Ok(SeqRecord { seq, qual }))
    }

    /// Drain up to `n` records into a batch.
    pub fn read_batch(&mut self, n: usize) -> Result<Vec<SeqRecord>> {
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            match self.next_record() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Two readers advancing in lock-step for paired reads.
pub struct PairedSeqReader {
    first: SeqReader,
    second: SeqReader,
    policy: PairedTailPolicy,
    exhausted: bool,
}

impl PairedSeqReader {
    pub fn open(first: &Path, second: &Path, policy: PairedTailPolicy) -> Result<Self> {
        Ok(PairedSeqReader {
            first: SeqReader::open(first)?,
            second: SeqReader::open(second)?,
            policy,
            exhausted: false,
        })
    }

    /// Peeking cannot keep both halves in lock-step, so it is rejected
    /// outright rather than left half-defined.
    pub fn peek(&self) -> Result<&SeqRecord> {
        Err(SvalignError::UnsupportedStreamOp("peek on a paired stream"))
    }

    /// Next pair; ends per the configured tail policy when one file runs
    /// out first.
    pub fn next_pair(&mut self) -> Option<Result<(SeqRecord, SeqRecord)>> {
        if self.exhausted {
            return None;
        }
        let a = self.first.next_record();
        let b = self.second.next_record();
        match (a, b) {
            (Some(Ok(a)), Some(Ok(b))) => Some(Ok((a, b))),
            (Some(Err(e)), _) | (_, Some(Err(e))) => Some(Err(e)),
            (None, None) => None,
            (Some(_), None) | (None, Some(_)) => {
                self.exhausted = true;
                match self.policy {
                    PairedTailPolicy::Fatal => Some(Err(SvalignError::InputMalformed {
                        record: "paired input".into(),
                        reason: "paired files hold unequal numbers of reads".into(),
                    })),
                    PairedTailPolicy::TruncateToShorter => {
                        log::warn!(
                            "paired files hold unequal numbers of reads; truncating to the shorter side"
                        );
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &[u8], suffix: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn fasta_multiline_and_crlf() {
        let f = write_temp(b">r1 first\r\nACGT\r\nACGT\r\n>r2\nGGGG\n", ".fa");
        let mut reader = SeqReader::open(f.path()).unwrap();
        let r1 = reader.next_record().unwrap().unwrap();
        assert_eq!(r1.seq.name, "r1");
        assert_eq!(r1.seq.len(), 8);
        assert_eq!(r1.seq.id, 0);
        assert!(r1.qual.is_none());
        let r2 = reader.next_record().unwrap().unwrap();
        assert_eq!(r2.seq.name, "r2");
        assert_eq!(r2.seq.id, 1);
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn fastq_with_qualities() {
        let f = write_temp(b"@r1\nACGTN\n+\nIIIII\n", ".fq");
        let mut reader = SeqReader::open(f.path()).unwrap();
        let r = reader.next_record().unwrap().unwrap();
        assert_eq!(r.seq.codes(), &[0, 1, 2, 3, 4]);
        assert_eq!(r.qual.as_deref(), Some("IIIII"));
    }

    #[test]
    fn invalid_base_is_a_hard_error() {
        let f = write_temp(b">r1\nACGU\n", ".fa");
        let mut reader = SeqReader::open(f.path()).unwrap();
        assert!(matches!(
            reader.next_record(),
            Some(Err(SvalignError::InputMalformed { .. }))
        ));
    }

    #[test]
    fn gzip_input_is_transparent() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b">r1\nACGTACGT\n").unwrap();
        let gz = encoder.finish().unwrap();
        let f = write_temp(&gz, ".fa.gz");
        let mut reader = SeqReader::open(f.path()).unwrap();
        let r = reader.next_record().unwrap().unwrap();
        assert_eq!(r.seq.len(), 8);
    }

    #[test]
    fn paired_lockstep_and_tail_policies() {
        let a = write_temp(b">a1\nAAAA\n>a2\nCCCC\n", ".fa");
        let b = write_temp(b">b1\nGGGG\n", ".fa");
        let mut paired =
            PairedSeqReader::open(a.path(), b.path(), PairedTailPolicy::Fatal).unwrap();
        assert!(paired.peek().is_err());
        let (x, y) = paired.next_pair().unwrap().unwrap();
        assert_eq!(x.seq.name, "a1");
        assert_eq!(y.seq.name, "b1");
        assert!(matches!(paired.next_pair(), Some(Err(_))));
        assert!(paired.next_pair().is_none());

        let mut paired =
            PairedSeqReader::open(a.path(), b.path(), PairedTailPolicy::TruncateToShorter)
                .unwrap();
        assert!(paired.next_pair().unwrap().is_ok());
        assert!(paired.next_pair().is_none());
    }
}
