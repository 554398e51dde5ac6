//! Batch-oriented sequence readers
//!
//! The BWT pipelines consume reads in batches: `next_batch` returns up to
//! `max_reads` records totalling at most `max_bases` symbols, and `rewind`
//! restarts the stream from the beginning so the collect phase can stream
//! the same input more than once. Readers are constructed over a
//! [`DataSource`] and reopen it on rewind, which keeps them usable on
//! compressed files where seeking is not available.
//!
//! Three formats are supported, chosen by file extension:
//!
//! - FASTA (`.fa`, `.fasta`, `.fna`): multi-line records under `>` headers
//! - FASTQ (`.fq`, `.fastq`): four-line records; qualities are parsed for
//!   validation and discarded
//! - TXT (`.txt`, `.seq`): one read per line
//!
//! All of them read transparently through `.gz`/`.bgz` compression.

use crate::error::{BwtError, Result};
use crate::io::compression::{CompressedReader, DataSource};
use crate::sink::logical_extension;
use std::io::BufRead;
use std::path::Path;

/// A batch of reads, stored back to back
#[derive(Debug, Default)]
pub struct ReadBatch {
    data: Vec<u8>,
    offsets: Vec<u32>,
}

impl ReadBatch {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            offsets: vec![0],
        }
    }

    fn push(&mut self, seq: &[u8]) {
        self.data.extend_from_slice(seq);
        self.offsets.push(self.data.len() as u32);
    }

    /// Number of reads in the batch
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Whether the batch holds no reads
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bases across the batch
    pub fn num_bases(&self) -> usize {
        self.data.len()
    }

    /// The `i`-th read
    pub fn get(&self, i: usize) -> &[u8] {
        &self.data[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    /// Iterate over the reads
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Pull-based batch reader over a sequence file
///
/// Implementations must be restartable: after `rewind`, `next_batch`
/// yields the same records again from the start.
pub trait SequenceReader {
    /// Read the next batch, bounded by `max_reads` records and `max_bases`
    /// total symbols. Returns `None` at end of input. A single record
    /// longer than `max_bases` is returned alone in its own batch.
    fn next_batch(&mut self, max_reads: usize, max_bases: usize) -> Result<Option<ReadBatch>>;

    /// Restart the stream from the beginning
    fn rewind(&mut self) -> Result<()>;
}

/// Open a reader for `path`, picking the parser from the extension
pub fn open_sequence_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn SequenceReader>> {
    let path = path.as_ref();
    let ext = logical_extension(path).unwrap_or_default();
    let source = DataSource::from_path(path);
    match ext.as_str() {
        "fa" | "fasta" | "fna" => Ok(Box::new(FastaReader::new(source)?)),
        "fq" | "fastq" => Ok(Box::new(FastqReader::new(source)?)),
        "txt" | "seq" => Ok(Box::new(TxtReader::new(source)?)),
        other => Err(BwtError::InputFormat {
            line: 0,
            msg: format!(
                "unrecognized input extension '{}' (expected fasta/fastq/txt)",
                other
            ),
        }),
    }
}

/// Shared batch-filling loop over a per-format record parser
fn fill_batch<F>(
    pending: &mut Option<Vec<u8>>,
    max_reads: usize,
    max_bases: usize,
    mut parse_next: F,
) -> Result<Option<ReadBatch>>
where
    F: FnMut() -> Result<Option<Vec<u8>>>,
{
    let mut batch = ReadBatch::new();
    loop {
        let record = match pending.take() {
            Some(record) => record,
            None => match parse_next()? {
                Some(record) => record,
                None => break,
            },
        };

        if !batch.is_empty()
            && (batch.len() >= max_reads || batch.num_bases() + record.len() > max_bases)
        {
            // does not fit: hold it for the next batch
            *pending = Some(record);
            break;
        }
        batch.push(&record);
        if batch.len() >= max_reads || batch.num_bases() >= max_bases {
            break;
        }
    }

    if batch.is_empty() {
        Ok(None)
    } else {
        Ok(Some(batch))
    }
}

/// FASTA batch reader
pub struct FastaReader {
    source: DataSource,
    reader: CompressedReader,
    line: String,
    peeked_header: Option<String>,
    line_number: usize,
    pending: Option<Vec<u8>>,
}

impl FastaReader {
    /// Open a FASTA reader over a data source
    pub fn new(source: DataSource) -> Result<Self> {
        let reader = CompressedReader::new(source.clone())?;
        Ok(Self {
            source,
            reader,
            line: String::with_capacity(256),
            peeked_header: None,
            line_number: 0,
            pending: None,
        })
    }

    fn parse_record(&mut self) -> Result<Option<Vec<u8>>> {
        // locate the next header
        let header = loop {
            if let Some(header) = self.peeked_header.take() {
                break header;
            }
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.line.trim_end();
            if line.is_empty() {
                continue;
            }
            if !line.starts_with('>') {
                return Err(BwtError::InputFormat {
                    line: self.line_number,
                    msg: format!("expected '>' header, found '{}'", truncate(line)),
                });
            }
            break line.to_string();
        };
        let header_line = self.line_number;

        // accumulate sequence lines until the next header or EOF
        let mut sequence = Vec::new();
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                break;
            }
            self.line_number += 1;
            let line = self.line.trim_end();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('>') {
                self.peeked_header = Some(line.to_string());
                break;
            }
            sequence.extend_from_slice(line.as_bytes());
        }

        if sequence.is_empty() {
            return Err(BwtError::InputFormat {
                line: header_line,
                msg: format!("record '{}' has an empty sequence", truncate(&header)),
            });
        }
        Ok(Some(sequence))
    }
}

impl SequenceReader for FastaReader {
    fn next_batch(&mut self, max_reads: usize, max_bases: usize) -> Result<Option<ReadBatch>> {
        // the closure needs the whole parser state, so lift pending out
        let mut pending = self.pending.take();
        let result = fill_batch(&mut pending, max_reads, max_bases, || self.parse_record());
        self.pending = pending;
        result
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader = CompressedReader::new(self.source.clone())?;
        self.peeked_header = None;
        self.line_number = 0;
        self.pending = None;
        Ok(())
    }
}

/// FASTQ batch reader
pub struct FastqReader {
    source: DataSource,
    reader: CompressedReader,
    line: String,
    line_number: usize,
    pending: Option<Vec<u8>>,
}

impl FastqReader {
    /// Open a FASTQ reader over a data source
    pub fn new(source: DataSource) -> Result<Self> {
        let reader = CompressedReader::new(source.clone())?;
        Ok(Self {
            source,
            reader,
            line: String::with_capacity(256),
            line_number: 0,
            pending: None,
        })
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(self.line.trim_end().to_string()))
    }

    fn parse_record(&mut self) -> Result<Option<Vec<u8>>> {
        let header = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !header.starts_with('@') {
            return Err(BwtError::InputFormat {
                line: self.line_number,
                msg: format!("expected '@' header, found '{}'", truncate(&header)),
            });
        }

        let sequence = self.expect_line("sequence")?;
        let separator = self.expect_line("'+' separator")?;
        if !separator.starts_with('+') {
            return Err(BwtError::InputFormat {
                line: self.line_number,
                msg: format!("expected '+' separator, found '{}'", truncate(&separator)),
            });
        }
        let quality = self.expect_line("quality")?;

        if sequence.is_empty() {
            return Err(BwtError::InputFormat {
                line: self.line_number,
                msg: "record has an empty sequence".to_string(),
            });
        }
        if quality.len() != sequence.len() {
            return Err(BwtError::InputFormat {
                line: self.line_number,
                msg: format!(
                    "quality length {} does not match sequence length {}",
                    quality.len(),
                    sequence.len()
                ),
            });
        }
        // qualities are validated and dropped; only the bases matter here
        Ok(Some(sequence.into_bytes()))
    }

    fn expect_line(&mut self, what: &str) -> Result<String> {
        match self.read_line()? {
            Some(line) => Ok(line),
            None => Err(BwtError::InputFormat {
                line: self.line_number,
                msg: format!("unexpected end of file before {}", what),
            }),
        }
    }
}

impl SequenceReader for FastqReader {
    fn next_batch(&mut self, max_reads: usize, max_bases: usize) -> Result<Option<ReadBatch>> {
        let mut pending = self.pending.take();
        let result = fill_batch(&mut pending, max_reads, max_bases, || self.parse_record());
        self.pending = pending;
        result
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader = CompressedReader::new(self.source.clone())?;
        self.line_number = 0;
        self.pending = None;
        Ok(())
    }
}

/// Line-oriented plain text reader: one read per line
pub struct TxtReader {
    source: DataSource,
    reader: CompressedReader,
    line: String,
    pending: Option<Vec<u8>>,
}

impl TxtReader {
    /// Open a TXT reader over a data source
    pub fn new(source: DataSource) -> Result<Self> {
        let reader = CompressedReader::new(source.clone())?;
        Ok(Self {
            source,
            reader,
            line: String::with_capacity(256),
            pending: None,
        })
    }

    fn parse_record(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let line = self.line.trim_end();
            if !line.is_empty() {
                return Ok(Some(line.as_bytes().to_vec()));
            }
        }
    }
}

impl SequenceReader for TxtReader {
    fn next_batch(&mut self, max_reads: usize, max_bases: usize) -> Result<Option<ReadBatch>> {
        let mut pending = self.pending.take();
        let result = fill_batch(&mut pending, max_reads, max_bases, || self.parse_record());
        self.pending = pending;
        result
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader = CompressedReader::new(self.source.clone())?;
        self.pending = None;
        Ok(())
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 40 {
        let head: String = s.chars().take(40).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_with(content: &[u8], suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_fasta_batches_and_rewind() {
        let file = temp_with(b">r1\nACGT\nACGT\n>r2\nTTTT\n>r3\nGG\n", ".fa");
        let mut reader = open_sequence_reader(file.path()).unwrap();

        let batch = reader.next_batch(2, 1_000_000).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(0), b"ACGTACGT");
        assert_eq!(batch.get(1), b"TTTT");

        let batch = reader.next_batch(2, 1_000_000).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get(0), b"GG");

        assert!(reader.next_batch(2, 1_000_000).unwrap().is_none());

        reader.rewind().unwrap();
        let batch = reader.next_batch(10, 1_000_000).unwrap().unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_fasta_base_budget_defers_record() {
        let file = temp_with(b">r1\nACGT\n>r2\nACGTACGT\n", ".fa");
        let mut reader = open_sequence_reader(file.path()).unwrap();

        // the second record would blow the 6-base budget, so it waits
        let batch = reader.next_batch(10, 6).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        let batch = reader.next_batch(10, 6).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get(0), b"ACGTACGT");
    }

    #[test]
    fn test_fasta_rejects_garbage() {
        let file = temp_with(b"ACGT\n", ".fa");
        let mut reader = open_sequence_reader(file.path()).unwrap();
        assert!(matches!(
            reader.next_batch(10, 100),
            Err(BwtError::InputFormat { line: 1, .. })
        ));
    }

    #[test]
    fn test_fastq_parsing() {
        let file = temp_with(b"@r1\nACGT\n+\nIIII\n@r2\nGGCC\n+r2\nFFFF\n", ".fq");
        let mut reader = open_sequence_reader(file.path()).unwrap();
        let batch = reader.next_batch(10, 1_000).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(0), b"ACGT");
        assert_eq!(batch.get(1), b"GGCC");
    }

    #[test]
    fn test_fastq_quality_mismatch() {
        let file = temp_with(b"@r1\nACGT\n+\nII\n", ".fq");
        let mut reader = open_sequence_reader(file.path()).unwrap();
        assert!(matches!(
            reader.next_batch(10, 100),
            Err(BwtError::InputFormat { .. })
        ));
    }

    #[test]
    fn test_txt_lines() {
        let file = temp_with(b"ACGT\n\nGGCC\n", ".txt");
        let mut reader = open_sequence_reader(file.path()).unwrap();
        let batch = reader.next_batch(10, 1_000).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(1), b"GGCC");
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            open_sequence_reader("reads.bam"),
            Err(BwtError::InputFormat { .. })
        ));
    }

    #[test]
    fn test_gzipped_fasta() {
        use crate::io::compression::CompressedWriter;
        use crate::io::sink::DataSink;

        let file = tempfile::Builder::new().suffix(".fa.gz").tempfile().unwrap();
        let mut writer = CompressedWriter::new(DataSink::from_path(file.path())).unwrap();
        writer.write_all(b">r1\nACGTACGT\n").unwrap();
        writer.finish().unwrap();

        let mut reader = open_sequence_reader(file.path()).unwrap();
        let batch = reader.next_batch(10, 1_000).unwrap().unwrap();
        assert_eq!(batch.get(0), b"ACGTACGT");
    }
}
