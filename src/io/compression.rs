//! Compressed input and output streams
//!
//! Both BWT inputs (read sets, reference texts) and BWT outputs may be
//! gzip or bgzip compressed; the pair [`CompressedReader`] /
//! [`CompressedWriter`] hides the difference behind `BufRead` and `Write`.
//!
//! Bgzip files consist of independent deflate blocks, so both directions
//! run the codec over a bounded batch of blocks in parallel while keeping
//! constant memory: eight 60 KiB blocks in flight regardless of file size.
//! Large local files are memory-mapped with sequential-access hints before
//! decompression.

use crate::error::{BwtError, Result};
use flate2::read::GzDecoder;
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::sink::DataSink;

/// Files at least this large are memory-mapped before reading
pub const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Blocks compressed or decompressed per parallel batch
const PARALLEL_BLOCK_COUNT: usize = 8;

/// Maximum uncompressed payload of one bgzip block; BGZF requires the
/// compressed block to stay under 64 KiB, so leave headroom
const BGZIP_BLOCK_SIZE: usize = 60 * 1024;

/// Origin of input bytes
#[derive(Debug, Clone)]
pub enum DataSource {
    /// Local file path
    Local(PathBuf),
}

impl DataSource {
    /// Create a local file data source
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        DataSource::Local(path.as_ref().to_path_buf())
    }

    /// Open the source as a buffered byte stream
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            DataSource::Local(path) => open_local_file(path),
        }
    }
}

/// Open a local file, memory-mapping it past the size threshold
fn open_local_file(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() >= MMAP_THRESHOLD {
        open_mmap_file(path)
    } else {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(target_os = "macos")]
fn open_mmap_file(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    use libc::{madvise, MADV_SEQUENTIAL, MADV_WILLNEED};

    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    // sequential access hint for the page cache
    unsafe {
        madvise(
            mmap.as_ptr() as *mut _,
            mmap.len(),
            MADV_SEQUENTIAL | MADV_WILLNEED,
        );
    }

    Ok(Box::new(io::Cursor::new(mmap)))
}

#[cfg(not(target_os = "macos"))]
fn open_mmap_file(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Box::new(io::Cursor::new(mmap)))
}

/// One compressed block of a bgzip stream
struct BgzipBlock {
    data: Vec<u8>,
}

/// Decompress a single block
fn decompress_block(block: &BgzipBlock) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(&block.data[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Streaming reader that decompresses bgzip blocks in bounded parallel
/// batches
///
/// Plain gzip files (no BGZF extra field) degrade gracefully to a single
/// block covering the whole stream.
struct BoundedParallelBgzipReader<R: BufRead> {
    inner: R,
    output_buffer: Vec<u8>,
    output_pos: usize,
    eof: bool,
}

impl<R: BufRead> BoundedParallelBgzipReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            output_buffer: Vec::new(),
            output_pos: 0,
            eof: false,
        }
    }

    /// Read one bgzip block from the stream
    fn read_one_block(&mut self) -> io::Result<Option<BgzipBlock>> {
        let mut header = [0u8; 18];
        match self.inner.read_exact(&mut header) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        if header[0] != 31 || header[1] != 139 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid gzip magic: [{}, {}]", header[0], header[1]),
            ));
        }

        // no FEXTRA flag: regular gzip, slurp the rest as one block
        if header[3] & 0x04 == 0 {
            let mut compressed = header.to_vec();
            self.inner.read_to_end(&mut compressed)?;
            return Ok(Some(BgzipBlock { data: compressed }));
        }

        let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
        let mut extra = vec![0u8; xlen];
        self.inner.read_exact(&mut extra)?;

        // find the BGZF BSIZE subfield (SI1='B', SI2='C', SLEN=2)
        let mut bsize: Option<u16> = None;
        let mut pos = 0;
        while pos + 4 <= xlen {
            let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
            if extra[pos] == 66 && extra[pos + 1] == 67 && slen == 2 {
                if pos + 6 > xlen {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "incomplete BSIZE field",
                    ));
                }
                bsize = Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
                break;
            }
            pos += 4 + slen;
        }

        let block_size = match bsize {
            Some(bs) => bs as usize + 1,
            None => {
                // gzip with an unrelated extra field
                let mut compressed = header.to_vec();
                compressed.extend_from_slice(&extra);
                self.inner.read_to_end(&mut compressed)?;
                return Ok(Some(BgzipBlock { data: compressed }));
            }
        };

        let already_read = 18 + xlen;
        if block_size < already_read {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid block size {} < {}", block_size, already_read),
            ));
        }

        let mut data = Vec::with_capacity(block_size);
        data.extend_from_slice(&header);
        data.extend_from_slice(&extra);
        let mut rest = vec![0u8; block_size - already_read];
        self.inner.read_exact(&mut rest)?;
        data.extend_from_slice(&rest);

        Ok(Some(BgzipBlock { data }))
    }

    /// Refill the output buffer from the next batch of blocks
    fn read_next_chunk(&mut self) -> io::Result<()> {
        if self.eof {
            return Ok(());
        }

        let mut blocks = Vec::with_capacity(PARALLEL_BLOCK_COUNT);
        for _ in 0..PARALLEL_BLOCK_COUNT {
            match self.read_one_block()? {
                Some(block) => blocks.push(block),
                None => {
                    self.eof = true;
                    break;
                }
            }
        }
        if blocks.is_empty() {
            return Ok(());
        }

        let decompressed: Vec<_> = blocks
            .par_iter()
            .map(decompress_block)
            .collect::<io::Result<Vec<_>>>()?;

        self.output_buffer.clear();
        for block in decompressed {
            self.output_buffer.extend_from_slice(&block);
        }
        self.output_pos = 0;
        Ok(())
    }
}

impl<R: BufRead> Read for BoundedParallelBgzipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.output_pos >= self.output_buffer.len() {
            if self.eof {
                return Ok(0);
            }
            self.read_next_chunk()?;
            if self.output_buffer.is_empty() {
                return Ok(0);
            }
        }

        let available = self.output_buffer.len() - self.output_pos;
        let to_copy = available.min(buf.len());
        buf[..to_copy]
            .copy_from_slice(&self.output_buffer[self.output_pos..self.output_pos + to_copy]);
        self.output_pos += to_copy;
        Ok(to_copy)
    }
}

/// Buffered reader with transparent gzip/bgzip decompression
///
/// Compression is detected from the stream's magic bytes, not the file
/// name, so misnamed files still read correctly.
pub struct CompressedReader {
    inner: Box<dyn BufRead + Send>,
}

impl CompressedReader {
    /// Open a data source, decompressing if its first bytes say so
    pub fn new(source: DataSource) -> Result<Self> {
        let mut reader = source.open()?;

        let first_bytes = {
            let peeked = reader.fill_buf()?;
            match peeked.len() {
                0 => [0, 0],
                1 => [peeked[0], 0],
                _ => [peeked[0], peeked[1]],
            }
        };

        if first_bytes == [31, 139] {
            let parallel = BoundedParallelBgzipReader::new(reader);
            Ok(Self {
                inner: Box::new(BufReader::new(parallel)),
            })
        } else {
            Ok(Self { inner: reader })
        }
    }
}

impl Read for CompressedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for CompressedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

/// Parallel bgzip writer
///
/// Mirrors the reader: buffers eight 60 KiB blocks, compresses them in one
/// rayon batch, writes them sequentially with BGZF headers, and appends
/// the standard BGZF EOF marker on finish.
struct BgzipWriter {
    writer: Box<dyn Write>,
    uncompressed_blocks: Vec<Vec<u8>>,
    current_block: Vec<u8>,
    level: Compression,
}

impl BgzipWriter {
    fn new(writer: Box<dyn Write>, level: Compression) -> Self {
        Self {
            writer,
            uncompressed_blocks: Vec::with_capacity(PARALLEL_BLOCK_COUNT),
            current_block: Vec::with_capacity(BGZIP_BLOCK_SIZE),
            level,
        }
    }

    /// Compress one payload into a complete BGZF block
    fn compress_block(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
        let mut deflate = DeflateEncoder::new(Vec::new(), level);
        deflate.write_all(data)?;
        let deflated = deflate.finish()?;

        let crc = crc32fast::hash(data);

        let mut block = Vec::with_capacity(deflated.len() + 26);
        // gzip header with FEXTRA set
        block.extend_from_slice(&[31, 139, 8, 4, 0, 0, 0, 0, 0, 255]);
        // extra field: XLEN=6, BGZF subfield with BSIZE placeholder
        block.extend_from_slice(&6u16.to_le_bytes());
        block.push(66);
        block.push(67);
        block.extend_from_slice(&2u16.to_le_bytes());
        let bsize_pos = block.len();
        block.extend_from_slice(&0u16.to_le_bytes());

        block.extend_from_slice(&deflated);
        block.extend_from_slice(&crc.to_le_bytes());
        block.extend_from_slice(&(data.len() as u32).to_le_bytes());

        let bsize = (block.len() - 1) as u16;
        block[bsize_pos..bsize_pos + 2].copy_from_slice(&bsize.to_le_bytes());
        Ok(block)
    }

    fn flush_blocks(&mut self) -> io::Result<()> {
        if self.uncompressed_blocks.is_empty() {
            return Ok(());
        }

        let level = self.level;
        let compressed: Vec<_> = self
            .uncompressed_blocks
            .par_iter()
            .map(|block| Self::compress_block(block, level))
            .collect::<io::Result<Vec<_>>>()?;

        for block in compressed {
            self.writer.write_all(&block)?;
        }
        self.uncompressed_blocks.clear();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BGZIP_BLOCK_SIZE - self.current_block.len();
            let to_copy = remaining.len().min(space);
            self.current_block.extend_from_slice(&remaining[..to_copy]);
            remaining = &remaining[to_copy..];

            if self.current_block.len() >= BGZIP_BLOCK_SIZE {
                let block = std::mem::replace(
                    &mut self.current_block,
                    Vec::with_capacity(BGZIP_BLOCK_SIZE),
                );
                self.uncompressed_blocks.push(block);
                if self.uncompressed_blocks.len() >= PARALLEL_BLOCK_COUNT {
                    self.flush_blocks()?;
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn finish(mut self) -> io::Result<()> {
        if !self.current_block.is_empty() {
            let block = std::mem::take(&mut self.current_block);
            self.uncompressed_blocks.push(block);
        }
        self.flush_blocks()?;

        // standard 28-byte BGZF EOF marker
        let eof_marker = [
            31, 139, 8, 4, 0, 0, 0, 0, 0, 255, 6, 0, 66, 67, 2, 0, 27, 0, 3, 0, 0, 0, 0, 0, 0, 0,
            0, 0,
        ];
        self.writer.write_all(&eof_marker)?;
        self.writer.flush()
    }
}

/// Buffered writer with compression chosen by the sink's extension
///
/// - `.gz`: single-threaded gzip
/// - `.bgz`: parallel bgzip
/// - anything else: plain buffered bytes
pub enum CompressedWriter {
    /// Uncompressed writer with buffering
    Plain(Option<BufWriter<Box<dyn Write>>>),
    /// Gzip writer
    Gzip(Option<GzEncoder<BufWriter<Box<dyn Write>>>>),
    /// Parallel bgzip writer
    Bgzip(Option<BgzipWriter>),
}

impl CompressedWriter {
    /// Create a writer for the sink at the default compression level
    pub fn new(sink: DataSink) -> Result<Self> {
        Self::with_level(sink, Compression::default())
    }

    /// Create a writer for the sink at an explicit compression level
    pub fn with_level(sink: DataSink, level: Compression) -> Result<Self> {
        let compressed = sink.compression_suffix();
        let writer: Box<dyn Write> = match sink {
            DataSink::Local(path) => Box::new(File::create(&path)?),
            DataSink::Stdout => Box::new(io::stdout()),
        };
        match compressed {
            Some("gz") => Ok(Self::Gzip(Some(GzEncoder::new(
                BufWriter::new(writer),
                level,
            )))),
            Some("bgz") => Ok(Self::Bgzip(Some(BgzipWriter::new(writer, level)))),
            _ => Ok(Self::Plain(Some(BufWriter::new(writer)))),
        }
    }

    /// Flush buffered data without finalizing the compressed stream
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(Some(w)) => w.flush(),
            Self::Gzip(Some(w)) => w.flush(),
            Self::Bgzip(Some(w)) => w.flush(),
            _ => Ok(()),
        }
    }

    /// Finalize the stream, writing compression trailers.
    ///
    /// Always call this instead of relying on `Drop`, which can only
    /// flush best-effort.
    pub fn finish(mut self) -> io::Result<()> {
        match &mut self {
            Self::Plain(w) => match w.take() {
                Some(mut writer) => writer.flush(),
                None => Ok(()),
            },
            Self::Gzip(w) => match w.take() {
                Some(encoder) => {
                    encoder.finish()?;
                    Ok(())
                }
                None => Ok(()),
            },
            Self::Bgzip(w) => match w.take() {
                Some(writer) => writer.finish(),
                None => Ok(()),
            },
        }
    }
}

impl Write for CompressedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(Some(w)) => w.write(buf),
            Self::Gzip(Some(w)) => w.write(buf),
            Self::Bgzip(Some(w)) => w.write(buf),
            _ => Err(io::Error::other("cannot write to a finished writer")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        CompressedWriter::flush(self)
    }
}

impl Drop for CompressedWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Parse a `1..9` compression level, tolerating the historical `R`
/// strategy suffix
pub fn parse_compression_level(spec: &str) -> Result<Compression> {
    let digits = spec.strip_suffix(['R', 'r']).unwrap_or(spec);
    match digits.parse::<u32>() {
        Ok(level @ 1..=9) => Ok(Compression::new(level)),
        _ => Err(BwtError::InputFormat {
            line: 0,
            msg: format!("invalid compression level '{}', expected 1..9 or 1R", spec),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_plain_roundtrip() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_path_buf();

        let mut writer = CompressedWriter::new(DataSink::from_path(&path)).unwrap();
        writer.write_all(b"ACGTACGT\n").unwrap();
        writer.finish().unwrap();

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content, b"ACGTACGT\n");
    }

    #[test]
    fn test_gzip_roundtrip() {
        let temp = tempfile::Builder::new().suffix(".gz").tempfile().unwrap();
        let path = temp.path().to_path_buf();

        let mut writer = CompressedWriter::new(DataSink::from_path(&path)).unwrap();
        writer.write_all(b"the quick brown fox\n").unwrap();
        writer.finish().unwrap();

        let mut reader = CompressedReader::new(DataSource::from_path(&path)).unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "the quick brown fox\n");
    }

    #[test]
    fn test_bgzip_roundtrip_multi_block() {
        let temp = tempfile::Builder::new().suffix(".bgz").tempfile().unwrap();
        let path = temp.path().to_path_buf();

        // enough data to span several 60 KiB blocks
        let payload: Vec<u8> = (0..300_000u32).map(|i| b"ACGT"[(i % 4) as usize]).collect();

        let mut writer = CompressedWriter::new(DataSink::from_path(&path)).unwrap();
        writer.write_all(&payload).unwrap();
        writer.finish().unwrap();

        let mut reader = CompressedReader::new(DataSource::from_path(&path)).unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, payload);
    }

    #[test]
    fn test_compression_level_parsing() {
        assert!(parse_compression_level("1").is_ok());
        assert!(parse_compression_level("9").is_ok());
        assert!(parse_compression_level("1R").is_ok());
        assert!(parse_compression_level("0").is_err());
        assert!(parse_compression_level("10").is_err());
        assert!(parse_compression_level("fast").is_err());
    }

    #[test]
    fn test_uncompressed_passthrough_detection() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b">seq\nACGT\n").unwrap();

        let mut reader = CompressedReader::new(DataSource::from_path(temp.path())).unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, ">seq\n");
    }
}
