//! BWT output sinks
//!
//! Sinks receive BWT symbols strictly in destination-slot order and append
//! them to an underlying byte stream. Symbols arrive as 2-bit DNA codes
//! with [`DOLLAR`] marking `$` tokens; each variant decides how (or
//! whether) the marker is representable:
//!
//! - ASCII (`.txt`): one byte per symbol, `$` written literally
//! - 2-bit packed (`.bwt`): little-endian within a 32-bit word; `$` slots
//!   are zero-filled and recoverable only through the primary side channel
//! - 4-bit packed (`.bwt4`): `$` encoded in-stream as the value 4
//! - discard: counts symbols, for measurement runs
//!
//! Packed sinks keep an internal bit offset and emit a word only once it is
//! full; [`BwtSink::finish`] writes the trailing partial word.

use crate::error::{BwtError, Result};
use crate::types::{decode_dna, DOLLAR};
use std::io::Write;
use std::path::Path;

/// Destination of BWT symbols, fed in destination-slot order
pub trait BwtSink {
    /// Append a batch of symbols to the stream
    fn process(&mut self, symbols: &[u8]) -> Result<()>;

    /// Flush any buffered partial word and the underlying stream
    fn finish(&mut self) -> Result<()>;
}

/// On-disk BWT representations, selected by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BwtFormat {
    /// One ASCII byte per symbol (`A C G T $`)
    Ascii,
    /// Two bits per symbol packed into little-endian 32-bit words
    Packed2,
    /// Four bits per symbol; `$` is the in-stream value 4
    Packed4,
}

impl BwtFormat {
    /// Detect the format from a path, looking through `.gz`/`.bgz`
    /// compression suffixes
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        match logical_extension(path.as_ref())?.as_str() {
            "txt" => Some(Self::Ascii),
            "bwt" => Some(Self::Packed2),
            "bwt4" => Some(Self::Packed4),
            _ => None,
        }
    }
}

/// The extension that decides the payload format, skipping a trailing
/// compression suffix
pub(crate) fn logical_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let mut parts = name.rsplit('.');
    let last = parts.next()?;
    if matches!(last, "gz" | "bgz") {
        parts.next().map(str::to_owned)
    } else {
        Some(last.to_owned())
    }
}

/// ASCII sink: one byte per symbol
pub struct AsciiSink<W: Write> {
    writer: W,
    buf: Vec<u8>,
}

impl<W: Write> AsciiSink<W> {
    /// Create a sink writing ASCII symbols to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: Vec::new(),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BwtSink for AsciiSink<W> {
    fn process(&mut self, symbols: &[u8]) -> Result<()> {
        self.buf.clear();
        self.buf.extend(symbols.iter().map(|&s| match s {
            DOLLAR => b'$',
            code => decode_dna(code),
        }));
        self.writer.write_all(&self.buf).map_err(BwtError::Sink)
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(BwtError::Sink)
    }
}

/// 2-bit packed sink, little-endian within a 32-bit word
///
/// `$` tokens are packed as zero; the caller records their slots in the
/// primary side channel.
pub struct Packed2Sink<W: Write> {
    writer: W,
    word: u32,
    filled: u32,
}

impl<W: Write> Packed2Sink<W> {
    /// Create a packed sink over `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            word: 0,
            filled: 0,
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BwtSink for Packed2Sink<W> {
    fn process(&mut self, symbols: &[u8]) -> Result<()> {
        for &s in symbols {
            let code = if s == DOLLAR { 0 } else { u32::from(s & 3) };
            self.word |= code << (2 * self.filled);
            self.filled += 1;
            if self.filled == 16 {
                self.writer
                    .write_all(&self.word.to_le_bytes())
                    .map_err(BwtError::Sink)?;
                self.word = 0;
                self.filled = 0;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.filled > 0 {
            self.writer
                .write_all(&self.word.to_le_bytes())
                .map_err(BwtError::Sink)?;
            self.word = 0;
            self.filled = 0;
        }
        self.writer.flush().map_err(BwtError::Sink)
    }
}

/// 4-bit packed sink; `$` is the in-stream nibble 4
pub struct Packed4Sink<W: Write> {
    writer: W,
    word: u32,
    filled: u32,
}

impl<W: Write> Packed4Sink<W> {
    /// Create a packed sink over `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            word: 0,
            filled: 0,
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BwtSink for Packed4Sink<W> {
    fn process(&mut self, symbols: &[u8]) -> Result<()> {
        for &s in symbols {
            let code = if s == DOLLAR { 4 } else { u32::from(s & 0xF) };
            self.word |= code << (4 * self.filled);
            self.filled += 1;
            if self.filled == 8 {
                self.writer
                    .write_all(&self.word.to_le_bytes())
                    .map_err(BwtError::Sink)?;
                self.word = 0;
                self.filled = 0;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.filled > 0 {
            self.writer
                .write_all(&self.word.to_le_bytes())
                .map_err(BwtError::Sink)?;
            self.word = 0;
            self.filled = 0;
        }
        self.writer.flush().map_err(BwtError::Sink)
    }
}

/// Sink that discards every symbol, keeping only the count
#[derive(Debug, Default)]
pub struct DiscardSink {
    emitted: u64,
}

impl DiscardSink {
    /// Create a discarding sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of symbols discarded so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl BwtSink for DiscardSink {
    fn process(&mut self, symbols: &[u8]) -> Result<()> {
        self.emitted += symbols.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that accumulates raw symbols in memory, `$` markers included
///
/// Mainly useful for tests and for feeding
/// [`invert_set_bwt`](crate::bwt::invert_set_bwt).
#[derive(Debug, Default)]
pub struct BufferSink {
    symbols: Vec<u8>,
}

impl BufferSink {
    /// Create an empty buffer sink
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated symbols
    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    /// Consume the sink, returning the accumulated symbols
    pub fn into_symbols(self) -> Vec<u8> {
        self.symbols
    }
}

impl BwtSink for BufferSink {
    fn process(&mut self, symbols: &[u8]) -> Result<()> {
        self.symbols.extend_from_slice(symbols);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
