//! I/O module: compressed streams, output sinks, and sequence readers
//!
//! Everything here is infrastructure around the core engine: where bytes
//! come from ([`DataSource`]), where they go ([`DataSink`]), how they are
//! compressed ([`CompressedReader`], [`CompressedWriter`]), and how read
//! records are pulled in restartable batches ([`SequenceReader`]).

pub mod compression;
pub mod reader;
pub mod sink;

pub use compression::{
    parse_compression_level, CompressedReader, CompressedWriter, DataSource, MMAP_THRESHOLD,
};
pub use reader::{
    open_sequence_reader, FastaReader, FastqReader, ReadBatch, SequenceReader, TxtReader,
};
pub use sink::DataSink;
