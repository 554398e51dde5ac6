//! Output destinations for streaming writes
//!
//! `DataSink` is the write counterpart to
//! [`DataSource`](super::compression::DataSource): it names where bytes go
//! while the writers stay agnostic of the destination. Compression is
//! selected from the file extension (`.gz`, `.bgz`), and BWT payload
//! formats are detected from the extension underneath the compression
//! suffix.

use std::path::{Path, PathBuf};

/// Output destination for streaming writes
#[derive(Debug, Clone)]
pub enum DataSink {
    /// Write to a local file path
    ///
    /// Compression format is auto-detected from the file extension:
    /// `.gz` for gzip, `.bgz` for bgzip, anything else uncompressed.
    Local(PathBuf),

    /// Write to standard output, always uncompressed
    Stdout,
}

impl DataSink {
    /// Create a sink from a file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Local(path.as_ref().to_path_buf())
    }

    /// Create a sink for standard output
    pub fn stdout() -> Self {
        Self::Stdout
    }

    /// The final file extension, if this is a local file sink
    pub(crate) fn extension(&self) -> Option<&str> {
        match self {
            Self::Local(path) => path.extension().and_then(|s| s.to_str()),
            Self::Stdout => None,
        }
    }

    /// The compression suffix in effect, if any
    pub(crate) fn compression_suffix(&self) -> Option<&'static str> {
        match self.extension() {
            Some("gz") => Some("gz"),
            Some("bgz") => Some("bgz"),
            _ => None,
        }
    }

    /// Whether writes to this sink will be compressed
    pub fn is_compressed(&self) -> bool {
        self.compression_suffix().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        let sink = DataSink::from_path("out.bwt");
        match sink {
            DataSink::Local(path) => assert_eq!(path, PathBuf::from("out.bwt")),
            _ => panic!("expected Local variant"),
        }
    }

    #[test]
    fn test_compression_detection() {
        assert!(DataSink::from_path("out.bwt.gz").is_compressed());
        assert!(DataSink::from_path("out.txt.bgz").is_compressed());
        assert!(!DataSink::from_path("out.bwt").is_compressed());
        assert!(!DataSink::stdout().is_compressed());
    }

    #[test]
    fn test_extension_chain() {
        let sink = DataSink::from_path("reads.pri.bgz");
        assert_eq!(sink.extension(), Some("bgz"));
        assert_eq!(sink.compression_suffix(), Some("bgz"));
    }
}
