//! Error types for bwtk

use thiserror::Error;

/// Result type alias for bwtk operations
pub type Result<T> = std::result::Result<T, BwtError>;

/// Error types that can occur during BWT construction
#[derive(Debug, Error)]
pub enum BwtError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input record
    #[error("Invalid input record at line {line}: {msg}")]
    InputFormat {
        /// Line number where the error occurred (0 if not line-oriented)
        line: usize,
        /// Error message
        msg: String,
    },

    /// A single bucket exceeds the inner memory budget at the widest
    /// bucketing width
    #[error(
        "bucket {bucket} holds {size} suffixes: raise the inner memory budget \
         to at least {required_mib} MiB"
    )]
    MemoryBudget {
        /// Index of the offending bucket
        bucket: u32,
        /// Number of suffixes in the offending bucket
        size: u32,
        /// Minimum inner budget, in MiB, that would accommodate it
        required_mib: u64,
    },

    /// A fixed-capacity scratch structure would be exceeded; indicates a
    /// tuning bug and is fatal
    #[error("scratch buffer overflow: {needed} entries needed, {capacity} reserved")]
    BufferOverflow {
        /// Entries the operation would have required
        needed: u64,
        /// Entries actually reserved
        capacity: u64,
    },

    /// Sampler rank construction did not converge within the round limit
    #[error("sampler rank construction exceeded {rounds} doubling rounds")]
    ConstructionLimit {
        /// Number of rounds attempted
        rounds: u32,
    },

    /// Cooperative cancellation observed at a stage boundary
    #[error("operation cancelled")]
    Cancelled,

    /// The underlying output stream failed to accept bytes
    #[error("output sink failed: {0}")]
    Sink(#[source] std::io::Error),
}
