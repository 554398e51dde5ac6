//! Common types used throughout bwtk

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-band marker for the `$` end-of-string token in unpacked symbol
/// buffers.
///
/// The marker never collides with a real symbol: 2-bit and 4-bit alphabets
/// use codes `0..16`, and the 8-bit single-string path identifies the
/// primary slot positionally rather than by marker value.
pub const DOLLAR: u8 = 0xFF;

/// BWT construction parameters
///
/// Two memory envelopes drive the shape of the pipeline: `host_memory` caps
/// the outer collection stage (it sizes super-blocks of buckets), while
/// `device_memory` caps the inner sorting stage (it sizes the blocks handed
/// to the radix sorter).
///
/// # Example
///
/// ```
/// use bwtk::BWTParams;
///
/// let params = BWTParams::default()
///     .with_host_memory(1024 * 1024 * 1024)
///     .with_device_memory(256 * 1024 * 1024);
/// assert!(params.max_block_suffixes() > 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BWTParams {
    /// Cap on outer-pipeline scratch, in bytes; sizes super-blocks
    pub host_memory: u64,
    /// Cap on inner-sorter scratch, in bytes; sizes sub-blocks
    pub device_memory: u64,
}

impl Default for BWTParams {
    fn default() -> Self {
        Self {
            host_memory: 8 * 1024 * 1024 * 1024,
            device_memory: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Bytes reserved out of `host_memory` for bucket counters
const COUNTER_RESERVE: u64 = 128 * 1024 * 1024;

impl BWTParams {
    /// Builder-style override of the outer memory envelope
    pub fn with_host_memory(mut self, bytes: u64) -> Self {
        self.host_memory = bytes;
        self
    }

    /// Builder-style override of the inner memory envelope
    pub fn with_device_memory(mut self, bytes: u64) -> Self {
        self.device_memory = bytes;
        self
    }

    /// Maximum number of suffixes collected into one super-block.
    ///
    /// Each collected suffix occupies 8 bytes of host scratch; 128 MiB are
    /// reserved for the bucket counters.
    pub fn max_super_block_suffixes(&self) -> u64 {
        (self.host_memory.saturating_sub(COUNTER_RESERVE) / 8).max(1)
    }

    /// Maximum number of suffixes handed to the block sorter at once.
    ///
    /// The sorter's scratch costs 32 bytes per suffix.
    pub fn max_block_suffixes(&self) -> u64 {
        (self.device_memory / 32).max(1)
    }
}

/// A suffix of a string set, identified by string index and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetSuffix {
    /// Index of the string within the set
    pub string: u32,
    /// Offset of the suffix start within that string
    pub offset: u32,
}

impl SetSuffix {
    /// Create a suffix identifier
    #[inline]
    pub fn new(string: u32, offset: u32) -> Self {
        Self { string, offset }
    }
}

/// Cooperative cancellation flag shared between a caller and the
/// orchestrators.
///
/// Orchestrators poll the token at stage boundaries only; a cancelled run
/// returns [`BwtError::Cancelled`](crate::BwtError::Cancelled) after
/// releasing its scratch buffers. Partial sink output is not rewound.
///
/// # Example
///
/// ```
/// use bwtk::CancelToken;
///
/// let token = CancelToken::new();
/// let shared = token.clone();
/// assert!(!shared.is_cancelled());
/// token.cancel();
/// assert!(shared.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Encode an ASCII DNA base into its 2-bit code (`A=0, C=1, G=2, T=3`).
///
/// Lowercase bases are accepted. Ambiguity codes (`N`, IUPAC letters) map
/// to `A`, matching the usual convention of read aligners indexing over the
/// concrete alphabet.
#[inline]
pub fn encode_dna(base: u8) -> u8 {
    match base {
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' | b'U' | b'u' => 3,
        _ => 0,
    }
}

/// Decode a 2-bit DNA code back to its ASCII base
#[inline]
pub fn decode_dna(code: u8) -> u8 {
    match code & 3 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// Complement of a 2-bit DNA code
#[inline]
pub fn complement(code: u8) -> u8 {
    3 - (code & 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults() {
        let params = BWTParams::default();
        assert_eq!(params.host_memory, 8 * 1024 * 1024 * 1024);
        assert_eq!(params.device_memory, 2 * 1024 * 1024 * 1024);
        assert_eq!(params.max_block_suffixes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_params_never_zero() {
        let params = BWTParams::default()
            .with_host_memory(0)
            .with_device_memory(0);
        assert_eq!(params.max_super_block_suffixes(), 1);
        assert_eq!(params.max_block_suffixes(), 1);
    }

    #[test]
    fn test_dna_codes() {
        for (base, code) in [(b'A', 0), (b'C', 1), (b'G', 2), (b'T', 3)] {
            assert_eq!(encode_dna(base), code);
            assert_eq!(encode_dna(base.to_ascii_lowercase()), code);
            assert_eq!(decode_dna(code), base);
        }
        assert_eq!(encode_dna(b'N'), 0);
        assert_eq!(complement(0), 3);
        assert_eq!(complement(1), 2);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        token.cancel();
        assert!(other.is_cancelled());
    }
}
