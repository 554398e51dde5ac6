//! BWT construction orchestrators
//!
//! Two pipelines share the lower layers: [`string`] builds the BWT of one
//! long text under a working-memory budget, and [`set`] builds the BWT of
//! a concatenated collection of short strings with an out-of-core
//! collect/sort loop. [`invert`] provides the reverse transforms used by
//! the round-trip tests and by consumers that need to recover input
//! sequences.

pub mod invert;
pub mod set;
pub mod string;

pub use invert::{invert_bwt, invert_set_bwt};
pub use set::{bwt_of_set, PrimaryMap, SetBwt};
pub use string::{bwt_of_string, bwt_of_string_with_ssa, StringBwt};

use crate::error::Result;
use crate::packed::Text;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Consumer of sorted suffix batches produced by the blockwise sorter
///
/// Batches arrive in destination-slot order. `process_scattered` exists for
/// consumers that also accept sparse slot assignments; the blockwise
/// pipeline emits contiguous batches.
pub trait SuffixHandler {
    /// Process the next contiguous batch of sorted suffixes
    fn process_batch(&mut self, suffixes: &[u32]) -> Result<()>;

    /// Process a sparse set of suffixes together with their destination
    /// slots
    fn process_scattered(&mut self, suffixes: &[u32], slots: &[u64]) -> Result<()>;
}

/// Dollar-aware comparison of two suffixes of `text`
pub(crate) fn suffix_cmp<T: Text>(text: &T, a: u64, b: u64) -> Ordering {
    let n = text.len();
    let (mut i, mut j) = (a, b);
    loop {
        match (i >= n, j >= n) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        match text.symbol(i).cmp(&text.symbol(j)) {
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            other => return other,
        }
    }
}

/// Position of the primary suffix of `text` in the sorted suffix order of
/// `text$`.
///
/// Computed by direct counting of the suffixes lexicographically below the
/// whole string; cost is one comparison per suffix, so this is an oracle
/// for tests and small inputs rather than part of the construction path.
pub fn find_primary<T: Text>(text: &T) -> Result<u64> {
    let n = text.len();
    let below = (1..n)
        .into_par_iter()
        .filter(|&p| suffix_cmp(text, p, 0) == Ordering::Less)
        .count() as u64;
    Ok(below + 1)
}
