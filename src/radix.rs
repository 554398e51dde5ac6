//! Radix key extraction
//!
//! Turns suffix positions into fixed-width sort keys. A key packs the next
//! few symbols of the suffix msb-first and reserves its low bits for the
//! clamped distance to the first `$`, so that unsigned comparison of keys
//! agrees with lexicographic suffix order under `$ <` every symbol.
//!
//! Keys come in two widths:
//!
//! - full 32-bit radix words, consumed by the block sorter one word depth
//!   at a time;
//! - `K`-bit bucket keys (`K` = 16, 20, or 24), the first-level partition
//!   used by both orchestrators.

use crate::packed::{PackedSet, Text};
use crate::types::SetSuffix;

/// Width of a radix word, in bits
pub const WORD_BITS: u32 = 32;

/// Bits reserved at the bottom of every key for the dollar distance field
pub const DOLLAR_BITS: u32 = 4;

/// All-ones dollar field: the `$` lies strictly beyond the key's symbols
pub const DOLLAR_FIELD_MASK: u32 = (1 << DOLLAR_BITS) - 1;

/// Symbols encoded per full radix word for a given symbol width
#[inline]
pub fn symbols_per_word(symbol_bits: u32) -> u32 {
    (WORD_BITS - DOLLAR_BITS) / symbol_bits
}

/// Number of radix words needed to cover a suffix of `len` symbols plus its
/// terminating `$`
#[inline]
pub fn radix_words_for(len: u32, symbol_bits: u32) -> u32 {
    let spw = symbols_per_word(symbol_bits);
    (len + spw) / spw
}

/// Number of buckets for a bucketing width
#[inline]
pub fn bucket_count(bucketing_bits: u32) -> usize {
    1usize << bucketing_bits
}

/// Whether a bucket key marks a short-string bucket: its suffixes all reach
/// their `$` within the bucket's symbol prefix and are therefore mutually
/// equal
#[inline]
pub fn is_short_bucket(bucket: u32) -> bool {
    bucket & DOLLAR_FIELD_MASK != DOLLAR_FIELD_MASK
}

/// Extract a key of `n_sym` symbols starting at `start` in a string of
/// `len` symbols whose `$` sits at position `len`.
///
/// `total_bits` is the full key width, `n_sym * symbol_bits + DOLLAR_BITS`.
#[inline]
fn window_key<F>(sym_at: F, len: u64, start: u64, n_sym: u32, symbol_bits: u32, total_bits: u32) -> u32
where
    F: Fn(u64) -> u8,
{
    let mut key = 0u32;
    for j in 0..n_sym {
        let pos = start + u64::from(j);
        let sym = if pos < len { sym_at(pos) } else { 0 };
        key |= u32::from(sym) << (total_bits - symbol_bits * (j + 1));
    }
    // distance from the window start to the $, saturated once it falls
    // outside the window
    let dist = if start >= len {
        0
    } else if len - start < u64::from(n_sym) {
        (len - start) as u32
    } else {
        DOLLAR_FIELD_MASK
    };
    key | dist
}

/// Radix word `word_idx` of the suffix of `text` starting at `suffix`
#[inline]
pub fn string_radix<T: Text>(text: &T, suffix: u32, word_idx: u32) -> u32 {
    let bits = text.symbol_bits();
    let n_sym = symbols_per_word(bits);
    let start = u64::from(suffix) + u64::from(word_idx) * u64::from(n_sym);
    window_key(
        |i| text.symbol(i),
        text.len(),
        start,
        n_sym,
        bits,
        n_sym * bits + DOLLAR_BITS,
    )
}

/// Bucket key of the suffix of `text` starting at `suffix`
#[inline]
pub fn string_bucket<T: Text>(text: &T, suffix: u32, bucketing_bits: u32) -> u32 {
    let bits = text.symbol_bits();
    let n_sym = (bucketing_bits - DOLLAR_BITS) / bits;
    window_key(
        |i| text.symbol(i),
        text.len(),
        u64::from(suffix),
        n_sym,
        bits,
        n_sym * bits + DOLLAR_BITS,
    )
}

/// Radix word `word_idx` of a string-set suffix
#[inline]
pub fn set_radix(set: &PackedSet, suffix: SetSuffix, word_idx: u32) -> u32 {
    let bits = set.symbol_bits();
    let n_sym = symbols_per_word(bits);
    let start = u64::from(suffix.offset) + u64::from(word_idx) * u64::from(n_sym);
    let k = suffix.string;
    window_key(
        |i| set.symbol(k, i as u32),
        u64::from(set.str_len(k)),
        start,
        n_sym,
        bits,
        n_sym * bits + DOLLAR_BITS,
    )
}

/// Bucket key of a string-set suffix
#[inline]
pub fn set_bucket(set: &PackedSet, suffix: SetSuffix, bucketing_bits: u32) -> u32 {
    let bits = set.symbol_bits();
    let n_sym = (bucketing_bits - DOLLAR_BITS) / bits;
    let k = suffix.string;
    window_key(
        |i| set.symbol(k, i as u32),
        u64::from(set.str_len(k)),
        u64::from(suffix.offset),
        n_sym,
        bits,
        n_sym * bits + DOLLAR_BITS,
    )
}
