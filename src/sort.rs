//! Block sorter
//!
//! Sorts one bounded batch of suffixes by LSD radix passes over fixed-width
//! radix words: the deepest word is sorted first and every pass is stable,
//! so groups equal at a shallow depth keep the order established by the
//! deeper passes.
//!
//! Suffixes still tied after the requested depth either go to a *delay
//! list* of index ranges (radix-only mode) or are resolved in place by a
//! caller-provided comparison oracle, typically the difference cover
//! sampler.

use crate::error::{BwtError, Result};
use crate::packed::{PackedSet, Text};
use crate::radix::{set_radix, string_radix};
use crate::types::SetSuffix;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::ops::Range;

/// Source of radix words for the elements being sorted
pub trait RadixSource: Sync {
    /// Radix word `word_idx` for element `id`
    fn radix(&self, id: u32, word_idx: u32) -> u32;
}

/// Suffixes of a single text; element ids are suffix start positions
pub struct StringSuffixes<'a, T: Text> {
    /// The text whose suffixes are being sorted
    pub text: &'a T,
}

impl<T: Text> RadixSource for StringSuffixes<'_, T> {
    #[inline]
    fn radix(&self, id: u32, word_idx: u32) -> u32 {
        string_radix(self.text, id, word_idx)
    }
}

/// Suffixes of a string set; element ids index into a collected suffix list
pub struct SetSuffixes<'a> {
    /// The set the suffixes belong to
    pub set: &'a PackedSet,
    /// The collected suffix identifiers
    pub suffixes: &'a [SetSuffix],
}

impl RadixSource for SetSuffixes<'_> {
    #[inline]
    fn radix(&self, id: u32, word_idx: u32) -> u32 {
        set_radix(self.set, self.suffixes[id as usize], word_idx)
    }
}

/// Reusable sorter for bounded batches of suffixes
///
/// The capacity is fixed up front from the inner memory envelope; feeding a
/// larger batch is a tuning bug reported as
/// [`BwtError::BufferOverflow`].
pub struct BlockSorter {
    capacity: usize,
    pairs: Vec<(u32, u32)>,
}

impl BlockSorter {
    /// Create a sorter accepting at most `capacity` elements per batch
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            pairs: Vec::new(),
        }
    }

    /// The reserved batch capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sort `ids` by the first `depth` radix words of each element.
    ///
    /// Returns the delay list: maximal ranges of `ids` whose elements are
    /// still tied after `depth` words, in ascending order. Ties keep their
    /// input order (every pass is stable).
    pub fn sort<S: RadixSource>(
        &mut self,
        source: &S,
        ids: &mut [u32],
        depth: u32,
    ) -> Result<Vec<Range<usize>>> {
        let n = ids.len();
        if n > self.capacity {
            return Err(BwtError::BufferOverflow {
                needed: n as u64,
                capacity: self.capacity as u64,
            });
        }
        if n <= 1 {
            return Ok(Vec::new());
        }

        self.pairs.clear();
        self.pairs.resize(n, (0, 0));

        // LSD over words: deepest first, each pass stable
        for word_idx in (0..depth).rev() {
            self.pairs
                .par_iter_mut()
                .zip(ids.par_iter())
                .for_each(|(pair, &id)| *pair = (source.radix(id, word_idx), id));

            self.pairs.par_sort_by_key(|&(key, _)| key);

            ids.par_iter_mut()
                .zip(self.pairs.par_iter())
                .for_each(|(id, &(_, value))| *id = value);
        }

        Ok(tied_ranges(source, ids, depth))
    }

    /// Sort `ids` by `depth` radix words, then resolve every remaining tied
    /// group with `oracle`, a total order on element ids.
    pub fn sort_with_oracle<S, F>(
        &mut self,
        source: &S,
        ids: &mut [u32],
        depth: u32,
        oracle: F,
    ) -> Result<()>
    where
        S: RadixSource,
        F: Fn(u32, u32) -> Ordering + Sync,
    {
        let delayed = self.sort(source, ids, depth)?;
        for range in delayed {
            ids[range].sort_by(|&a, &b| oracle(a, b));
        }
        Ok(())
    }
}

/// Maximal runs of adjacent elements equal on all `depth` radix words
fn tied_ranges<S: RadixSource>(source: &S, ids: &[u32], depth: u32) -> Vec<Range<usize>> {
    let tied = |a: u32, b: u32| (0..depth).all(|w| source.radix(a, w) == source.radix(b, w));

    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=ids.len() {
        if i == ids.len() || !tied(ids[i - 1], ids[i]) {
            if i - start > 1 {
                ranges.push(start..i);
            }
            start = i;
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::{ByteText, Endianness, PackedBuf};
    use crate::radix::radix_words_for;

    fn dna_text(n: usize, seed: u32) -> PackedBuf {
        let mut state = seed;
        let codes: Vec<u8> = (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 30) as u8
            })
            .collect();
        PackedBuf::from_codes(&codes, 2, Endianness::Little)
    }

    fn naive_sorted(text: &PackedBuf) -> Vec<u32> {
        let n = text.len() as u32;
        let mut ids: Vec<u32> = (0..n).collect();
        ids.sort_by(|&a, &b| {
            let sa: Vec<u8> = text.range(u64::from(a), text.len()).collect();
            let sb: Vec<u8> = text.range(u64::from(b), text.len()).collect();
            sa.cmp(&sb)
        });
        ids
    }

    #[test]
    fn test_full_depth_sort_matches_naive() {
        let text = dna_text(200, 7);
        let depth = radix_words_for(200, 2);
        let mut ids: Vec<u32> = (0..200).collect();

        let mut sorter = BlockSorter::with_capacity(256);
        let delayed = sorter
            .sort(&StringSuffixes { text: &text }, &mut ids, depth)
            .unwrap();

        // all suffixes of a random string are distinct at full depth
        assert!(delayed.is_empty());
        assert_eq!(ids, naive_sorted(&text));
    }

    #[test]
    fn test_shallow_sort_delays_ties() {
        // all-equal text: one word of depth leaves everything tied except
        // the suffixes short enough to be separated by their dollar field
        let text = PackedBuf::from_codes(&[0u8; 64], 2, Endianness::Little);
        let mut ids: Vec<u32> = (0..64).collect();

        let mut sorter = BlockSorter::with_capacity(64);
        let delayed = sorter
            .sort(&StringSuffixes { text: &text }, &mut ids, 1)
            .unwrap();

        // the 51 suffixes of length >= 14 share one radix word; the 13
        // suffixes with an in-window dollar sort first, shortest first
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0], 13..64);
        for w in ids[..13].windows(2) {
            assert!(w[0] > w[1]);
        }
    }

    #[test]
    fn test_oracle_resolves_ties() {
        let text = PackedBuf::from_codes(&[0u8; 40], 2, Endianness::Little);
        let mut ids: Vec<u32> = (0..40).collect();

        let mut sorter = BlockSorter::with_capacity(64);
        sorter
            .sort_with_oracle(
                &StringSuffixes { text: &text },
                &mut ids,
                1,
                // a longer all-A suffix sorts after a shorter one, so the
                // suffix order is by descending start position
                |a, b| b.cmp(&a),
            )
            .unwrap();

        // shortest suffix (latest start) first
        let expect: Vec<u32> = (0..40).rev().collect();
        assert_eq!(ids, expect);
    }

    #[test]
    fn test_capacity_overflow() {
        let text = dna_text(10, 3);
        let mut ids: Vec<u32> = (0..10).collect();
        let mut sorter = BlockSorter::with_capacity(4);
        let err = sorter
            .sort(&StringSuffixes { text: &text }, &mut ids, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            BwtError::BufferOverflow {
                needed: 10,
                capacity: 4
            }
        ));
    }

    #[test]
    fn test_byte_alphabet_sort() {
        let text = ByteText(b"mississippi");
        let depth = radix_words_for(11, 8);
        let mut ids: Vec<u32> = (0..11).collect();
        let mut sorter = BlockSorter::with_capacity(16);
        sorter
            .sort(&StringSuffixes { text: &text }, &mut ids, depth)
            .unwrap();
        // suffix array of "mississippi"
        assert_eq!(ids, vec![10, 7, 4, 1, 0, 9, 8, 6, 3, 5, 2]);
    }

    #[test]
    fn test_stability_across_passes() {
        // two identical strings in a set: their equal suffixes must keep
        // collection order
        let mut set = crate::packed::PackedSet::new(2, Endianness::Little);
        set.push(&[0, 1, 2]);
        set.push(&[0, 1, 2]);
        let suffixes = vec![
            SetSuffix::new(0, 0),
            SetSuffix::new(1, 0),
            SetSuffix::new(0, 1),
            SetSuffix::new(1, 1),
        ];
        let mut ids: Vec<u32> = (0..4).collect();
        let mut sorter = BlockSorter::with_capacity(8);
        let delayed = sorter
            .sort(
                &SetSuffixes {
                    set: &set,
                    suffixes: &suffixes,
                },
                &mut ids,
                2,
            )
            .unwrap();

        // "AC$" of string 0 before "AC$" of string 1, both before "C$"s
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(delayed.len(), 2);
    }
}
