//! Difference cover sampler
//!
//! A periodic sample of suffix positions whose ranks, once computed, give a
//! constant-time total order on arbitrary suffixes of one string: for any
//! two positions `p` and `q` there is a shift `delta < period` landing both
//! on sampled positions, so comparing at most `delta` symbols and then two
//! precomputed ranks decides the order. The block sorter uses this as its
//! tie-breaking oracle, which makes suffix sorting insensitive to long
//! repeats.
//!
//! Construction sorts the sampled suffixes themselves: a radix pass over
//! the first `period` symbols seeds initial names, and groups the radix
//! pass leaves tied are refined by rank doubling (each round doubles the
//! compared prefix by pairing a sample's rank with the rank one period
//! further in, which is again a sample). The doubling round count is capped
//! at `ceil(log2 N)`; exceeding the cap fails construction.

use crate::error::{BwtError, Result};
use crate::packed::Text;
use crate::sort::{BlockSorter, StringSuffixes};
use log::debug;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Difference cover modulo 32: every residue of `Z_32` is a difference of
/// two members
const DC_32: [u32; 7] = [0, 1, 2, 3, 7, 11, 19];

/// Difference cover modulo 64
const DC_64: [u32; 9] = [1, 2, 3, 6, 15, 17, 35, 43, 60];

/// Texts below this size use the small sampling period
const SMALL_TEXT: u64 = 16 * 1024 * 1024;

/// Residue marker for positions outside the cover
const NOT_SAMPLED: u8 = 0xFF;

/// A built difference cover sampler over one string
///
/// Owned by a single construction job and immutable once built; the string
/// itself is borrowed again at query time.
pub struct Dcs {
    period: u32,
    dc: &'static [u32],
    pos_in_dc: Vec<u8>,
    delta: Vec<u16>,
    ranks: Vec<u32>,
    n: u64,
}

impl Dcs {
    /// The sampling period chosen for a text of `n` symbols
    pub fn period_for(n: u64) -> u32 {
        if n < SMALL_TEXT {
            32
        } else {
            64
        }
    }

    /// Build the sampler for `text`
    ///
    /// Cost is dominated by one radix sort of the sample (about `9/64` of
    /// the text at the large period) plus the doubling rounds repeats
    /// require.
    pub fn build<T: Text>(text: &T) -> Result<Self> {
        let n = text.len();
        let period = Self::period_for(n);
        let dc: &'static [u32] = if period == 32 { &DC_32 } else { &DC_64 };

        let mut pos_in_dc = vec![NOT_SAMPLED; period as usize];
        for (i, &d) in dc.iter().enumerate() {
            pos_in_dc[d as usize] = i as u8;
        }

        let mut dcs = Self {
            period,
            dc,
            pos_in_dc,
            delta: build_delta_table(period, dc),
            ranks: Vec::new(),
            n,
        };

        // enumerate sampled positions in ascending order
        let mut samples: Vec<u32> = Vec::with_capacity((n / u64::from(period) + 1) as usize * dc.len());
        let mut base = 0u64;
        while base < n {
            for &d in dc {
                let p = base + u64::from(d);
                if p < n {
                    samples.push(p as u32);
                }
            }
            base += u64::from(period);
        }

        let m = samples.len();
        if m <= 1 {
            dcs.ranks = vec![0; m];
            return Ok(dcs);
        }

        // seed names with a radix sort over the first `period` symbols
        let spw = crate::radix::symbols_per_word(text.symbol_bits());
        let depth = (period + spw - 1) / spw;
        let mut order = samples.clone();
        let mut sorter = BlockSorter::with_capacity(m);
        let delayed = sorter.sort(&StringSuffixes { text }, &mut order, depth)?;

        let mut group = vec![0u32; m];
        for (i, g) in group.iter_mut().enumerate() {
            *g = i as u32;
        }
        for range in &delayed {
            for g in &mut group[range.clone()] {
                *g = range.start as u32;
            }
        }

        let mut ranks = vec![0u32; m];
        for (i, &p) in order.iter().enumerate() {
            ranks[dcs.sample_index(u64::from(p))] = group[i];
        }

        let mut unresolved = !delayed.is_empty();
        drop(delayed);

        // rank doubling over tied groups; stride in sample indices is
        // |dc| per period of text
        let round_limit = 64 - n.max(2).leading_zeros();
        let mut round = 0u32;
        let mut span = u64::from(period);
        while unresolved {
            if round >= round_limit {
                return Err(BwtError::ConstructionLimit {
                    rounds: round_limit,
                });
            }

            let idx_stride = dc.len() * (1usize << round);
            let mut keyed: Vec<(u64, u32)> = (0..m as u32)
                .into_par_iter()
                .map(|i| {
                    let next = if u64::from(samples[i as usize]) + span < n {
                        u64::from(ranks_at(&ranks, i as usize + idx_stride)) + 1
                    } else {
                        0
                    };
                    let key = (u64::from(ranks[i as usize]) + 1) << 32 | next;
                    (key, i)
                })
                .collect();
            keyed.par_sort_unstable();

            unresolved = false;
            let mut group_start = 0usize;
            for i in 0..m {
                if i > 0 && keyed[i].0 != keyed[i - 1].0 {
                    group_start = i;
                } else if i > 0 {
                    unresolved = true;
                }
                ranks[keyed[i].1 as usize] = group_start as u32;
            }

            span *= 2;
            round += 1;
        }

        debug!(
            "difference cover built: period {}, {} samples, {} doubling rounds",
            period, m, round
        );

        dcs.ranks = ranks;
        Ok(dcs)
    }

    /// The sampling period `v`
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Index of a sampled position within the rank array
    #[inline]
    fn sample_index(&self, p: u64) -> usize {
        let v = u64::from(self.period);
        let slot = self.pos_in_dc[(p % v) as usize];
        debug_assert_ne!(slot, NOT_SAMPLED, "position {} is not sampled", p);
        (p / v) as usize * self.dc.len() + slot as usize
    }

    /// Compare the suffixes of `text` starting at `p` and `q`.
    ///
    /// At most `period` symbols are inspected before the precomputed sample
    /// ranks decide; total work is bounded by the period regardless of the
    /// longest common prefix.
    pub fn compare<T: Text>(&self, text: &T, p: u32, q: u32) -> Ordering {
        if p == q {
            return Ordering::Equal;
        }
        let n = self.n;
        let v = u64::from(self.period);
        let (p, q) = (u64::from(p), u64::from(q));
        let delta = u64::from(self.delta[((p % v) * v + q % v) as usize]);

        for j in 0..delta {
            let (a, b) = (p + j, q + j);
            match (a >= n, b >= n) {
                (true, true) => unreachable!("distinct suffixes exhausted together"),
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                (false, false) => match text.symbol(a).cmp(&text.symbol(b)) {
                    Ordering::Equal => {}
                    other => return other,
                },
            }
        }

        let (a, b) = (p + delta, q + delta);
        match (a >= n, b >= n) {
            (true, true) => (n - p).cmp(&(n - q)),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.ranks[self.sample_index(a)].cmp(&self.ranks[self.sample_index(b)]),
        }
    }
}

#[inline]
fn ranks_at(ranks: &[u32], i: usize) -> u32 {
    debug_assert!(i < ranks.len(), "sample stride left the rank array");
    ranks[i]
}

/// For every residue pair `(a, b)`, the smallest shift landing both on the
/// cover
fn build_delta_table(period: u32, dc: &[u32]) -> Vec<u16> {
    let v = period as usize;
    let mut in_dc = vec![false; v];
    for &d in dc {
        in_dc[d as usize] = true;
    }

    let mut table = vec![0u16; v * v];
    for a in 0..v {
        for b in 0..v {
            let delta = (0..v)
                .find(|&d| in_dc[(a + d) % v] && in_dc[(b + d) % v])
                .expect("difference cover property violated");
            table[a * v + b] = delta as u16;
        }
    }
    table
}
