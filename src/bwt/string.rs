//! Single-string blockwise BWT construction
//!
//! Sorts the suffixes of one long text bucket by bucket so that only a
//! bounded slice of the suffix array is ever materialized. A difference
//! cover sampler makes the per-bucket sorts insensitive to long repeats;
//! the bucketing width starts at 16 bits and widens to 20 and 24 before a
//! memory-budget failure is surfaced.

use crate::bwt::SuffixHandler;
use crate::dcs::Dcs;
use crate::error::{BwtError, Result};
use crate::packed::Text;
use crate::radix::{bucket_count, string_bucket, symbols_per_word};
use crate::sort::{BlockSorter, StringSuffixes};
use crate::types::{BWTParams, CancelToken, DOLLAR};
use log::{debug, info};
use rayon::prelude::*;
use std::time::Instant;

/// Bucketing widths tried in order before giving up
const BUCKETING_WIDTHS: [u32; 3] = [16, 20, 24];

/// Positions scanned per parallel counting/collection task
const SCAN_CHUNK: u32 = 4 * 1024 * 1024;

/// Symbols moved per step of the dollar-removal shift
const SHIFT_CHUNK: usize = 32 * 1024 * 1024;

/// Single-string BWT builder
///
/// # Example
///
/// ```
/// use bwtk::bwt::StringBwt;
/// use bwtk::packed::ByteText;
/// use bwtk::BWTParams;
///
/// let (bwt, primary) = StringBwt::new(BWTParams::default())
///     .run(&ByteText(b"banana"))
///     .unwrap();
/// assert_eq!(primary, 4);
/// // re-inserting the $ at `primary` yields "annb$aa"
/// assert_eq!(&bwt, b"annbaa");
/// ```
pub struct StringBwt {
    params: BWTParams,
    cancel: Option<CancelToken>,
}

impl StringBwt {
    /// Create a builder with the given memory envelopes
    pub fn new(params: BWTParams) -> Self {
        Self {
            params,
            cancel: None,
        }
    }

    /// Attach a cooperative cancellation token
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the BWT of `text$`.
    ///
    /// Returns the `N` BWT symbols with the `$` already removed, plus the
    /// primary: the slot the `$` occupied, in `[0, N]`.
    pub fn run<T: Text>(&self, text: &T) -> Result<(Vec<u8>, u64)> {
        let mut ssa = None;
        let bwt = self.run_inner(text, 0, &mut ssa)?;
        Ok((bwt.0, bwt.1))
    }

    /// Build the BWT together with a sampled suffix array.
    ///
    /// Every `ssa_mod`-th destination slot (a power of two) records the
    /// suffix placed there; the implicit empty suffix is recorded as
    /// `u32::MAX`. The sample indexes the suffix order of `text$`, before
    /// dollar removal.
    pub fn run_with_ssa<T: Text>(
        &self,
        text: &T,
        ssa_mod: u32,
    ) -> Result<(Vec<u8>, u64, Vec<u32>)> {
        assert!(
            ssa_mod.is_power_of_two(),
            "SSA sampling interval must be a power of two"
        );
        let mut ssa = Some(Vec::new());
        let (bwt, primary) = self.run_inner(text, ssa_mod, &mut ssa)?;
        Ok((bwt, primary, ssa.expect("SSA requested")))
    }

    fn run_inner<T: Text>(
        &self,
        text: &T,
        ssa_mod: u32,
        ssa: &mut Option<Vec<u32>>,
    ) -> Result<(Vec<u8>, u64)> {
        let n = text.len();
        if n == 0 {
            if let Some(ssa) = ssa.as_mut() {
                ssa.push(u32::MAX);
            }
            return Ok((Vec::new(), 0));
        }
        if n > u64::from(u32::MAX) {
            return Err(BwtError::InputFormat {
                line: 0,
                msg: format!("text of {} symbols exceeds the 2^32-1 limit", n),
            });
        }

        let start = Instant::now();
        let dcs = Dcs::build(text)?;
        info!(
            "difference cover ready in {:.1}s (period {})",
            start.elapsed().as_secs_f64(),
            dcs.period()
        );
        self.check_cancelled()?;

        for (attempt, &k_bits) in BUCKETING_WIDTHS.iter().enumerate() {
            match self.attempt(text, &dcs, k_bits, ssa_mod, ssa) {
                Err(BwtError::MemoryBudget { bucket, size, .. })
                    if attempt + 1 < BUCKETING_WIDTHS.len() =>
                {
                    debug!(
                        "{}-bit bucketing: bucket {} holds {} suffixes, widening",
                        k_bits, bucket, size
                    );
                }
                other => return other,
            }
        }
        unreachable!("the widest bucketing either succeeds or surfaces its error")
    }

    fn attempt<T: Text>(
        &self,
        text: &T,
        dcs: &Dcs,
        k_bits: u32,
        ssa_mod: u32,
        ssa: &mut Option<Vec<u32>>,
    ) -> Result<(Vec<u8>, u64)> {
        let n = text.len() as u32;
        let n_buckets = bucket_count(k_bits);
        let max_block = self.params.max_block_suffixes();
        let max_super_block = self.params.max_super_block_suffixes();

        // counting stage
        let count_start = Instant::now();
        let histogram = count_buckets(text, n, k_bits, n_buckets);
        debug_assert_eq!(histogram.iter().map(|&c| u64::from(c)).sum::<u64>(), u64::from(n));

        if let Some((bucket, &size)) = histogram
            .iter()
            .enumerate()
            .max_by_key(|&(_, &size)| size)
        {
            debug!(
                "{}-bit bucketing: counted in {:.1}s, largest bucket {} of {}",
                k_bits,
                count_start.elapsed().as_secs_f64(),
                bucket,
                size
            );
            if u64::from(size) > max_block {
                return Err(BwtError::MemoryBudget {
                    bucket: bucket as u32,
                    size,
                    required_mib: (u64::from(size) * 32).div_ceil(1024 * 1024),
                });
            }
        }
        self.check_cancelled()?;

        // one canonical prefix sum gives every bucket its destination range
        let mut bucket_offsets = vec![0u64; n_buckets + 1];
        for b in 0..n_buckets {
            bucket_offsets[b + 1] = bucket_offsets[b] + u64::from(histogram[b]);
        }

        let mut out = vec![0u8; n as usize + 1];
        // the first BWT symbol is the predecessor of the implicit empty
        // suffix
        out[0] = text.symbol(u64::from(n) - 1);
        if let Some(ssa) = ssa.as_mut() {
            ssa.clear();
            ssa.resize((n as usize + 1).div_ceil(ssa_mod.max(1) as usize), 0);
            ssa[0] = u32::MAX;
        }

        let mut handler = StringBwtHandler {
            text,
            out: &mut out,
            primary: None,
            n_output: 0,
            ssa_mod,
            ssa: ssa.as_mut(),
        };

        let mut sorter = BlockSorter::with_capacity(max_block.min(u64::from(n)) as usize);
        let depth = (dcs.period() + symbols_per_word(text.symbol_bits()) - 1)
            / symbols_per_word(text.symbol_bits());

        let sort_start = Instant::now();
        let mut running = bucket_offsets.clone();
        let mut bucket_begin = 0usize;
        while bucket_begin < n_buckets {
            // grow the super-block while it fits the outer envelope
            let mut bucket_end = bucket_begin;
            let mut total = 0u64;
            while bucket_end < n_buckets {
                let size = u64::from(histogram[bucket_end]);
                if total + size > max_super_block && total > 0 {
                    break;
                }
                total += size;
                bucket_end += 1;
            }
            if total > max_super_block {
                return Err(BwtError::BufferOverflow {
                    needed: total,
                    capacity: max_super_block,
                });
            }

            self.check_cancelled()?;
            self.collect_and_sort(
                text,
                dcs,
                k_bits,
                depth,
                &histogram,
                &mut running,
                bucket_begin..bucket_end,
                total,
                &mut sorter,
                &mut handler,
            )?;

            bucket_begin = bucket_end;
        }

        let primary = handler
            .primary
            .expect("suffix 0 was sorted, so the $ slot is known");
        info!(
            "sorted {} suffixes in {:.1}s ({}-bit buckets)",
            n,
            sort_start.elapsed().as_secs_f64(),
            k_bits
        );

        // remove the dollar: shift the tail left by one, in bounded chunks
        let mut begin = primary as usize;
        let end = n as usize;
        while begin < end {
            let stop = (begin + SHIFT_CHUNK).min(end);
            out.copy_within(begin + 1..stop + 1, begin);
            begin = stop;
        }
        out.truncate(n as usize);

        Ok((out, primary))
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_and_sort<T: Text>(
        &self,
        text: &T,
        dcs: &Dcs,
        k_bits: u32,
        depth: u32,
        histogram: &[u32],
        running: &mut [u64],
        buckets: std::ops::Range<usize>,
        total: u64,
        sorter: &mut BlockSorter,
        handler: &mut StringBwtHandler<'_, T>,
    ) -> Result<()> {
        let n = text.len() as u32;
        let base = running[buckets.start];
        let mut buf = vec![0u32; total as usize];

        // collection: parallel scan per chunk, deterministic sequential
        // scatter through the running per-bucket offsets
        let mut chunk_begin = 0u32;
        while chunk_begin < n {
            let chunk_end = chunk_begin.saturating_add(SCAN_CHUNK).min(n);
            let collected: Vec<(u32, u32)> = (chunk_begin..chunk_end)
                .into_par_iter()
                .filter_map(|p| {
                    let bucket = string_bucket(text, p, k_bits) as usize;
                    if buckets.contains(&bucket) {
                        Some((bucket as u32, p))
                    } else {
                        None
                    }
                })
                .collect();
            for (bucket, p) in collected {
                let slot = running[bucket as usize];
                running[bucket as usize] += 1;
                buf[(slot - base) as usize] = p;
            }
            chunk_begin = chunk_end;
        }

        // per-bucket sort and emission, in destination order
        let mut cursor = 0usize;
        for bucket in buckets {
            let count = histogram[bucket] as usize;
            if count == 0 {
                continue;
            }
            let slice = &mut buf[cursor..cursor + count];
            sorter.sort_with_oracle(&StringSuffixes { text }, slice, depth, |a, b| {
                dcs.compare(text, a, b)
            })?;
            handler.process_batch(slice)?;
            cursor += count;
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(BwtError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Convenience wrapper around [`StringBwt::run`]
pub fn bwt_of_string<T: Text>(text: &T, params: &BWTParams) -> Result<(Vec<u8>, u64)> {
    StringBwt::new(*params).run(text)
}

/// Convenience wrapper around [`StringBwt::run_with_ssa`]
pub fn bwt_of_string_with_ssa<T: Text>(
    text: &T,
    ssa_mod: u32,
    params: &BWTParams,
) -> Result<(Vec<u8>, u64, Vec<u32>)> {
    StringBwt::new(*params).run_with_ssa(text, ssa_mod)
}

/// Accumulates BWT symbols (and optionally SSA entries) from sorted suffix
/// batches
struct StringBwtHandler<'a, T: Text> {
    text: &'a T,
    out: &'a mut Vec<u8>,
    primary: Option<u64>,
    n_output: u64,
    ssa_mod: u32,
    ssa: Option<&'a mut Vec<u32>>,
}

impl<T: Text> StringBwtHandler<'_, T> {
    fn record_ssa(&mut self, suffixes: &[u32], base_slot: u64) {
        if let Some(ssa) = self.ssa.as_mut() {
            let mask = u64::from(self.ssa_mod) - 1;
            for (i, &p) in suffixes.iter().enumerate() {
                let slot = base_slot + i as u64;
                if slot & mask == 0 {
                    ssa[(slot / u64::from(self.ssa_mod)) as usize] = p;
                }
            }
        }
    }
}

impl<T: Text> SuffixHandler for StringBwtHandler<'_, T> {
    fn process_batch(&mut self, suffixes: &[u32]) -> Result<()> {
        let base = self.n_output + 1; // slot 0 is the empty suffix
        let text = self.text;
        let symbols: Vec<u8> = suffixes
            .par_iter()
            .map(|&p| {
                if p == 0 {
                    DOLLAR
                } else {
                    text.symbol(u64::from(p) - 1)
                }
            })
            .collect();

        if let Some(i) = suffixes.iter().position(|&p| p == 0) {
            self.primary = Some(base + i as u64);
        }

        self.out[base as usize..base as usize + symbols.len()].copy_from_slice(&symbols);
        self.record_ssa(suffixes, base);
        self.n_output += suffixes.len() as u64;
        Ok(())
    }

    fn process_scattered(&mut self, suffixes: &[u32], slots: &[u64]) -> Result<()> {
        for (&p, &slot) in suffixes.iter().zip(slots) {
            let dest = slot + 1;
            self.out[dest as usize] = if p == 0 {
                self.primary = Some(dest);
                DOLLAR
            } else {
                self.text.symbol(u64::from(p) - 1)
            };
            if let Some(ssa) = self.ssa.as_mut() {
                if dest & (u64::from(self.ssa_mod) - 1) == 0 {
                    ssa[(dest / u64::from(self.ssa_mod)) as usize] = p;
                }
            }
        }
        Ok(())
    }
}

/// Compute bucket occupancy for every suffix of `text`
fn count_buckets<T: Text>(text: &T, n: u32, k_bits: u32, n_buckets: usize) -> Vec<u32> {
    let n_chunks = n.div_ceil(SCAN_CHUNK).max(1);
    (0..n_chunks)
        .into_par_iter()
        .map(|c| {
            let begin = c * SCAN_CHUNK;
            let end = begin.saturating_add(SCAN_CHUNK).min(n);
            let mut local = vec![0u32; n_buckets];
            for p in begin..end {
                local[string_bucket(text, p, k_bits) as usize] += 1;
            }
            local
        })
        .reduce(
            || vec![0u32; n_buckets],
            |mut acc, local| {
                for (a, l) in acc.iter_mut().zip(local) {
                    *a += l;
                }
                acc
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::{ByteText, Endianness, PackedBuf};

    fn naive_bwt(text: &[u8]) -> (Vec<u8>, u64) {
        let n = text.len();
        let mut rows: Vec<usize> = (0..=n).collect();
        rows.sort_by(|&a, &b| {
            // compare suffixes of text$, dollar smallest
            let sa = &text[a.min(n)..];
            let sb = &text[b.min(n)..];
            sa.cmp(sb)
        });
        let mut bwt = Vec::with_capacity(n);
        let mut primary = 0;
        for (slot, &row) in rows.iter().enumerate() {
            if row == 0 {
                primary = slot as u64;
            } else {
                bwt.push(text[row - 1]);
            }
        }
        (bwt, primary)
    }

    fn dna(codes: &[u8]) -> PackedBuf {
        PackedBuf::from_codes(codes, 2, Endianness::Little)
    }

    #[test]
    fn test_banana() {
        let (bwt, primary) = bwt_of_string(&ByteText(b"banana"), &BWTParams::default()).unwrap();
        assert_eq!(primary, 4);
        assert_eq!(&bwt, b"annbaa");
    }

    #[test]
    fn test_acgtacgt() {
        // BWT of "ACGTACGT$" is "TT$AACCGG" with the $ at slot 2
        let codes: Vec<u8> = b"ACGTACGT".iter().map(|&b| crate::types::encode_dna(b)).collect();
        let text = dna(&codes);
        let (bwt, primary) = bwt_of_string(&text, &BWTParams::default()).unwrap();
        assert_eq!(primary, 2);
        let ascii: Vec<u8> = bwt.iter().map(|&c| crate::types::decode_dna(c)).collect();
        assert_eq!(&ascii, b"TTAACCGG");
    }

    #[test]
    fn test_all_equal() {
        let text = dna(&[0u8; 8]);
        let (bwt, primary) = bwt_of_string(&text, &BWTParams::default()).unwrap();
        assert_eq!(primary, 8);
        assert_eq!(bwt, vec![0u8; 8]);
    }

    #[test]
    fn test_empty_text() {
        let (bwt, primary) = bwt_of_string(&ByteText(b""), &BWTParams::default()).unwrap();
        assert!(bwt.is_empty());
        assert_eq!(primary, 0);
    }

    #[test]
    fn test_single_symbol() {
        let (bwt, primary) = bwt_of_string(&ByteText(b"x"), &BWTParams::default()).unwrap();
        assert_eq!(bwt, b"x");
        assert_eq!(primary, 1);
    }

    #[test]
    fn test_matches_naive_on_random_bytes() {
        let mut state = 0x1234_5678u32;
        let text: Vec<u8> = (0..500)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect();
        let (bwt, primary) = bwt_of_string(&ByteText(&text), &BWTParams::default()).unwrap();
        let (expect_bwt, expect_primary) = naive_bwt(&text);
        assert_eq!(primary, expect_primary);
        assert_eq!(bwt, expect_bwt);
    }

    #[test]
    fn test_long_repeat_respects_budget() {
        // heavily repetitive text with tiny budgets still terminates and
        // matches the oracle
        let codes: Vec<u8> = (0..2000).map(|i| [0, 1, 2][(i / 600) % 3]).collect();
        let text = dna(&codes);
        let params = BWTParams::default()
            .with_host_memory(64 * 1024 * 1024)
            .with_device_memory(1024 * 1024);
        let (bwt, primary) = bwt_of_string(&text, &params).unwrap();
        let ascii: Vec<u8> = codes.iter().map(|&c| crate::types::decode_dna(c)).collect();
        let (expect_bwt, expect_primary) = naive_bwt(&ascii);
        let got_ascii: Vec<u8> = bwt.iter().map(|&c| crate::types::decode_dna(c)).collect();
        assert_eq!(primary, expect_primary);
        assert_eq!(got_ascii, expect_bwt);
    }

    #[test]
    fn test_ssa_sampling() {
        let text = ByteText(b"banana");
        let (_, primary, ssa) =
            bwt_of_string_with_ssa(&text, 2, &BWTParams::default()).unwrap();
        assert_eq!(primary, 4);
        // suffix order of banana$: [6($), 5, 3, 1, 0, 4, 2]; slots 0,2,4,6
        assert_eq!(ssa, vec![u32::MAX, 3, 0, 2]);
    }

    #[test]
    fn test_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let err = StringBwt::new(BWTParams::default())
            .with_cancel(token)
            .run(&ByteText(b"banana"))
            .unwrap_err();
        assert!(matches!(err, BwtError::Cancelled));
    }
}
