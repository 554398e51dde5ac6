//! String-set BWT construction
//!
//! Builds the BWT of a concatenated collection of short strings by
//! streaming the set through a bounded working set: a counting pass over
//! string chunks fills a global bucket histogram, then super-blocks of
//! buckets are collected into host scratch and sorted sub-block by
//! sub-block within the inner memory envelope.
//!
//! The bucketing width escalates from 16 to 20 to 24 bits when the
//! histogram shows a single long-string bucket exceeding the inner budget;
//! only after the widest attempt does the failure surface. Short-string
//! buckets, whose suffixes all reach their `$` inside the bucket prefix and
//! are therefore mutually equal, bypass the sorter entirely and are emitted
//! in collection order.
//!
//! For fixed input and parameters the emitted stream is bit-identical
//! across runs.

use crate::error::{BwtError, Result};
use crate::packed::PackedSet;
use crate::radix::{bucket_count, is_short_bucket, radix_words_for, set_bucket};
use crate::sink::BwtSink;
use crate::sort::{BlockSorter, SetSuffixes};
use crate::types::{BWTParams, CancelToken, SetSuffix, DOLLAR};
use log::{debug, info};
use rayon::prelude::*;
use std::io::Write;
use std::time::Instant;

/// Bucketing widths tried in order before giving up
const BUCKETING_WIDTHS: [u32; 3] = [16, 20, 24];

/// Strings streamed per chunk during counting and collection
const CHUNK_STRINGS: u32 = 128 * 1024;

/// Where each string's `$` token lies in the concatenated BWT
///
/// One entry per input string, sorted by position; every `string_id`
/// appears exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryMap {
    entries: Vec<(u64, u32)>,
}

impl PrimaryMap {
    /// Number of entries (equals the number of input strings)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `(position, string_id)` records, ascending by position
    pub fn entries(&self) -> &[(u64, u32)] {
        &self.entries
    }

    fn push(&mut self, position: u64, string_id: u32) {
        debug_assert!(
            self.entries.last().is_none_or(|&(p, _)| p < position),
            "primary map positions must be strictly increasing"
        );
        self.entries.push((position, string_id));
    }

    /// Write the ASCII form: a `#PRI` header line, then one
    /// `<position> <string_id>` line per record
    pub fn write_ascii<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(b"#PRI\n").map_err(BwtError::Sink)?;
        for &(position, string_id) in &self.entries {
            writeln!(writer, "{} {}", position, string_id).map_err(BwtError::Sink)?;
        }
        Ok(())
    }

    /// Write the binary form: a `PRIB` magic, then little-endian
    /// `{u64 position, u32 string_id}` records
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(b"PRIB").map_err(BwtError::Sink)?;
        for &(position, string_id) in &self.entries {
            writer
                .write_all(&position.to_le_bytes())
                .map_err(BwtError::Sink)?;
            writer
                .write_all(&string_id.to_le_bytes())
                .map_err(BwtError::Sink)?;
        }
        Ok(())
    }
}

/// String-set BWT builder
///
/// # Example
///
/// ```
/// use bwtk::bwt::SetBwt;
/// use bwtk::packed::{Endianness, PackedSet};
/// use bwtk::sink::BufferSink;
/// use bwtk::BWTParams;
///
/// let mut set = PackedSet::new(2, Endianness::Little);
/// set.push(&[0, 1]); // AC
/// set.push(&[2, 3]); // GT
///
/// let mut sink = BufferSink::new();
/// let map = SetBwt::new(BWTParams::default())
///     .run(&set, &mut sink)
///     .unwrap();
/// assert_eq!(sink.symbols().len(), 6);
/// assert_eq!(map.len(), 2);
/// ```
pub struct SetBwt {
    params: BWTParams,
    cancel: Option<CancelToken>,
}

impl SetBwt {
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

    /// Build the BWT of the set, streaming symbols to `sink`.
    ///
    /// Emits exactly `sum of string lengths + number of strings` symbols:
    /// first one predecessor-of-`$` symbol per string in string-index
    /// order, then the symbols of all sorted non-empty suffixes. Returns
    /// the primary map locating every `$` token.
    pub fn run(&self, set: &PackedSet, sink: &mut dyn BwtSink) -> Result<PrimaryMap> {
        set.validate()?;
        let m = set.len() as u64;
        let mut primary_map = PrimaryMap::default();
        if m == 0 {
            sink.finish()?;
            return Ok(primary_map);
        }
        if set.len() as u64 > u64::from(u32::MAX) || set.num_symbols() > u64::from(u32::MAX) {
            return Err(BwtError::InputFormat {
                line: 0,
                msg: "string set exceeds the 2^32-1 symbol/string limit".into(),
            });
        }

        let max_block = self.params.max_block_suffixes();
        let max_super_block = self.params.max_super_block_suffixes();

        // choose the bucketing width: re-count with a wider radix while a
        // long-string bucket overflows the inner envelope, then surface
        // the failure only once the widest width is exhausted
        let count_start = Instant::now();
        let mut chosen = None;
        for (attempt, &k_bits) in BUCKETING_WIDTHS.iter().enumerate() {
            let histogram = count_buckets(set, k_bits);
            debug_assert_eq!(
                histogram.iter().map(|&c| u64::from(c)).sum::<u64>(),
                set.num_symbols()
            );

            // a bucket too large for even a whole super-block is fatal at
            // any width
            if let Some((_, &size)) = histogram
                .iter()
                .enumerate()
                .find(|&(_, &size)| u64::from(size) > max_super_block)
            {
                return Err(BwtError::BufferOverflow {
                    needed: u64::from(size),
                    capacity: max_super_block,
                });
            }

            let worst = histogram
                .iter()
                .enumerate()
                .filter(|&(b, _)| !is_short_bucket(b as u32))
                .max_by_key(|&(_, &size)| size);
            match worst {
                Some((bucket, &size)) if u64::from(size) > max_block => {
                    let err = BwtError::MemoryBudget {
                        bucket: bucket as u32,
                        size,
                        required_mib: (u64::from(size) * 32).div_ceil(1024 * 1024),
                    };
                    if attempt + 1 == BUCKETING_WIDTHS.len() {
                        return Err(err);
                    }
                    debug!(
                        "{}-bit bucketing: bucket {} holds {} suffixes, widening",
                        k_bits, bucket, size
                    );
                }
                _ => {
                    chosen = Some((k_bits, histogram));
                    break;
                }
            }
        }
        let (k_bits, histogram) = chosen.expect("width chosen or error returned above");
        info!(
            "counted {} suffixes into {}-bit buckets in {:.1}s",
            set.num_symbols(),
            k_bits,
            count_start.elapsed().as_secs_f64()
        );
        self.check_cancelled()?;

        // the first m output slots carry the symbols preceding all the
        // dollar signs, in string-index order
        let prefix_block = (max_block / 4).clamp(1, u64::from(u32::MAX)) as u32;
        let mut block_begin = 0u32;
        while block_begin < set.len() as u32 {
            let block_end = block_begin.saturating_add(prefix_block).min(set.len() as u32);
            let symbols: Vec<u8> = (block_begin..block_end)
                .into_par_iter()
                .map(|k| set.last_symbol(k))
                .collect();
            sink.process(&symbols)?;
            block_begin = block_end;
        }
        self.check_cancelled()?;

        // one canonical prefix sum turns the histogram into global
        // destination offsets; slots 0..m are the dollar prefix
        let n_buckets = bucket_count(k_bits);
        let mut running = vec![0u64; n_buckets];
        let mut acc = m;
        for (b, slot) in running.iter_mut().enumerate() {
            *slot = acc;
            acc += u64::from(histogram[b]);
        }

        let mut sorter = BlockSorter::with_capacity(max_block.min(set.num_symbols()) as usize);

        let sort_start = Instant::now();
        let mut global_offset = m;
        let mut bucket_begin = 0usize;
        while bucket_begin < n_buckets {
            // grow the super-block of buckets while it fits the outer
            // envelope
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

            if total == 0 {
                bucket_begin = bucket_end;
                continue;
            }
            self.check_cancelled()?;

            let (suffixes, max_suffix_len) = self.collect_super_block(
                set,
                k_bits,
                &mut running,
                bucket_begin..bucket_end,
                total,
                global_offset,
            )?;

            debug!(
                "collected buckets [{}, {}): {} suffixes, max length {}",
                bucket_begin, bucket_end, total, max_suffix_len
            );

            self.sort_super_block(
                set,
                &histogram,
                bucket_begin..bucket_end,
                &suffixes,
                max_suffix_len,
                global_offset,
                &mut sorter,
                sink,
                &mut primary_map,
            )?;

            global_offset += total;
            bucket_begin = bucket_end;
        }

        sink.finish()?;
        info!(
            "emitted {} BWT symbols in {:.1}s",
            global_offset,
            sort_start.elapsed().as_secs_f64()
        );

        debug_assert_eq!(primary_map.len() as u64, m);
        Ok(primary_map)
    }

    /// Collecting pass: re-stream the set in chunks and scatter every
    /// suffix of the bucket range to its slot in the host buffer
    fn collect_super_block(
        &self,
        set: &PackedSet,
        k_bits: u32,
        running: &mut [u64],
        buckets: std::ops::Range<usize>,
        total: u64,
        global_offset: u64,
    ) -> Result<(Vec<SetSuffix>, u32)> {
        let m = set.len() as u32;
        let mut buf = vec![SetSuffix::default(); total as usize];
        let mut max_suffix_len = 0u32;
        let mut collected_total = 0u64;

        let mut chunk_begin = 0u32;
        while chunk_begin < m {
            let chunk_end = chunk_begin.saturating_add(CHUNK_STRINGS).min(m);

            // materialize this chunk's in-range suffixes in parallel
            let collected: Vec<(u32, SetSuffix)> = (chunk_begin..chunk_end)
                .into_par_iter()
                .flat_map_iter(|k| {
                    let len = set.str_len(k);
                    let buckets = buckets.clone();
                    (0..len).filter_map(move |p| {
                        let suffix = SetSuffix::new(k, p);
                        let bucket = set_bucket(set, suffix, k_bits) as usize;
                        buckets.contains(&bucket).then_some((bucket as u32, suffix))
                    })
                })
                .collect();

            collected_total += collected.len() as u64;
            if collected_total > total {
                return Err(BwtError::BufferOverflow {
                    needed: collected_total,
                    capacity: total,
                });
            }

            // deterministic scatter through the running per-bucket offsets
            for (bucket, suffix) in collected {
                let slot = running[bucket as usize];
                running[bucket as usize] += 1;
                buf[(slot - global_offset) as usize] = suffix;
                max_suffix_len = max_suffix_len.max(set.str_len(suffix.string) - suffix.offset);
            }

            chunk_begin = chunk_end;
        }

        Ok((buf, max_suffix_len))
    }

    /// Walk the collected super-block in bucket order, emitting short
    /// buckets directly and sorting runs of long buckets within the inner
    /// envelope
    #[allow(clippy::too_many_arguments)]
    fn sort_super_block(
        &self,
        set: &PackedSet,
        histogram: &[u32],
        buckets: std::ops::Range<usize>,
        suffixes: &[SetSuffix],
        max_suffix_len: u32,
        global_offset: u64,
        sorter: &mut BlockSorter,
        sink: &mut dyn BwtSink,
        primary_map: &mut PrimaryMap,
    ) -> Result<()> {
        let max_block = self.params.max_block_suffixes();
        let depth = radix_words_for(max_suffix_len, set.symbol_bits());

        let mut cursor = 0usize;
        let mut bucket = buckets.start;
        while bucket < buckets.end {
            let size = histogram[bucket] as usize;
            if size == 0 {
                bucket += 1;
                continue;
            }

            if is_short_bucket(bucket as u32) {
                // every suffix here reaches its $ inside the bucket
                // prefix: all are equal, so collection order is sorted
                // order and the sorter is bypassed
                let mut emitted = 0usize;
                while emitted < size {
                    let n = (size - emitted).min(max_block as usize);
                    let block = &suffixes[cursor + emitted..cursor + emitted + n];
                    self.emit_block(
                        set,
                        block,
                        None,
                        global_offset + (cursor + emitted) as u64,
                        sink,
                        primary_map,
                    )?;
                    emitted += n;
                }
                cursor += size;
                bucket += 1;
            } else {
                // batch contiguous long buckets into one sort block
                let mut run_end = bucket;
                let mut run_size = 0usize;
                while run_end < buckets.end
                    && !is_short_bucket(run_end as u32)
                    && run_size + histogram[run_end] as usize <= max_block as usize
                {
                    run_size += histogram[run_end] as usize;
                    run_end += 1;
                }
                debug_assert!(run_end > bucket, "long bucket exceeds the inner envelope");

                let block = &suffixes[cursor..cursor + run_size];
                let mut order: Vec<u32> = (0..run_size as u32).collect();
                sorter.sort(
                    &SetSuffixes {
                        set,
                        suffixes: block,
                    },
                    &mut order,
                    depth,
                )?;
                self.emit_block(
                    set,
                    block,
                    Some(&order),
                    global_offset + cursor as u64,
                    sink,
                    primary_map,
                )?;

                cursor += run_size;
                bucket = run_end;
            }
        }
        Ok(())
    }

    /// Compute and emit the BWT symbols of one block of suffixes, tracking
    /// the `$` tokens in the primary map
    fn emit_block(
        &self,
        set: &PackedSet,
        suffixes: &[SetSuffix],
        order: Option<&[u32]>,
        slot_base: u64,
        sink: &mut dyn BwtSink,
        primary_map: &mut PrimaryMap,
    ) -> Result<()> {
        let suffix_at = |i: usize| match order {
            Some(order) => suffixes[order[i] as usize],
            None => suffixes[i],
        };

        let symbols: Vec<u8> = (0..suffixes.len())
            .into_par_iter()
            .map(|i| {
                let s = suffix_at(i);
                if s.offset == 0 {
                    DOLLAR
                } else {
                    set.symbol(s.string, s.offset - 1)
                }
            })
            .collect();

        for (i, &symbol) in symbols.iter().enumerate() {
            if symbol == DOLLAR {
                primary_map.push(slot_base + i as u64, suffix_at(i).string);
            }
        }

        sink.process(&symbols)
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(BwtError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Convenience wrapper around [`SetBwt::run`]
pub fn bwt_of_set(
    set: &PackedSet,
    sink: &mut dyn BwtSink,
    params: &BWTParams,
) -> Result<PrimaryMap> {
    SetBwt::new(*params).run(set, sink)
}

/// Counting pass: one streaming sweep accumulating the global bucket
/// histogram
fn count_buckets(set: &PackedSet, k_bits: u32) -> Vec<u32> {
    let m = set.len() as u32;
    let n_buckets = bucket_count(k_bits);
    let n_chunks = m.div_ceil(CHUNK_STRINGS).max(1);
    (0..n_chunks)
        .into_par_iter()
        .map(|c| {
            let begin = c * CHUNK_STRINGS;
            let end = begin.saturating_add(CHUNK_STRINGS).min(m);
            let mut local = vec![0u32; n_buckets];
            for k in begin..end {
                for p in 0..set.str_len(k) {
                    local[set_bucket(set, SetSuffix::new(k, p), k_bits) as usize] += 1;
                }
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
