//! BWT inversion
//!
//! LF-mapping based reconstruction of the input from a finished transform.
//! These routines back the round-trip laws in the test suite and let
//! consumers recover original sequences without a separate rank structure.

use crate::types::DOLLAR;

/// Recover `T` from the BWT of `T$`.
///
/// `bwt` holds the `N` symbols with the `$` already removed and `primary`
/// is the slot it occupied, exactly as returned by
/// [`bwt_of_string`](crate::bwt::bwt_of_string). Symbol values are opaque
/// bytes; any 8-bit alphabet works.
///
/// # Example
///
/// ```
/// use bwtk::bwt::invert_bwt;
///
/// assert_eq!(invert_bwt(b"annbaa", 4), b"banana");
/// ```
pub fn invert_bwt(bwt: &[u8], primary: u64) -> Vec<u8> {
    let n = bwt.len();
    assert!(primary as usize <= n, "primary {} out of range {}", primary, n);
    if n == 0 {
        return Vec::new();
    }

    // rebuild the last column with the $ re-inserted; 0 is the $ class,
    // symbol s maps to s + 1
    let mut last: Vec<u16> = Vec::with_capacity(n + 1);
    for (i, &s) in bwt.iter().enumerate() {
        if i == primary as usize {
            last.push(0);
        }
        last.push(u16::from(s) + 1);
    }
    if primary as usize == n {
        last.push(0);
    }

    let lf = lf_mapping(&last);

    // row 0 starts with $, so its last symbol is T[N-1]; each LF step
    // moves one position left through the text
    let mut text = vec![0u8; n];
    let mut row = 0usize;
    for k in (0..n).rev() {
        text[k] = (last[row] - 1) as u8;
        row = lf[row];
    }
    text
}

/// Recover every string of a set from its concatenated BWT stream.
///
/// `symbols` is the raw stream as produced by
/// [`SetBwt::run`](crate::bwt::SetBwt) into a
/// [`BufferSink`](crate::sink::BufferSink): `$` tokens appear in-band as
/// [`DOLLAR`]. Strings come back in string-index order.
///
/// # Example
///
/// ```
/// use bwtk::bwt::invert_set_bwt;
/// use bwtk::types::DOLLAR;
///
/// // the set {AC, GT} as 2-bit codes
/// let stream = [1, 3, DOLLAR, 0, DOLLAR, 2];
/// let strings = invert_set_bwt(&stream);
/// assert_eq!(strings, vec![vec![0, 1], vec![2, 3]]);
/// ```
pub fn invert_set_bwt(symbols: &[u8]) -> Vec<Vec<u8>> {
    let last: Vec<u16> = symbols
        .iter()
        .map(|&s| if s == DOLLAR { 0 } else { u16::from(s) + 1 })
        .collect();
    let m = last.iter().filter(|&&s| s == 0).count();
    if m == 0 {
        return Vec::new();
    }

    let lf = lf_mapping(&last);

    // the first m rows are the empty suffixes in string-index order; walk
    // each string backwards until its own $ comes around
    let mut strings = Vec::with_capacity(m);
    for k in 0..m {
        let mut string = Vec::new();
        let mut row = k;
        loop {
            let s = last[row];
            if s == 0 {
                break;
            }
            string.push((s - 1) as u8);
            row = lf[row];
        }
        string.reverse();
        strings.push(string);
    }
    strings
}

/// LF mapping of a last column: `lf[i]` is the row beginning with the
/// symbol `last[i]`, at that symbol's `i`-th occurrence
fn lf_mapping(last: &[u16]) -> Vec<usize> {
    let mut counts = [0usize; 257];
    for &s in last {
        counts[s as usize] += 1;
    }
    let mut starts = [0usize; 257];
    let mut acc = 0;
    for (c, &count) in counts.iter().enumerate() {
        starts[c] = acc;
        acc += count;
    }

    let mut seen = [0usize; 257];
    last.iter()
        .map(|&s| {
            let row = starts[s as usize] + seen[s as usize];
            seen[s as usize] += 1;
            row
        })
        .collect()
}
