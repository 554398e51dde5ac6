//! Shared helpers for the integration tests
#![allow(dead_code)]

use bwtk::types::{decode_dna, encode_dna, DOLLAR};
use bwtk::packed::{Endianness, PackedSet};

/// Deterministic pseudo-random generator so test inputs are reproducible
pub struct Lcg(pub u32);

impl Lcg {
    pub fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0
    }

    pub fn dna(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[(self.next() >> 30) as usize]).collect()
    }
}

/// Build a packed 2-bit set from ASCII DNA strings
pub fn packed_set(strings: &[Vec<u8>]) -> PackedSet {
    let mut set = PackedSet::new(2, Endianness::Little);
    for s in strings {
        let codes: Vec<u8> = s.iter().map(|&b| encode_dna(b)).collect();
        set.push(&codes);
    }
    set
}

/// Render a raw symbol stream (2-bit codes plus `$` markers) as ASCII
pub fn stream_to_ascii(stream: &[u8]) -> Vec<u8> {
    stream
        .iter()
        .map(|&s| if s == DOLLAR { b'$' } else { decode_dna(s) })
        .collect()
}

/// Reference string-set BWT: sort every suffix, ties broken by string
/// index, and read off the predecessor symbols
pub fn naive_set_bwt(strings: &[Vec<u8>]) -> (Vec<u8>, Vec<(u64, u32)>) {
    let mut rows: Vec<(Vec<u8>, u32, u32)> = Vec::new();
    for (k, s) in strings.iter().enumerate() {
        for p in 0..s.len() {
            let mut content: Vec<u8> = s[p..].iter().map(|&b| b + 1).collect();
            content.push(0);
            rows.push((content, k as u32, p as u32));
        }
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut stream: Vec<u8> = strings.iter().map(|s| s[s.len() - 1]).collect();
    let mut map = Vec::new();
    for (slot, &(_, k, p)) in rows.iter().enumerate() {
        if p == 0 {
            stream.push(b'$');
            map.push(((strings.len() + slot) as u64, k));
        } else {
            stream.push(strings[k as usize][p as usize - 1]);
        }
    }
    (stream, map)
}

/// Reference single-string BWT via rotation sort
pub fn naive_bwt(text: &[u8]) -> (Vec<u8>, u64) {
    let n = text.len();
    let mut rows: Vec<usize> = (0..=n).collect();
    rows.sort_by(|&a, &b| text[a..].cmp(&text[b..]));
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
