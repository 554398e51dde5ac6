//! Round-trip and oracle tests for single-string BWT construction

mod common;

use bwtk::bwt::{bwt_of_string, bwt_of_string_with_ssa, find_primary, invert_bwt};
use bwtk::packed::{ByteText, Endianness, PackedBuf};
use bwtk::types::{decode_dna, encode_dna};
use bwtk::BWTParams;
use common::{naive_bwt, Lcg};

fn dna_text(ascii: &[u8]) -> PackedBuf {
    let codes: Vec<u8> = ascii.iter().map(|&b| encode_dna(b)).collect();
    PackedBuf::from_codes(&codes, 2, Endianness::Little)
}

#[test]
fn banana_scenario() {
    let (bwt, primary) = bwt_of_string(&ByteText(b"banana"), &BWTParams::default()).unwrap();
    // BWT of banana$ is annb$aa with the $ at slot 4
    assert_eq!(primary, 4);
    assert_eq!(&bwt, b"annbaa");
    assert_eq!(invert_bwt(&bwt, primary), b"banana");
}

#[test]
fn dna_scenario() {
    let text = dna_text(b"ACGTACGT");
    let (bwt, primary) = bwt_of_string(&text, &BWTParams::default()).unwrap();
    assert_eq!(primary, 2);
    let ascii: Vec<u8> = bwt.iter().map(|&c| decode_dna(c)).collect();
    assert_eq!(&ascii, b"TTAACCGG");

    let recovered: Vec<u8> = invert_bwt(&bwt, primary)
        .iter()
        .map(|&c| decode_dna(c))
        .collect();
    assert_eq!(&recovered, b"ACGTACGT");
}

#[test]
fn all_equal_scenario() {
    let text = dna_text(b"AAAAAAAA");
    let (bwt, primary) = bwt_of_string(&text, &BWTParams::default()).unwrap();
    assert_eq!(primary, 8);
    assert_eq!(invert_bwt(&bwt, primary), vec![0u8; 8]);
}

#[test]
fn empty_input() {
    let (bwt, primary) = bwt_of_string(&ByteText(b""), &BWTParams::default()).unwrap();
    assert!(bwt.is_empty());
    assert_eq!(primary, 0);
}

#[test]
fn matches_rotation_sort_oracle() {
    let mut rng = Lcg(42);
    for len in [1usize, 2, 13, 100, 1_000, 10_000] {
        let ascii = rng.dna(len);
        let (expect_bwt, expect_primary) = naive_bwt(&ascii);

        let (bwt, primary) = bwt_of_string(&ByteText(&ascii), &BWTParams::default()).unwrap();
        assert_eq!(primary, expect_primary, "length {}", len);
        assert_eq!(bwt, expect_bwt, "length {}", len);
    }
}

#[test]
fn primary_agrees_with_counting_oracle() {
    let mut rng = Lcg(7);
    let ascii = rng.dna(2_000);
    let text = ByteText(&ascii);
    let (_, primary) = bwt_of_string(&text, &BWTParams::default()).unwrap();
    assert_eq!(primary, find_primary(&text).unwrap());
}

#[test]
fn ssa_matches_full_suffix_array() {
    let mut rng = Lcg(99);
    let ascii = rng.dna(512);
    let n = ascii.len();

    // full suffix array of text$, empty suffix first
    let mut sa: Vec<usize> = (0..=n).collect();
    sa.sort_by(|&a, &b| ascii[a..].cmp(&ascii[b..]));

    let (_, _, ssa) =
        bwt_of_string_with_ssa(&ByteText(&ascii), 8, &BWTParams::default()).unwrap();
    assert_eq!(ssa.len(), (n + 1).div_ceil(8));
    for (j, &entry) in ssa.iter().enumerate() {
        let expect = sa[j * 8];
        if expect == n {
            assert_eq!(entry, u32::MAX, "slot {}", j * 8);
        } else {
            assert_eq!(entry as usize, expect, "slot {}", j * 8);
        }
    }
}

#[test]
fn long_repeats_with_tight_budget() {
    // LCPs close to N must neither blow the budget nor loop
    let mut ascii = vec![b'A'; 30_000];
    ascii.extend_from_slice(b"C");
    ascii.extend(vec![b'A'; 30_000]);

    let params = BWTParams::default()
        .with_host_memory(64 * 1024 * 1024)
        .with_device_memory(4 * 1024 * 1024);
    let (bwt, primary) = bwt_of_string(&ByteText(&ascii), &params).unwrap();
    assert_eq!(bwt.len(), ascii.len());
    assert_eq!(invert_bwt(&bwt, primary), ascii);
}

#[test]
fn deterministic_across_runs() {
    let mut rng = Lcg(1234);
    let ascii = rng.dna(5_000);
    let first = bwt_of_string(&ByteText(&ascii), &BWTParams::default()).unwrap();
    let second = bwt_of_string(&ByteText(&ascii), &BWTParams::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn megabase_roundtrip() {
    // round-trip law at the upper end of the tested range
    let mut rng = Lcg(8_675_309);
    let ascii = rng.dna(1_000_000);
    let text = dna_text(&ascii);
    let (bwt, primary) = bwt_of_string(&text, &BWTParams::default()).unwrap();
    assert_eq!(bwt.len(), ascii.len());

    let recovered: Vec<u8> = invert_bwt(&bwt, primary)
        .iter()
        .map(|&c| decode_dna(c))
        .collect();
    assert_eq!(recovered, ascii);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Round-trip law over the 4-symbol DNA alphabet, packed 2-bit
        #[test]
        fn prop_roundtrip_dna(seq in "[ACGT]{0,2000}") {
            let text = dna_text(seq.as_bytes());
            let (bwt, primary) = bwt_of_string(&text, &BWTParams::default()).unwrap();
            prop_assert_eq!(bwt.len(), seq.len());

            let recovered: Vec<u8> = invert_bwt(&bwt, primary)
                .iter()
                .map(|&c| decode_dna(c))
                .collect();
            prop_assert_eq!(recovered, seq.into_bytes());
        }

        /// Round-trip law over a binary alphabet
        #[test]
        fn prop_roundtrip_binary(seq in "[AC]{0,1500}") {
            let (bwt, primary) =
                bwt_of_string(&ByteText(seq.as_bytes()), &BWTParams::default()).unwrap();
            prop_assert_eq!(invert_bwt(&bwt, primary), seq.into_bytes());
        }

        /// Round-trip law over the full byte alphabet
        #[test]
        fn prop_roundtrip_bytes(seq in proptest::collection::vec(any::<u8>(), 0..1000)) {
            let (bwt, primary) =
                bwt_of_string(&ByteText(&seq), &BWTParams::default()).unwrap();
            prop_assert_eq!(invert_bwt(&bwt, primary), seq);
        }

        /// The engine agrees with the rotation-sort definition
        #[test]
        fn prop_matches_naive(seq in "[ACGT]{1,300}") {
            let (expect_bwt, expect_primary) = naive_bwt(seq.as_bytes());
            let (bwt, primary) =
                bwt_of_string(&ByteText(seq.as_bytes()), &BWTParams::default()).unwrap();
            prop_assert_eq!(primary, expect_primary);
            prop_assert_eq!(bwt, expect_bwt);
        }
    }
}
