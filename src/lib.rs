//! bwtk: streaming Burrows-Wheeler Transform construction
//!
//! # Overview
//!
//! bwtk builds BWTs of very large inputs under explicit working-memory
//! budgets: single multi-gigabase texts (reference genomes) through a
//! blockwise suffix sorter with difference-cover tie-breaking, and large
//! short-string collections (read sets) through an out-of-core
//! bucket/collect/sort pipeline.
//!
//! ## Key Features
//!
//! - **Bounded memory**: two envelopes (`host_memory`, `device_memory`)
//!   size the outer collection and inner sorting working sets
//! - **Repeat-insensitive**: a difference cover sampler bounds every
//!   suffix comparison, so long repeats cannot blow up the sort
//! - **Streaming output**: BWT symbols are emitted in destination order
//!   to pluggable sinks (ASCII, 2-bit, 4-bit, discard), optionally
//!   gzip/bgzip compressed
//! - **Deterministic**: identical input and parameters produce
//!   bit-identical output
//!
//! ## Quick Start
//!
//! ```
//! use bwtk::bwt::{bwt_of_string, invert_bwt};
//! use bwtk::packed::ByteText;
//! use bwtk::BWTParams;
//!
//! # fn main() -> bwtk::Result<()> {
//! let (bwt, primary) = bwt_of_string(&ByteText(b"banana"), &BWTParams::default())?;
//! assert_eq!(invert_bwt(&bwt, primary), b"banana");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`packed`]: alphabet-packed texts and string sets
//! - [`radix`]: fixed-width radix key extraction
//! - [`dcs`]: difference cover sampler
//! - [`sort`]: bounded block sorter
//! - [`bwt`]: the two orchestrators plus inversion
//! - [`sink`]: BWT output encodings
//! - [`io`]: compressed streams, data sinks, sequence readers

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bwt;
pub mod dcs;
pub mod error;
pub mod io;
pub mod packed;
pub mod radix;
pub mod sink;
pub mod sort;
pub mod types;

// Re-export commonly used types
pub use bwt::{
    bwt_of_set, bwt_of_string, invert_bwt, invert_set_bwt, PrimaryMap, SetBwt, StringBwt,
};
pub use error::{BwtError, Result};
pub use packed::{ByteText, PackedBuf, PackedSet, Text};
pub use sink::{BufferSink, BwtFormat, BwtSink, DiscardSink};
pub use types::{BWTParams, CancelToken, SetSuffix};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
