//! setbwt: build the BWT of a short-read collection
//!
//! Reads a FASTA/FASTQ/TXT file (optionally gzip or bgzip compressed),
//! expands the requested strands, runs the string-set BWT pipeline, and
//! writes the transform plus its primary map:
//!
//! ```text
//! setbwt reads.fq.gz reads.bwt
//! setbwt --cpu-memory 4096 --gpu-memory 1024 reads.fa out.txt.gz
//! ```
//!
//! The primary map lands next to the output with a `.pri` extension,
//! ASCII-formatted for `.txt` outputs and binary otherwise.

use bwtk::bwt::{PrimaryMap, SetBwt};
use bwtk::io::{
    open_sequence_reader, parse_compression_level, CompressedWriter, DataSink, SequenceReader,
};
use bwtk::packed::{Endianness, PackedSet};
use bwtk::sink::{AsciiSink, BwtFormat, Packed2Sink, Packed4Sink};
use bwtk::types::{complement, encode_dna};
use bwtk::{BWTParams, BwtError};
use clap::Parser;
use flate2::Compression;
use log::{info, LevelFilter};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

/// Reads pulled per input batch
const BATCH_READS: usize = 512 * 1024;

/// Bases pulled per input batch
const BATCH_BASES: usize = 64 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "setbwt", version)]
#[command(about = "Build the BWT of a short-read collection")]
struct Cli {
    /// Input reads: fasta/fastq/txt, optionally .gz/.bgz
    input: PathBuf,

    /// Output BWT: .txt/.bwt/.bwt4, optionally .gz/.bgz
    output: PathBuf,

    /// Verbosity, 0 (silent) to 6 (trace)
    #[arg(short = 'v', long = "verbosity", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=6))]
    verbosity: u8,

    /// Outer pipeline memory budget, in MiB
    #[arg(long = "cpu-memory", default_value_t = 8192)]
    cpu_memory: u64,

    /// Inner sorter memory budget, in MiB
    #[arg(long = "gpu-memory", default_value_t = 2048)]
    gpu_memory: u64,

    /// Output compression level, 1..9 (an 'R' suffix is accepted)
    #[arg(short = 'c', long = "compression", default_value = "6")]
    compression: String,

    /// Do not insert the forward strand
    #[arg(short = 'F', long = "skip-forward", default_value_t = false)]
    skip_forward: bool,

    /// Do not insert the reverse-complemented strand
    #[arg(short = 'R', long = "skip-reverse", default_value_t = false)]
    skip_reverse: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    if let Err(err) = run(&cli) {
        eprintln!("error: {}", err);
        process::exit(exit_code(&err));
    }
}

fn exit_code(err: &BwtError) -> i32 {
    match err {
        BwtError::MemoryBudget { .. } | BwtError::BufferOverflow { .. } => 2,
        BwtError::ConstructionLimit { .. } => 3,
        _ => 1,
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> bwtk::Result<()> {
    let format = BwtFormat::from_path(&cli.output).ok_or_else(|| BwtError::InputFormat {
        line: 0,
        msg: format!(
            "unrecognized output extension on '{}' (expected .txt/.bwt/.bwt4, optionally .gz/.bgz)",
            cli.output.display()
        ),
    })?;
    let level = parse_compression_level(&cli.compression)?;

    if cli.skip_forward && cli.skip_reverse {
        return Err(BwtError::InputFormat {
            line: 0,
            msg: "both strands skipped: nothing to index".to_string(),
        });
    }

    let params = BWTParams {
        host_memory: cli.cpu_memory * 1024 * 1024,
        device_memory: cli.gpu_memory * 1024 * 1024,
    };

    let load_start = Instant::now();
    let mut reader = open_sequence_reader(&cli.input)?;
    let set = load_set(reader.as_mut(), !cli.skip_forward, !cli.skip_reverse)?;
    info!(
        "loaded {} strings ({} bases) in {:.1}s",
        set.len(),
        set.num_symbols(),
        load_start.elapsed().as_secs_f64()
    );

    let build_start = Instant::now();
    let builder = SetBwt::new(params);
    let writer = CompressedWriter::with_level(DataSink::from_path(&cli.output), level)?;
    let primary_map = match format {
        BwtFormat::Ascii => {
            let mut sink = AsciiSink::new(writer);
            let map = builder.run(&set, &mut sink)?;
            sink.into_inner().finish().map_err(BwtError::Sink)?;
            map
        }
        BwtFormat::Packed2 => {
            let mut sink = Packed2Sink::new(writer);
            let map = builder.run(&set, &mut sink)?;
            sink.into_inner().finish().map_err(BwtError::Sink)?;
            map
        }
        BwtFormat::Packed4 => {
            let mut sink = Packed4Sink::new(writer);
            let map = builder.run(&set, &mut sink)?;
            sink.into_inner().finish().map_err(BwtError::Sink)?;
            map
        }
    };
    info!(
        "BWT written to '{}' in {:.1}s",
        cli.output.display(),
        build_start.elapsed().as_secs_f64()
    );

    let pri_path = primary_map_path(&cli.output);
    write_primary_map(&primary_map, &pri_path, format, level)?;
    info!("primary map written to '{}'", pri_path.display());

    Ok(())
}

/// Stream every batch of the input into a packed 2-bit set, appending the
/// requested strands per read
fn load_set(
    reader: &mut dyn SequenceReader,
    forward: bool,
    reverse: bool,
) -> bwtk::Result<PackedSet> {
    let mut set = PackedSet::new(2, Endianness::Little);
    let mut codes = Vec::new();

    while let Some(batch) = reader.next_batch(BATCH_READS, BATCH_BASES)? {
        for read in batch.iter() {
            codes.clear();
            codes.extend(read.iter().map(|&b| encode_dna(b)));
            if forward {
                set.push(&codes);
            }
            if reverse {
                let rc: Vec<u8> = codes.iter().rev().map(|&c| complement(c)).collect();
                set.push(&rc);
            }
        }
    }
    Ok(set)
}

/// Derive the `.pri` path: swap the payload extension, keep the
/// compression suffix (`reads.bwt.gz` becomes `reads.pri.gz`)
fn primary_map_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, compression) = match name.strip_suffix(".gz") {
        Some(stem) => (stem, ".gz"),
        None => match name.strip_suffix(".bgz") {
            Some(stem) => (stem, ".bgz"),
            None => (name.as_str(), ""),
        },
    };
    let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);
    output.with_file_name(format!("{}.pri{}", stem, compression))
}

/// ASCII primary map next to ASCII BWTs, binary next to packed ones
fn write_primary_map(
    map: &PrimaryMap,
    path: &Path,
    format: BwtFormat,
    level: Compression,
) -> bwtk::Result<()> {
    let mut writer = CompressedWriter::with_level(DataSink::from_path(path), level)?;
    match format {
        BwtFormat::Ascii => map.write_ascii(&mut writer)?,
        BwtFormat::Packed2 | BwtFormat::Packed4 => map.write_binary(&mut writer)?,
    }
    writer.finish().map_err(BwtError::Sink)
}
