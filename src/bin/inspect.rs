//! streamkv Inspector Binary
//!
//! Read-only inspection of a clustered stream file.

use std::fs::File;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use streamkv::provider::FreeIndexStore;
use streamkv::{ClusteredStream, Result, SlotDescriptor, SlotStream};
use tracing_subscriber::{fmt, EnvFilter};

/// streamkv Inspector
#[derive(Parser, Debug)]
#[command(name = "streamkv-inspect")]
#[command(about = "Inspect streamkv container files")]
#[command(version)]
struct Args {
    /// Container file
    file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print header fields and the extension region
    Info,

    /// List slot descriptors
    Slots {
        /// Include reserved provider records
        #[arg(long)]
        reserved: bool,

        /// Stop after this many slots
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Walk every record chain and check the free-index stack against slot traits
    Verify {
        /// Reserved record holding the free-index stack
        #[arg(long, default_value = "0")]
        free_index_record: u64,
    },
}

fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,streamkv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mut stream = match File::open(&args.file)
        .map_err(Into::into)
        .and_then(ClusteredStream::open)
    {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.file.display(), e);
            process::exit(1);
        }
    };

    let result = match args.command {
        Command::Info => {
            print_info(&stream);
            Ok(true)
        }
        Command::Slots { reserved, limit } => print_slots(&mut stream, reserved, limit).map(|_| true),
        Command::Verify { free_index_record } => verify(&mut stream, free_index_record),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            tracing::error!("Inspection failed: {}", e);
            process::exit(1);
        }
    }
}

fn print_info(stream: &ClusteredStream<File>) {
    let header = stream.header();
    println!("version:          {}", header.version);
    println!("endianness:       {:?}", header.endianness);
    println!("cluster size:     {}", header.cluster_size);
    println!("checksum policy:  {}", header.policy.checksum_tracking);
    println!("key policy:       {}", header.policy.key_tracking);
    println!("fast allocate:    {}", header.policy.fast_allocate);
    println!("reserved records: {}", header.reserved_records);
    println!("data slots:       {}", header.data_records());
    println!("clusters:         {}", header.cluster_count);
    println!("extension:        {}", hex(&header.extension));
}

fn print_slots(stream: &mut ClusteredStream<File>, reserved: bool, limit: Option<u64>) -> Result<()> {
    let first = stream.header().reserved_records as u64;
    let start = if reserved { 0 } else { first };
    let end = stream.record_count();
    let end = limit.map_or(end, |limit| end.min(start + limit));

    println!("{:>8}  {:<36} {:>11} {:>7} {:>10}", "slot", "traits", "checksum", "key", "length");
    for record in start..end {
        let d = stream.descriptor(record)?;
        let label = if record < first {
            format!("r{}", record)
        } else {
            (record - first).to_string()
        };
        println!(
            "{:>8}  {:<36} {:>11} {:>7} {:>10}",
            label,
            format!("{:?}", d.traits),
            d.checksum,
            d.key_len,
            d.length
        );
    }
    Ok(())
}

fn verify(stream: &mut ClusteredStream<File>, free_index_record: u64) -> Result<bool> {
    let reserved = stream.header().reserved_records as u64;
    let mut descriptors: Vec<SlotDescriptor> = Vec::new();
    let (mut live, mut null) = (0u64, 0u64);

    for record in reserved..stream.record_count() {
        let d = stream.descriptor(record)?;
        if d.is_live() {
            live += 1;
            if d.is_null() {
                null += 1;
            }
            // Walks the whole chain
            stream.read_key(record)?;
            stream.read_value(record)?;
        }
        descriptors.push(d);
    }

    let reaped = descriptors.iter().filter(|d| d.is_reaped()).count();
    println!("live: {}  null: {}  reaped: {}", live, null, reaped);

    if free_index_record >= reserved {
        println!("free-index: no reserved record {}; skipped", free_index_record);
        return Ok(true);
    }

    let len = stream.descriptor(free_index_record)?.length;
    if len % 8 != 0 {
        println!("free-index: record length {} is not a stack of u64", len);
        return Ok(false);
    }

    let e = stream.header().endianness;
    let bytes = stream.read_range(free_index_record, 0, len as usize)?;
    let mut persisted: Vec<u64> = bytes.chunks_exact(8).map(|c| e.read_u64(c)).collect();
    persisted.sort_unstable();

    let expected = FreeIndexStore::rebuild_from(&descriptors);
    if persisted == expected {
        println!("free-index: {} entries, consistent", expected.len());
        Ok(true)
    } else {
        println!(
            "free-index: {} persisted entries disagree with {} reaped slots (rebuilt on next load)",
            persisted.len(),
            expected.len()
        );
        Ok(false)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
