//! mxfcap CLI
//!
//! Inspects clip files and package stores written by a capture session.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use mxfcap::clip::ClipReader;
use mxfcap::klv::KlvReader;
use mxfcap::persistence::LogPackageStore;
use mxfcap::{PartitionDirectory, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// mxfcap
#[derive(Parser, Debug)]
#[command(name = "mxfcap")]
#[command(about = "Inspect MXF capture clips and package stores")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List partitions and index segments of a clip
    Inspect {
        /// Clip file
        file: PathBuf,
    },

    /// Check that the RIP and the partition chain agree
    Verify {
        /// Clip file
        file: PathBuf,
    },

    /// Print the location and size of one edit unit
    ReadUnit {
        /// Clip file
        file: PathBuf,

        /// Edit unit position
        position: i64,
    },

    /// List sessions saved in a package store
    DumpStore {
        /// Store log file
        file: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mxfcap=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match &args.command {
        Commands::Inspect { file } => inspect(file),
        Commands::Verify { file } => verify(file),
        Commands::ReadUnit { file, position } => read_unit(file, *position),
        Commands::DumpStore { file } => dump_store(file),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn inspect(file: &Path) -> Result<()> {
    let reader = ClipReader::open_file(file)?;
    let directory = reader.directory();

    println!("{:?}: {} partitions ({:?})", file, directory.len(), directory.discovery());
    for pack in directory.partitions() {
        println!(
            "  {:?} @ {:>10}  prev {:>10}  status {:?}  body_sid {}  index_sid {}  hbc {}  ibc {}  body_offset {}",
            pack.kind,
            pack.this_partition,
            pack.previous_partition,
            pack.status,
            pack.body_sid,
            pack.index_sid,
            pack.header_byte_count,
            pack.index_byte_count,
            pack.body_offset
        );
    }

    if let Some(primer) = reader.primer() {
        println!("primer: {} local tags", primer.len());
    }

    match reader.index() {
        Some(index) => {
            println!(
                "index: sid {} -> body sid {}, {} edit units at {} ({:.3}/s), {}",
                index.index_sid(),
                index.body_sid(),
                index.duration(),
                index.edit_rate(),
                index.edit_rate().to_f64(),
                if index.is_cbe() { "CBE" } else { "VBE" }
            );
            for segment in index.segments() {
                println!(
                    "  segment start {:>8}  duration {:>8}  entries {:>6}  edit_unit_byte_count {}",
                    segment.index_start_position,
                    segment.index_duration,
                    segment.index_entries().len(),
                    segment.edit_unit_byte_count
                );
            }
        }
        None => println!("index: none"),
    }
    Ok(())
}

fn verify(file: &Path) -> Result<()> {
    let handle = std::fs::File::open(file).map_err(|e| mxfcap::MxfError::filesystem(file, e))?;
    let mut reader = KlvReader::new(std::io::BufReader::new(handle));
    let directory = PartitionDirectory::verify(&mut reader)?;
    println!(
        "{:?}: OK, {} partitions at {:?}",
        file,
        directory.len(),
        directory.offsets()
    );
    Ok(())
}

fn read_unit(file: &Path, position: i64) -> Result<()> {
    let mut reader = ClipReader::open_file(file)?;
    let location = reader.locate(position)?;
    let kl = reader.element_kl(position)?;
    println!(
        "edit unit {}: file offset {}, stream offset {}, {} bytes, key {}, flags 0x{:02x}",
        position, location.file_offset, location.stream_offset, kl.length, kl.key, location.flags
    );
    Ok(())
}

fn dump_store(file: &Path) -> Result<()> {
    let (sessions, scan) = LogPackageStore::read_all(file)?;
    for stored in &sessions {
        let packages = &stored.packages;
        println!(
            "#{} session {:?} material {:?} ({} files)",
            stored.seq,
            packages.session_name,
            packages.material_package.umid,
            packages.file_packages.len()
        );
        for record in &packages.file_packages {
            println!(
                "    track {:>3} {:?} {} x {} -> {:?}",
                record.track_id, record.kind, record.duration, record.edit_rate, record.path
            );
        }
    }
    if scan.was_truncated {
        println!("(torn tail after {} bytes)", scan.valid_len);
    }
    Ok(())
}
