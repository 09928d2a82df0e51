//! mvcckv debug tool
//!
//! Inspects and edits an engine's data directory.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use mvcckv::{Config, Engine, IterOptions, Reader, Timestamp, VersionedKey, Writer};
use tracing_subscriber::{fmt, EnvFilter};

/// mvcckv debug tool
#[derive(Parser, Debug)]
#[command(name = "mvcckv")]
#[command(about = "Inspect and edit an mvcckv data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./mvcckv_data")]
    data_dir: PathBuf,

    /// Open without modifying the directory
    #[arg(long)]
    read_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List keys in order
    Scan {
        /// Print every version instead of only the newest
        #[arg(long)]
        all_versions: bool,

        /// First user key to print
        #[arg(long)]
        start: Option<String>,

        /// Stop after this many entries
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Read one version of a key
    Get {
        key: String,

        /// Timestamp as `wall` or `wall,logical`; omitted reads the bare key
        #[arg(long)]
        ts: Option<String>,
    },

    /// Write one version of a key
    Put {
        key: String,

        value: String,

        #[arg(long)]
        ts: Option<String>,
    },

    /// Compact a span of user keys, or everything
    Compact {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },

    /// List live tables
    Sstables,

    /// Print store counters and per-level summary
    Stats,

    /// Print the timestamp bounds recorded in each table
    Properties,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mvcckv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    tracing::info!("mvcckv v{}", mvcckv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .read_only(args.read_only)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    let result = run(&engine, args.command);
    let closed = engine.close();

    if let Err(e) = result.and(closed) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> mvcckv::Result<()> {
    match command {
        Commands::Scan {
            all_versions,
            start,
            limit,
        } => {
            let mut iter = engine.new_iterator(IterOptions::default())?;
            match start {
                Some(start) => iter.seek(&VersionedKey::bare(start)).status?,
                None => iter.seek_to_first().status?,
            }
            let mut printed = 0;
            while printed < limit && iter.valid() {
                {
                    let state = iter.state();
                    if let (Some(key), Some(value)) = (state.key, state.value) {
                        println!(
                            "{} @ {} => {}",
                            String::from_utf8_lossy(key.user_key),
                            key.timestamp,
                            String::from_utf8_lossy(value)
                        );
                    }
                }
                printed += 1;
                iter.next(!all_versions).status?;
            }
        }

        Commands::Get { key, ts } => {
            let key = VersionedKey::new(key, parse_timestamp(ts.as_deref())?);
            match engine.get(&key)? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => println!("(not found)"),
            }
        }

        Commands::Put { key, value, ts } => {
            let key = VersionedKey::new(key, parse_timestamp(ts.as_deref())?);
            engine.put(&key, value.as_bytes())?;
            engine.flush()?;
            println!("OK");
        }

        Commands::Compact { start, end } => {
            let start = start.map(VersionedKey::bare);
            let end = end.map(VersionedKey::bare);
            engine.compact_range(start.as_ref(), end.as_ref(), true)?;
            print!("{}", engine.get_compaction_stats());
        }

        Commands::Sstables => {
            for table in engine.get_sstables() {
                println!(
                    "L{} {:>12} bytes  [{} @ {}, {} @ {}]",
                    table.level,
                    table.size,
                    String::from_utf8_lossy(&table.start_key.user_key),
                    table.start_key.timestamp,
                    String::from_utf8_lossy(&table.end_key.user_key),
                    table.end_key.timestamp
                );
            }
        }

        Commands::Stats => {
            println!("{:#?}", engine.get_stats());
            print!("{}", engine.get_compaction_stats());
        }

        Commands::Properties => {
            for props in engine.get_user_properties()? {
                match (&props.error, props.ts_min, props.ts_max) {
                    (Some(e), _, _) => println!("{}: error: {}", props.path, e),
                    (None, Some(min), Some(max)) => println!("{}: [{}, {}]", props.path, min, max),
                    (None, _, _) => println!("{}: no timestamp bounds", props.path),
                }
            }
        }
    }
    Ok(())
}

fn parse_timestamp(ts: Option<&str>) -> mvcckv::Result<Timestamp> {
    let Some(ts) = ts else {
        return Ok(Timestamp::ZERO);
    };
    let invalid = || mvcckv::MvccError::InvalidArgument(format!("invalid timestamp '{}'", ts));
    let (wall, logical) = match ts.split_once(',') {
        Some((wall, logical)) => (wall, logical),
        None => (ts, "0"),
    };
    let wall = wall.trim().parse().map_err(|_| invalid())?;
    let logical = logical.trim().parse().map_err(|_| invalid())?;
    Ok(Timestamp::new(wall, logical))
}
