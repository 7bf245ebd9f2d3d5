//! caskkv CLI
//!
//! Command-line interface for a local caskkv data directory.

use clap::{Parser, Subcommand};
use caskkv::{Config, Engine, IteratorOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// caskkv CLI
#[derive(Parser, Debug)]
#[command(name = "caskkv-cli")]
#[command(about = "CLI for the caskkv storage engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./caskkv_data")]
    dir: String,

    /// Max data file size in bytes before rotation
    #[arg(short = 'm', long, default_value = "268435456")]
    max_file_size: u64,

    /// fsync after every write
    #[arg(short, long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all keys
    Keys,

    /// Print key-value pairs, optionally under a prefix
    Scan {
        /// Only keys starting with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Descending key order
        #[arg(short, long)]
        reverse: bool,
    },

    /// Compact data files (adopted on next open)
    Merge,

    /// Print engine statistics
    Stat,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caskkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> caskkv::Result<()> {
    let config = Config::builder()
        .dir_path(&args.dir)
        .max_file_size(args.max_file_size)
        .sync_writes(args.sync)
        .build();

    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { key } => {
            let value = engine.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Keys => {
            for key in engine.list_keys() {
                println!("{}", String::from_utf8_lossy(&key));
            }
        }
        Commands::Scan { prefix, reverse } => {
            let mut iter = engine.iter(IteratorOptions {
                prefix: prefix.into_bytes(),
                reverse,
            });
            while iter.valid() {
                let value = iter.value()?;
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(iter.key()),
                    String::from_utf8_lossy(&value)
                );
                iter.next();
            }
            iter.close();
        }
        Commands::Merge => {
            engine.merge()?;
            println!("OK");
        }
        Commands::Stat => {
            let stat = engine.stat()?;
            println!("keys:       {}", stat.key_count);
            println!("data files: {}", stat.data_file_count);
            println!("disk size:  {} bytes", stat.disk_size);
        }
    }

    engine.close()
}
