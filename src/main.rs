/*!
 * storekit CLI - object operations against a local store root
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::ops::Range;
use std::path::PathBuf;
use storekit::{
    logging, CopyObject, Delete, Get, GetOptions, Head, List, ObjectMeta, ObjectPath, Put,
    PutOptions, PutPayload, Rename, Store, StoreConfig, StoreError,
};
use tokio::io::AsyncWriteExt;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_CONFLICT: i32 = 2;
const EXIT_NOT_FOUND: i32 = 3;

#[derive(Parser)]
#[command(name = "storekit")]
#[command(version, about = "Object storage operations with coalesced reads and multipart uploads", long_about = None)]
struct Cli {
    /// Store root directory
    #[arg(long, value_name = "DIR", global = true, default_value = ".")]
    root: PathBuf,

    /// TOML configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an object (or a byte range of it)
    Get {
        path: String,

        /// Byte range as START..END (end exclusive)
        #[arg(long, value_parser = parse_range)]
        range: Option<Range<u64>>,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Upload a file
    Put {
        path: String,

        /// Local file to upload
        file: PathBuf,

        /// Fail if the object already exists
        #[arg(long)]
        create: bool,

        /// Force a multipart upload
        #[arg(long)]
        multipart: bool,

        /// Part size in bytes
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<usize>,
    },

    /// List objects under a prefix
    Ls {
        prefix: Option<String>,

        /// Start strictly after this key
        #[arg(long)]
        offset: Option<String>,

        /// Entries per page
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Copy an object
    Cp {
        from: String,
        to: String,

        /// Fail if the destination exists
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Rename an object
    Mv {
        from: String,
        to: String,

        /// Fail if the destination exists
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Delete an object
    Rm { path: String },

    /// Show object metadata
    Head { path: String },
}

fn parse_range(raw: &str) -> Result<Range<u64>, String> {
    let (start, end) = raw
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{}'", raw))?;
    let start: u64 = start.trim().parse().map_err(|e| format!("bad start: {}", e))?;
    let end: u64 = end.trim().parse().map_err(|e| format!("bad end: {}", e))?;
    if end <= start {
        return Err(format!("end {} must be greater than start {}", end, start));
    }
    Ok(start..end)
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<StoreError>().map(StoreError::primary) {
        Some(StoreError::NotFound { .. }) => EXIT_NOT_FOUND,
        Some(StoreError::AlreadyExists { .. }) | Some(StoreError::PreconditionFailed { .. }) => {
            EXIT_CONFLICT
        }
        _ => EXIT_FATAL,
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    config.log.verbose |= cli.verbose;
    logging::init_logging(&config.log)?;

    let adapter = storekit::LocalAdapter::new(&cli.root)
        .with_context(|| format!("opening store root {}", cli.root.display()))?;
    let store = Store::with_config(std::sync::Arc::new(adapter), config)?;

    match cli.command {
        Commands::Get {
            path,
            range,
            output,
        } => {
            let path = ObjectPath::parse(&path)?;
            let options = match range {
                Some(range) => GetOptions::new().with_range(range),
                None => GetOptions::new(),
            };
            let mut result = store.get_opts(&path, options).await?;
            let mut chunks = result.stream()?;

            let mut sink: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match output {
                Some(file) => Box::new(tokio::fs::File::create(&file).await?),
                None => Box::new(tokio::io::stdout()),
            };
            while let Some(chunk) = chunks.next().await {
                sink.write_all(&chunk?).await?;
            }
            sink.flush().await?;
        }

        Commands::Put {
            path,
            file,
            create,
            multipart,
            chunk_size,
        } => {
            if create && multipart {
                bail!("--create and --multipart cannot be combined");
            }
            let path = ObjectPath::parse(&path)?;
            let payload = PutPayload::from_path(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;

            let mut options = PutOptions::new();
            if create {
                options = options.create();
            }
            if multipart {
                options = options.with_multipart(true);
            }
            if let Some(size) = chunk_size {
                options = options.with_chunk_size(size);
            }

            let result = store.put(&path, payload, options).await?;
            println!(
                "{} etag={} version={}",
                path,
                result.e_tag.as_deref().unwrap_or("-"),
                result.version.as_deref().unwrap_or("-")
            );
        }

        Commands::Ls {
            prefix,
            offset,
            chunk_size,
        } => {
            let mut pager =
                store.list_with_offset(prefix.as_deref(), offset.as_deref(), chunk_size)?;
            while let Some(chunk) = pager.next_chunk().await? {
                for meta in &chunk {
                    print_meta(meta);
                }
            }
        }

        Commands::Cp {
            from,
            to,
            no_overwrite,
        } => {
            let (from, to) = (ObjectPath::parse(&from)?, ObjectPath::parse(&to)?);
            store.copy(&from, &to, !no_overwrite).await?;
        }

        Commands::Mv {
            from,
            to,
            no_overwrite,
        } => {
            let (from, to) = (ObjectPath::parse(&from)?, ObjectPath::parse(&to)?);
            store.rename(&from, &to, !no_overwrite).await?;
        }

        Commands::Rm { path } => {
            store.delete(&ObjectPath::parse(&path)?).await?;
        }

        Commands::Head { path } => {
            let meta = store.head(&ObjectPath::parse(&path)?).await?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
    }

    Ok(())
}

fn print_meta(meta: &ObjectMeta) {
    println!(
        "{:>12}  {}  {}",
        meta.size,
        meta.last_modified.format("%Y-%m-%d %H:%M:%S"),
        meta.path
    );
}
