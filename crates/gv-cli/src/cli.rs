use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gridvault",
    about = "Gridvault: chunked binary object storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML file with default settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Collection (namespace) under the root
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Chunk size in bytes for new objects
    #[arg(long, global = true)]
    pub chunk_size: Option<u32>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file as a new object
    Put(PutArgs),
    /// Write an object's bytes to a file or stdout
    Get(GetArgs),
    /// Delete an object
    Rm(IdArgs),
    /// List stored objects
    Ls,
    /// Show an object's metadata
    Stat(IdArgs),
    /// Check whether an object exists
    Exists(IdArgs),
    /// Remove chunks that belong to no object
    Sweep(SweepArgs),
}

#[derive(Args)]
pub struct PutArgs {
    /// File to store, or `-` for stdin
    pub path: PathBuf,
    /// Stored filename (defaults to the file's name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub id: String,
    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Verify the checksum while reading
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args)]
pub struct SweepArgs {
    /// Leave chunks of ids reserved within this many seconds alone
    #[arg(long, default_value = "3600")]
    pub grace_secs: u64,
}
