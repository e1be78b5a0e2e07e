/// Command line interface — spec.md §6's env-var/CLI boot wrapper, in the
/// teacher's `clap` derive style (`cli.rs`).
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "objmesh", about = "Erasure-coded distributed object storage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the frontend role (file PUT/GET/DELETE, shard fan-out/repair).
    Frontend(RoleArgs),
    /// Run the storage role (shard PUT/GET/DELETE, token-gated reads).
    Storage(RoleArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RoleArgs {
    /// Listen address, host:port. Overrides `LISTEN_ADDR` when set.
    #[arg(long)]
    pub listen: Option<String>,

    /// Root directory this node owns. Overrides `BaseDir` when set.
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Scratch directory for temp files. Overrides `TmpDir` when set.
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Path to a TOML config file; missing path falls back to defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the document index (sled database directory).
    #[arg(long)]
    pub index_path: Option<PathBuf>,
}
