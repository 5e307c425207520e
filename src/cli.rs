use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chatsync", about = "Live chat previews and chat deletion over a document store")]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON store fixture to load (overrides `store.fixture_path`)
    #[arg(short, long, global = true)]
    pub fixture: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Subscribe as a user and print the chat previews once loaded
    Watch(WatchArgs),
    /// Delete a chat together with all its messages
    Delete(DeleteArgs),
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub name: Option<String>,

    /// Current avatar; stored entries that differ get repaired
    #[arg(long)]
    pub image: Option<String>,

    /// How long to wait for the first snapshot (default: sync.initial_load_timeout_ms)
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct DeleteArgs {
    #[arg(long)]
    pub chat: String,
}
