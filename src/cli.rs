use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "semvault",
    about = "Semantic search and duplicate detection for markdown vaults"
)]
pub struct Cli {
    /// Path to the vault root (falls back to VAULT_PATH)
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    /// Override the embedding model ID
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence all logs except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the vault for documents similar to a query
    Search(SearchArgs),
    /// Find near-duplicates of a document
    Duplicates(DuplicatesArgs),
    /// Rebuild the index from scratch
    Rebuild,
    /// Reconcile the index with the vault incrementally
    Sync,
    /// Show index status
    Status(StatusArgs),
    /// Watch the vault and keep the index in sync
    Watch,
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "5")]
    pub top_k: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Duplicates --

#[derive(Debug, Parser)]
pub struct DuplicatesArgs {
    /// Path of the document to check, absolute or vault-relative
    pub file: String,

    /// Similarity threshold in (0, 1]
    #[arg(short = 't', long)]
    pub threshold: Option<f32>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(self.shell, &mut cmd, "semvault", &mut std::io::stdout());
    }
}
