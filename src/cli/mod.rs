//! CLI module for kbase
//!
//! Provides command-line interface parsing for the kbase-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kbase - local knowledge-base server
///
/// Ingests plain-text documents into a vector index and answers questions
/// from them through a local model server.
#[derive(Parser, Debug)]
#[command(
    name = "kbase-server",
    version,
    about = "kbase - local knowledge-base server",
    long_about = "Ingests plain-text and Markdown documents into a vector index and answers\n\
                  questions from them, falling back to the model's own knowledge when nothing\n\
                  relevant is stored.\n\n\
                  Run without a command to start the HTTP server.",
    after_help = "EXAMPLES:\n    \
                  kbase-server                          # Start the server (reads kbase.toml)\n    \
                  kbase-server ingest notes.md faq.txt  # Ingest local files\n    \
                  kbase-server ask \"What is X?\" --stream # Ask from the terminal\n    \
                  kbase-server --config my.toml stats   # Use a custom config file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "kbase.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Ingest local text or Markdown files
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask a question from the terminal
    Ask {
        /// The question
        question: String,

        /// Number of segments to retrieve (defaults to rag.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,
    },

    /// Remove every document, vector and chat entry
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show knowledge base statistics
    Stats,

    /// Show configuration information
    Config {
        /// Only validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The command to run; no command means `serve`.
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Serve)
    }
}
