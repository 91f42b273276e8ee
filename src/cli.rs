use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docseek",
    about = "Ask questions about the documents in your folders"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Search engine backend, overriding the stored setting
    #[arg(long, global = true, value_parser = ["http", "local"])]
    pub engine: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index (or re-index) every PDF and text file in a folder
    Index(IndexArgs),
    /// Answer a question from an indexed folder
    Ask(AskArgs),
    /// Show the context that would be sent to the model for a question
    Context(ContextArgs),
    /// List indexed folders
    Folders {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a folder's index and forget it
    Remove {
        /// Folder to remove
        folder: PathBuf,
    },
    /// Show engine, model and data directory status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Folder to index
    pub folder: PathBuf,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Questions --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// Indexed folder to search (defaults to the only indexed folder)
    #[arg(short = 'f', long)]
    pub folder: Option<PathBuf>,

    /// Ollama model to answer with, overriding the stored setting
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ContextArgs {
    /// The question
    pub question: String,

    /// Indexed folder to search (defaults to the only indexed folder)
    #[arg(short = 'f', long)]
    pub folder: Option<PathBuf>,

    /// Print the assembled context text instead of the source list
    #[arg(long)]
    pub full: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show every setting with its effective value
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a setting
    Set {
        /// Setting name (see `config show`)
        key: String,
        value: String,
    },
    /// Remove a stored setting (revert to default)
    Unset { key: String },
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
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docseek",
            &mut std::io::stdout(),
        );
    }
}
