use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "proxindex",
    about = "Proximity-aware chunk indexer for XML documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

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
    /// Index (or re-sync) a directory of XML documents
    Index(IndexArgs),
    /// Search indexed chunks
    Search(SearchArgs),
    /// Print the chunks a single document would produce, without indexing
    Chunks(ChunksArgs),
    /// Show index settings and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Directory holding the source documents
    pub dir: PathBuf,

    /// Index name, used as the document key prefix (defaults to the
    /// directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Indexer configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Discard the existing index and settings first
    #[arg(long)]
    pub clean: bool,

    /// Glob pattern selecting source files, matched against relative paths
    /// (default: *.xml)
    #[arg(long)]
    pub include: Option<String>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Chunks --

#[derive(Debug, Parser)]
pub struct ChunksArgs {
    /// XML document to chunk
    pub file: PathBuf,

    /// Indexer configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
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
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "proxindex",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["proxindex", "search", "moby dick"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "moby dick");
                assert_eq!(args.count, 10);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_index_options() {
        let cli = Cli::parse_from([
            "proxindex",
            "-v",
            "index",
            "texts",
            "--name",
            "lib",
            "--clean",
            "--include",
            "**/*.tei",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Index(args) => {
                assert_eq!(args.dir, PathBuf::from("texts"));
                assert_eq!(args.name.as_deref(), Some("lib"));
                assert!(args.clean);
                assert_eq!(args.include.as_deref(), Some("**/*.tei"));
                assert!(args.config.is_none());
            }
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result =
            Cli::try_parse_from(["proxindex", "-q", "-v", "status"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }
}
