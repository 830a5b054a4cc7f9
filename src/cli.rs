use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "libris",
    about = "Query a folder-based bibliography and its citation graph"
)]
pub struct Cli {
    /// Library root directory
    #[arg(short, long, global = true, default_value = ".")]
    pub library: PathBuf,

    /// Override the XDG cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Number of worker threads (default: one per core)
    #[arg(short = 'j', long, global = true)]
    pub workers: Option<usize>,

    /// Ignore the document cache and always scan the library
    #[arg(long, global = true)]
    pub no_cache: bool,

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
    /// List documents matching a free-text query
    Search(SearchArgs),
    /// Show the works a document cites
    Citations(CitationsArgs),
    /// Show local documents citing a document
    CitedBy(CitedByArgs),
    /// Fetch metadata for a DOI, DOI link or query
    Fetch(FetchArgs),
    /// Manage the document cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Query tokens; all documents when omitted
    pub query: Vec<String>,

    /// Override the fields searched, e.g. "{author} {title}"
    #[arg(long)]
    pub format: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn search(&self) -> String {
        self.query.join(" ")
    }
}

// -- Citations --

#[derive(Debug, Parser)]
pub struct CitationsArgs {
    /// Document folder
    pub folder: PathBuf,

    /// Update stored citations from the library without network access
    #[arg(long, conflicts_with = "force")]
    pub refresh: bool,

    /// Resolve again even when citations are stored
    #[arg(long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CitedByArgs {
    /// Document folder
    pub folder: PathBuf,

    /// Resolve again even when backlinks are stored
    #[arg(long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Fetch --

#[derive(Debug, Parser)]
pub struct FetchArgs {
    /// DOI, DOI link or free-text query
    pub uri: String,

    /// Use this importer instead of every importer matching the URI
    #[arg(long)]
    pub importer: Option<String>,
}

// -- Cache --

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Delete the cached snapshot of the library
    Clear,
    /// Scan the library again and rewrite the cache
    Update,
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
            "libris",
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
        let cli = Cli::parse_from(["libris", "search", "einstein", "1905"]);
        assert_eq!(cli.library, PathBuf::from("."));
        assert!(!cli.no_cache);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.search(), "einstein 1905");
                assert!(args.format.is_none());
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "libris", "cited-by", "papers/a", "-l", "papers", "-j", "4",
        ]);
        assert_eq!(cli.library, PathBuf::from("papers"));
        assert_eq!(cli.workers, Some(4));
        assert!(matches!(cli.command, Command::CitedBy(_)));
    }

    #[test]
    fn refresh_conflicts_with_force() {
        let result = Cli::try_parse_from([
            "libris",
            "citations",
            "a",
            "--refresh",
            "--force",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_cache_update() {
        let cli = Cli::parse_from(["libris", "cache", "update"]);
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Update
            }
        ));
    }
}
