use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::settings::MAX_SEARCH_LIMIT;

#[derive(Debug, Parser)]
#[command(
    name = "docshelf",
    about = "A local research-document shelf with categories and full-text search"
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
    /// Import, list, inspect and remove documents
    Document {
        #[command(subcommand)]
        action: DocumentAction,
    },
    /// Manage categories and document membership
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Search documents and categories
    Search(SearchArgs),
    /// Show or change persistent settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Show system status and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Document subcommands --

#[derive(Debug, Subcommand)]
pub enum DocumentAction {
    /// Import a file, or every supported file under a directory
    Add(AddArgs),
    /// List documents
    List(ListArgs),
    /// Show one document with its categories and file location
    Show {
        /// Document id
        id: u64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a document from the shelf (the file stays on disk)
    Remove {
        /// Document id
        id: u64,
    },
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// File or directory to import
    pub path: PathBuf,

    /// Title (single files only; defaults to the first heading or file name)
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub summary: Option<String>,

    /// Category to file the document under (repeatable)
    #[arg(short = 'c', long = "category")]
    pub categories: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Only documents in this category
    #[arg(short = 'c', long, conflicts_with = "uncategorized")]
    pub category: Option<String>,

    /// Only documents without any category
    #[arg(long)]
    pub uncategorized: bool,

    /// Glob pattern applied to the stored file name
    #[arg(long)]
    pub pattern: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Category subcommands --

#[derive(Debug, Subcommand)]
pub enum CategoryAction {
    /// Create a category
    Add {
        /// Unique category name
        name: String,
    },
    /// Delete a category (documents stay, they are only unlinked)
    Remove {
        name: String,
    },
    /// List all categories
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// File a document under a category
    Assign {
        document_id: u64,
        category: String,
    },
    /// Take a document out of a category
    Unassign {
        document_id: u64,
        category: String,
    },
}

// -- Settings --

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show or set the directory imported files are copied into
    DocumentPath {
        /// New directory; prints the current one when omitted
        path: Option<PathBuf>,
    },
    /// Show or set how many documents and categories a search returns
    SearchLimits {
        #[arg(long, value_parser = limit_parser())]
        documents: Option<u16>,
        #[arg(long, value_parser = limit_parser())]
        categories: Option<u16>,
    },
}

fn limit_parser() -> impl clap::builder::TypedValueParser<Value = u16> {
    clap::value_parser!(u16).range(..=MAX_SEARCH_LIMIT as i64)
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

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
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docshelf",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_document_add() {
        let cli = Cli::parse_from([
            "docshelf", "document", "add", "paper.pdf", "--title", "Quantum",
            "-c", "Physics", "-c", "Computing",
        ]);
        match cli.command {
            Command::Document {
                action: DocumentAction::Add(args),
            } => {
                assert_eq!(args.path, PathBuf::from("paper.pdf"));
                assert_eq!(args.title.as_deref(), Some("Quantum"));
                assert_eq!(args.categories, vec!["Physics", "Computing"]);
                assert!(args.author.is_none());
            }
            _ => panic!("expected document add"),
        }
    }

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["docshelf", "search", "linear algebra"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "linear algebra");
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn list_filters_conflict() {
        let parsed = Cli::try_parse_from([
            "docshelf", "document", "list", "--category", "X", "--uncategorized",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn search_limits_are_bounded() {
        let cli = Cli::parse_from([
            "docshelf", "settings", "search-limits", "--documents", "1000",
        ]);
        assert!(matches!(
            cli.command,
            Command::Settings {
                action: SettingsAction::SearchLimits {
                    documents: Some(1000),
                    categories: None,
                },
            }
        ));

        let parsed = Cli::try_parse_from([
            "docshelf", "settings", "search-limits", "--documents", "1001",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
