// src/cli.rs

use crate::analyzer::MineConfig;
use crate::extract::DEFAULT_MAX_LINES;
use crate::keyword::DEFAULT_PATTERN;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mine the history of one or more repositories for assertion changes
    Mine {
        /// Path to a git repository; repeat to mine several in parallel
        #[arg(short, long, required = true)]
        repo: Vec<PathBuf>,

        /// Directory to write one JSON export per repository into
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// How many predicates to list in the summary
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Summary format on stdout
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        #[command(flatten)]
        filters: Filters,
    },
    /// List the assertions present in a single revision
    Scan {
        /// Path to the git repository
        #[arg(short, long)]
        repo: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        #[command(flatten)]
        filters: Filters,
    },
}

#[derive(clap::Args, Debug)]
pub struct Filters {
    /// Revision to start from
    #[arg(long, default_value = "HEAD")]
    pub rev: String,

    /// Regex of assertion keywords, matched as whole words
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Maximum number of lines one assertion may span
    #[arg(long, default_value_t = DEFAULT_MAX_LINES)]
    pub max_lines: usize,

    /// File extensions to scan (repeatable)
    #[arg(long = "ext", default_values = ["c", "h"])]
    pub extensions: Vec<String>,

    /// Also diff merge commits against their first parent
    #[arg(long)]
    pub diff_merges: bool,
}

impl Filters {
    pub fn to_config(&self) -> MineConfig {
        MineConfig {
            revision: self.rev.clone(),
            pattern: self.pattern.clone(),
            max_lines: self.max_lines,
            extensions: self.extensions.clone(),
            diff_merges: self.diff_merges,
            ..MineConfig::default()
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable summary
    Text,
    /// JSON document
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mine_arguments() {
        let args = Args::parse_from(["git-asserts", "-vv", "mine", "--repo", "a", "--repo", "b", "--ext", "cpp", "--max-lines", "4"]);
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Mine { repo, filters, format, .. } => {
                assert_eq!(repo, vec![PathBuf::from("a"), PathBuf::from("b")]);
                assert_eq!(format, Format::Text);
                let config = filters.to_config();
                assert_eq!(config.extensions, vec!["cpp"]);
                assert_eq!(config.max_lines, 4);
                assert_eq!(config.revision, "HEAD");
                assert_eq!(config.pattern, DEFAULT_PATTERN);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn default_extensions() {
        let args = Args::parse_from(["git-asserts", "scan", "--repo", "."]);
        let Command::Scan { filters, .. } = args.command else { panic!("expected scan") };
        assert_eq!(filters.extensions, vec!["c", "h"]);
    }
}
