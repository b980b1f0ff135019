use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::Result;
use crate::selection::Selection;

#[derive(Parser, Debug)]
#[command(name = "contextpilot-bridge", author, version, about = "Query code history through contextpilot", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the per-user bridge.toml)
    #[arg(short, long, global = true, env = "CONTEXTPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Locate contextpilot and check its version
    Check,
    /// Index a workspace
    Index(IndexArgs),
    /// Files related to a line range
    Related(SelectionArgs),
    /// Commits that touched a line range
    Commits(SelectionArgs),
    /// Commits that touched a line range, with their diffs
    History(SelectionArgs),
    /// Diff, related files and commits in one concurrent run
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Workspace root
    #[arg(default_value = ".")]
    pub workspace: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Workspace root
    pub workspace: PathBuf,

    /// File inside the workspace
    pub file: PathBuf,

    /// First line (1-based)
    #[arg(short = 's', long = "start")]
    pub start: u32,

    /// Last line, inclusive (defaults to the first line)
    #[arg(short = 'e', long = "end")]
    pub end: Option<u32>,
}

impl SelectionArgs {
    pub fn to_selection(&self) -> Result<Selection> {
        Selection::new(&self.workspace, &self.file, self.start, self.end.unwrap_or(self.start))
    }
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Index the workspace before analysing
    #[arg(long)]
    pub index_first: bool,
}
