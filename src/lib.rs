pub mod bridge;
pub mod cli;
pub mod cli_types;
pub mod config;
pub mod decoder;
pub mod error;
pub mod invoker;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod resolver;
pub mod selection;
pub mod version;

// Re-export commonly used types
pub use bridge::{Bridge, CommitDiff, DiffInfo, IndexSummary, QueryKind};
pub use cli::CliApp;
pub use config::{BridgeConfig, LogFormat};
pub use decoder::{
    decode, decode_commits, decode_related_files, format_commit_date, CommitRecord, DecodeMode, Decoded,
    RelatedFileRecord,
};
pub use error::{BridgeError, Result, UserFacingError};
pub use invoker::{CommandInvoker, InvocationResult, InvocationSpec, OutputLines, ProcessInvoker};
pub use orchestrator::{AnalysisHandle, AnalysisOrchestrator, AnalysisResult, AnalysisState};
pub use progress::{IndexProgress, ProgressEvent};
pub use resolver::{ResolvedTool, ToolCache, ToolSnapshot, VersionResolver};
pub use selection::Selection;
pub use version::{is_version_compatible, ToolVersion};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
