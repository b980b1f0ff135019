//! Single-query entry points. Each call resolves the tool, runs one
//! invocation (plus `git` where noted) and decodes the answer; every
//! failure is returned to the caller as-is.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::decoder::{decode_commits, decode_related_files, CommitRecord, RelatedFileRecord};
use crate::error::{BridgeError, Result};
use crate::invoker::{CommandInvoker, InvocationSpec, ProcessInvoker};
use crate::progress::{IndexProgress, ProgressEvent};
use crate::resolver::{ResolvedTool, ToolCache, ToolSnapshot, VersionResolver};
use crate::selection::{absolutize, Selection};
use crate::version::ToolVersion;

/// The `-t` argument of a tool query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Index,
    Descriptions,
    RelatedFiles,
}

impl QueryKind {
    pub fn as_arg(self) -> &'static str {
        match self {
            QueryKind::Index => "index",
            QueryKind::Descriptions => "desc",
            QueryKind::RelatedFiles => "query",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffInfo {
    pub title: String,
    pub patch: String,
}

/// A commit from the `desc` query together with its patch for the selected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitDiff {
    pub commit: CommitRecord,
    pub hash: String,
    pub patch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub files_indexed: u64,
    pub completed_at: DateTime<Utc>,
}

pub struct Bridge {
    config: BridgeConfig,
    invoker: Arc<dyn CommandInvoker>,
    resolver: VersionResolver,
    min_version: ToolVersion,
    last_index_time: Mutex<Option<DateTime<Utc>>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_invoker(config, Arc::new(ProcessInvoker::new()))
    }

    pub fn with_invoker(config: BridgeConfig, invoker: Arc<dyn CommandInvoker>) -> Self {
        let resolver = VersionResolver::new(invoker.clone(), &config);
        let min_version = ToolVersion::parse(&config.min_version);
        Self {
            config,
            invoker,
            resolver,
            min_version,
            last_index_time: Mutex::new(None),
        }
    }

    /// Use `cache` instead of the process-wide resolution cache.
    pub fn with_cache(mut self, cache: ToolCache) -> Self {
        self.resolver = self.resolver.with_cache(cache);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.resolver = self.resolver.with_candidates(candidates);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub async fn tool(&self) -> Result<ResolvedTool> {
        self.resolver.resolve(&self.min_version).await
    }

    pub async fn tool_snapshot(&self) -> ToolSnapshot {
        self.resolver.snapshot(&self.min_version).await
    }

    pub fn last_index_time(&self) -> Option<DateTime<Utc>> {
        *self.last_index_time.lock()
    }

    /// `<tool> <root> -t index`
    pub fn index_spec(tool: &str, workspace_root: &Path) -> InvocationSpec {
        let root = workspace_root.to_string_lossy().into_owned();
        InvocationSpec::new(tool, [root, "-t".to_string(), QueryKind::Index.as_arg().to_string()], workspace_root)
    }

    /// `<tool> <root> <file> -t <kind> -s <start> -e <end>`
    pub fn query_spec(tool: &str, kind: QueryKind, selection: &Selection) -> InvocationSpec {
        let mut args = vec![
            selection.workspace_root().to_string_lossy().into_owned(),
            selection.file_path().to_string_lossy().into_owned(),
            "-t".to_string(),
            kind.as_arg().to_string(),
        ];
        args.extend(selection.line_args());
        InvocationSpec::new(tool, args, selection.workspace_root())
    }

    /// Index the workspace, reporting each marker line as it streams in.
    pub async fn index_workspace<F>(&self, workspace_root: &Path, mut on_progress: F) -> Result<IndexSummary>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let tool = self.tool().await?;
        let root = absolutize(workspace_root)?;
        let spec = Self::index_spec(tool.executable_path(), &root);

        let mut lines = self.invoker.stream(&spec).await?;
        let mut progress = IndexProgress::new(self.config.index_marker.as_str());
        let mut output = String::new();
        while let Some(line) = lines.next_line().await {
            if let Some(event) = progress.observe(&line) {
                on_progress(event);
            }
            output.push_str(&line);
            output.push('\n');
        }

        let code = lines.wait().await?;
        if code != 0 {
            return Err(BridgeError::NonZeroExit {
                program: spec.executable,
                code,
                output,
            });
        }

        let completed_at = Utc::now();
        *self.last_index_time.lock() = Some(completed_at);
        info!(files = progress.files_indexed(), root = %root.display(), "workspace indexed");

        Ok(IndexSummary {
            files_indexed: progress.files_indexed(),
            completed_at,
        })
    }

    /// Startup indexing: quiet when the tool is missing, logs instead of failing.
    pub async fn index_on_startup(&self, workspace_root: &Path) -> Option<IndexSummary> {
        if !self.tool_snapshot().await.compatible {
            return None;
        }
        match self.index_workspace(workspace_root, |_| {}).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "startup indexing failed");
                None
            }
        }
    }

    /// Files related to the selection, most occurrences first.
    pub async fn related_files(&self, selection: &Selection) -> Result<Vec<RelatedFileRecord>> {
        let output = self.run_query(QueryKind::RelatedFiles, selection).await?;
        Ok(decode_related_files(&output))
    }

    /// Commits that touched the selected lines, in the order the tool gives them.
    pub async fn commit_descriptions(&self, selection: &Selection) -> Result<Vec<CommitRecord>> {
        let output = self.run_query(QueryKind::Descriptions, selection).await?;
        decode_commits(&output)
    }

    /// Uncommitted changes to the selected file (`git diff HEAD -- <file>`).
    pub async fn working_tree_diff(&self, selection: &Selection) -> Result<Vec<DiffInfo>> {
        let file = selection.file_path().to_string_lossy().into_owned();
        let spec = InvocationSpec::new(
            self.config.git_binary.as_str(),
            ["diff".to_string(), "HEAD".to_string(), "--".to_string(), file],
            selection.workspace_root(),
        );
        let patch = self.invoker.invoke(&spec).await?.into_output(&spec.executable)?;

        if patch.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![DiffInfo {
            title: "Current Changes".to_string(),
            patch,
        }])
    }

    /// Commit descriptions plus `git show <hash> -- <file>` for each commit.
    /// Commits whose patch cannot be produced are logged and left out.
    pub async fn commit_history(&self, selection: &Selection) -> Result<Vec<CommitDiff>> {
        let commits = self.commit_descriptions(selection).await?;
        let file = selection.file_path().to_string_lossy().into_owned();

        let mut history = Vec::with_capacity(commits.len());
        for commit in commits {
            let hash = commit.commit_hash().to_string();
            let spec = InvocationSpec::new(
                self.config.git_binary.as_str(),
                ["show".to_string(), hash.clone(), "--".to_string(), file.clone()],
                selection.workspace_root(),
            );

            match self.invoker.invoke(&spec).await {
                Ok(result) if result.success() => history.push(CommitDiff {
                    commit,
                    hash,
                    patch: result.combined_output,
                }),
                Ok(result) => warn!(
                    %hash,
                    code = result.exit_code,
                    output = %result.combined_output,
                    "git show failed, skipping commit"
                ),
                Err(e) => warn!(%hash, error = %e, "git show could not run, skipping commit"),
            }
        }
        Ok(history)
    }

    async fn run_query(&self, kind: QueryKind, selection: &Selection) -> Result<String> {
        let tool = self.tool().await?;
        let spec = Self::query_spec(tool.executable_path(), kind, selection);
        self.invoker.invoke(&spec).await?.into_output(&spec.executable)
    }
}
