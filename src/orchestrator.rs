//! Concurrent analysis of one selection.
//!
//! Three sub-queries (working-tree diff, related files, commit descriptions)
//! run as separate tasks against the same selection. A failing sub-query
//! only empties its own section; the aggregate is delivered once, after all
//! three have returned. Runs are independent of each other, even for the
//! same file, and there is no way to cancel one: dropping its handle just
//! stops anyone from observing it.
//!
//! Tasks go to the runtime the orchestrator was built with, so `analyze`
//! may be called from a thread that is not part of any runtime.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::future::join3;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bridge::{Bridge, DiffInfo};
use crate::decoder::{CommitRecord, RelatedFileRecord};
use crate::error::Result;
use crate::selection::Selection;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub diffs: Vec<DiffInfo>,
    pub context_files: Vec<RelatedFileRecord>,
    pub commits: Vec<CommitRecord>,
}

impl AnalysisResult {
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty() && self.context_files.is_empty() && self.commits.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnalysisState {
    Idle = 0,
    Running = 1,
    /// All sub-queries returned and the callback was invoked.
    Completed = 2,
    /// The run itself aborted before the callback was reached.
    Failed = 3,
}

impl AnalysisState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AnalysisState::Idle,
            1 => AnalysisState::Running,
            2 => AnalysisState::Completed,
            _ => AnalysisState::Failed,
        }
    }
}

/// Observes one run started by [`AnalysisOrchestrator::analyze`].
pub struct AnalysisHandle {
    run_id: Uuid,
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl AnalysisHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> AnalysisState {
        AnalysisState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Wait until the run has finished, callback included.
    ///
    /// A panicking callback does not turn a completed run into a failed one.
    pub async fn wait(self) -> AnalysisState {
        if let Err(e) = self.task.await {
            error!(run_id = %self.run_id, error = %e, "analysis supervisor aborted");
            let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != AnalysisState::Completed as u8).then_some(AnalysisState::Failed as u8)
            });
        }
        AnalysisState::from_u8(self.state.load(Ordering::Acquire))
    }
}

#[derive(Clone)]
pub struct AnalysisOrchestrator {
    bridge: Arc<Bridge>,
    runtime: Handle,
}

impl AnalysisOrchestrator {
    pub fn new(bridge: Arc<Bridge>, runtime: Handle) -> Self {
        Self { bridge, runtime }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Run all sub-queries and wait for every one of them.
    pub async fn run(&self, selection: &Selection) -> AnalysisResult {
        let diffs = self.spawn_section(selection, |bridge, sel| async move {
            bridge.working_tree_diff(&sel).await
        });
        let context_files = self.spawn_section(selection, |bridge, sel| async move {
            bridge.related_files(&sel).await
        });
        let commits = self.spawn_section(selection, |bridge, sel| async move {
            bridge.commit_descriptions(&sel).await
        });

        let (diffs, context_files, commits) = join3(diffs, context_files, commits).await;
        AnalysisResult {
            diffs: settle("diffs", diffs),
            context_files: settle("context files", context_files),
            commits: settle("commits", commits),
        }
    }

    /// Start a run in the background; `callback` receives the aggregate
    /// exactly once, after every sub-query has returned.
    pub fn analyze<F>(&self, selection: Selection, callback: F) -> AnalysisHandle
    where
        F: FnOnce(AnalysisResult) + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let state = Arc::new(AtomicU8::new(AnalysisState::Idle as u8));
        let span = info_span!("analysis", %run_id);

        let orchestrator = self.clone();
        let task_state = state.clone();
        let runtime = self.runtime.clone();
        let task = self.runtime.spawn(
            async move {
                task_state.store(AnalysisState::Running as u8, Ordering::Release);
                let run = runtime.spawn(
                    async move { orchestrator.run(&selection).await }.in_current_span(),
                );

                match run.await {
                    Ok(result) => {
                        info!(
                            diffs = result.diffs.len(),
                            context_files = result.context_files.len(),
                            commits = result.commits.len(),
                            "analysis completed"
                        );
                        task_state.store(AnalysisState::Completed as u8, Ordering::Release);
                        callback(result);
                    }
                    Err(e) => {
                        error!(error = %e, "analysis run aborted");
                        task_state.store(AnalysisState::Failed as u8, Ordering::Release);
                    }
                }
            }
            .instrument(span),
        );

        AnalysisHandle { run_id, state, task }
    }

    /// Like [`analyze`](Self::analyze), but hands the result to whoever holds
    /// the receiver, e.g. a foreground loop.
    pub fn analyze_to_channel(&self, selection: Selection) -> (AnalysisHandle, oneshot::Receiver<AnalysisResult>) {
        let (tx, rx) = oneshot::channel();
        let handle = self.analyze(selection, move |result| {
            let _ = tx.send(result);
        });
        (handle, rx)
    }

    fn spawn_section<T, F, Fut>(&self, selection: &Selection, query: F) -> JoinHandle<Result<Vec<T>>>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Bridge>, Selection) -> Fut,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        self.runtime.spawn(query(self.bridge.clone(), selection.clone()).in_current_span())
    }
}

// Each section absorbs its own failure.
fn settle<T>(section: &str, outcome: std::result::Result<Result<Vec<T>>, tokio::task::JoinError>) -> Vec<T> {
    match outcome {
        Ok(Ok(items)) => items,
        Ok(Err(e)) => {
            warn!(section, error = %e, "sub-query failed, section left empty");
            Vec::new()
        }
        Err(e) => {
            warn!(section, error = %e, "sub-query task aborted, section left empty");
            Vec::new()
        }
    }
}
