//! Finding an installed copy of the external tool and checking its version.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::invoker::{CommandInvoker, InvocationSpec};
use crate::version::ToolVersion;

/// A probed installation that passed the compatibility gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    executable_path: String,
    version: ToolVersion,
    validated_at: DateTime<Utc>,
}

impl ResolvedTool {
    pub fn executable_path(&self) -> &str {
        &self.executable_path
    }

    pub fn version(&self) -> ToolVersion {
        self.version
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    pub fn snapshot(&self) -> ToolSnapshot {
        ToolSnapshot {
            path: Some(self.executable_path.clone()),
            compatible: true,
        }
    }
}

/// What the rest of the system gets to see of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSnapshot {
    pub path: Option<String>,
    pub compatible: bool,
}

impl ToolSnapshot {
    pub fn unavailable() -> Self {
        Self {
            path: None,
            compatible: false,
        }
    }
}

static PROCESS_WIDE: Lazy<ToolCache> = Lazy::new(ToolCache::new);

// Applied to the text right after an occurrence of the tool name.
static VERSION_AFTER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+(\d+\.\d+\.\d+)").expect("valid version token regex"));

/// Write-once store for the outcome of the first resolution, positive or
/// negative. There is no expiry: a tool installed or upgraded afterwards is
/// only seen by a fresh cache (in practice, a restarted process).
#[derive(Debug, Clone, Default)]
pub struct ToolCache {
    cell: Arc<OnceCell<Option<ResolvedTool>>>,
}

impl ToolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every resolver in this process that was not given its own.
    pub fn process_wide() -> Self {
        PROCESS_WIDE.clone()
    }

    /// `None` until a resolution has completed.
    pub fn peek(&self) -> Option<Option<ResolvedTool>> {
        self.cell.get().cloned()
    }
}

pub struct VersionResolver {
    invoker: Arc<dyn CommandInvoker>,
    tool_name: String,
    candidates: Vec<String>,
    probe_dir: PathBuf,
    cache: ToolCache,
}

impl VersionResolver {
    pub fn new(invoker: Arc<dyn CommandInvoker>, config: &BridgeConfig) -> Self {
        Self {
            invoker,
            tool_name: config.tool_name.clone(),
            candidates: config.candidate_paths(),
            probe_dir: std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()),
            cache: ToolCache::process_wide(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_cache(mut self, cache: ToolCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Return the first candidate that runs, exits 0, reports a version and
    /// meets `min_required`. Later candidates are never compared against it.
    ///
    /// Only the first call probes; every later call answers from the cache,
    /// including a cached "not found".
    pub async fn resolve(&self, min_required: &ToolVersion) -> Result<ResolvedTool> {
        let outcome = self
            .cache
            .cell
            .get_or_init(|| self.probe_all(min_required))
            .await;

        outcome.clone().ok_or_else(|| BridgeError::ToolNotFound {
            tool: self.tool_name.clone(),
            required: min_required.to_string(),
        })
    }

    pub async fn snapshot(&self, min_required: &ToolVersion) -> ToolSnapshot {
        match self.resolve(min_required).await {
            Ok(tool) => tool.snapshot(),
            Err(_) => ToolSnapshot::unavailable(),
        }
    }

    async fn probe_all(&self, min_required: &ToolVersion) -> Option<ResolvedTool> {
        for candidate in &self.candidates {
            let Some(version) = self.probe(candidate).await else {
                continue;
            };

            if version.is_compatible_with(min_required) {
                info!(path = %candidate, %version, "found {}", self.tool_name);
                return Some(ResolvedTool {
                    executable_path: candidate.clone(),
                    version,
                    validated_at: Utc::now(),
                });
            }
            debug!(path = %candidate, %version, required = %min_required, "version too old, trying next candidate");
        }

        warn!(tool = %self.tool_name, required = %min_required, "binary not found or version incompatible");
        None
    }

    async fn probe(&self, candidate: &str) -> Option<ToolVersion> {
        let spec = InvocationSpec::new(candidate, ["--version"], &self.probe_dir);
        let result = match self.invoker.invoke(&spec).await {
            Ok(result) => result,
            Err(e) => {
                debug!(path = %candidate, error = %e, "version probe failed to run");
                return None;
            }
        };

        if !result.success() {
            debug!(path = %candidate, code = result.exit_code, "version probe exited non-zero");
            return None;
        }

        let version = version_token(&result.combined_output, &self.tool_name);
        if version.is_none() {
            debug!(path = %candidate, "version output not recognised");
        }
        version
    }
}

/// Find the first `<name> <major>.<minor>.<patch>` token in `output`.
fn version_token(output: &str, name: &str) -> Option<ToolVersion> {
    if name.is_empty() {
        return None;
    }
    output.match_indices(name).find_map(|(at, _)| {
        VERSION_AFTER_NAME
            .captures(&output[at + name.len()..])
            .map(|caps| ToolVersion::parse(&caps[1]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{InvocationResult, MockCommandInvoker};
    use std::io;

    fn ok(output: &str) -> Result<InvocationResult> {
        Ok(InvocationResult {
            exit_code: 0,
            combined_output: output.to_string(),
        })
    }

    fn resolver(mock: MockCommandInvoker, candidates: &[&str]) -> VersionResolver {
        VersionResolver::new(Arc::new(mock), &BridgeConfig::default())
            .with_candidates(candidates.iter().map(|c| c.to_string()).collect())
            .with_cache(ToolCache::new())
    }

    const MIN: ToolVersion = ToolVersion::new(0, 9, 0);

    #[tokio::test]
    async fn test_first_acceptable_candidate_wins() {
        let mut mock = MockCommandInvoker::new();
        mock.expect_invoke()
            .withf(|spec| spec.executable == "/a/contextpilot")
            .times(1)
            .returning(|_| ok("contextpilot 0.9.1\n"));
        // never probed: /a already qualifies
        mock.expect_invoke()
            .withf(|spec| spec.executable == "/b/contextpilot")
            .times(0)
            .returning(|_| ok("contextpilot 5.0.0\n"));

        let tool = resolver(mock, &["/a/contextpilot", "/b/contextpilot"])
            .resolve(&MIN)
            .await
            .unwrap();
        assert_eq!(tool.executable_path(), "/a/contextpilot");
        assert_eq!(tool.version(), ToolVersion::new(0, 9, 1));
    }

    #[tokio::test]
    async fn test_skips_launch_failures_bad_exits_and_old_versions() {
        let mut mock = MockCommandInvoker::new();
        mock.expect_invoke().returning(|spec| match spec.executable.as_str() {
            "missing" => Err(BridgeError::LaunchFailure {
                program: "missing".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            }),
            "crashes" => Ok(InvocationResult {
                exit_code: 1,
                combined_output: "contextpilot 9.9.9".to_string(),
            }),
            "unbranded" => ok("some-other-tool 1.0.0"),
            "old" => ok("contextpilot 0.8.7"),
            _ => ok("contextpilot 1.0.0 (abc)"),
        });

        let tool = resolver(mock, &["missing", "crashes", "unbranded", "old", "good"])
            .resolve(&MIN)
            .await
            .unwrap();
        assert_eq!(tool.executable_path(), "good");
        assert_eq!(tool.snapshot(), ToolSnapshot { path: Some("good".to_string()), compatible: true });
    }

    #[tokio::test]
    async fn test_probe_arguments_and_working_directory() {
        let mut mock = MockCommandInvoker::new();
        mock.expect_invoke()
            .withf(|spec| spec.arguments == vec!["--version".to_string()] && spec.working_directory.is_absolute())
            .times(1)
            .returning(|_| ok("contextpilot 0.9.0"));

        assert!(resolver(mock, &["contextpilot"]).resolve(&MIN).await.is_ok());
    }

    #[tokio::test]
    async fn test_positive_result_is_cached() {
        let mut mock = MockCommandInvoker::new();
        mock.expect_invoke().times(1).returning(|_| ok("contextpilot 0.9.3"));

        let resolver = resolver(mock, &["contextpilot"]);
        for _ in 0..3 {
            assert!(resolver.resolve(&MIN).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let mut mock = MockCommandInvoker::new();
        mock.expect_invoke().times(2).returning(|_| ok("contextpilot 0.1.0"));

        let cache = ToolCache::new();
        let resolver = resolver(mock, &["one", "two"]).with_cache(cache.clone());

        let err = resolver.resolve(&MIN).await.unwrap_err();
        assert!(matches!(err, BridgeError::ToolNotFound { .. }));
        assert!(resolver.resolve(&MIN).await.is_err());
        assert_eq!(cache.peek(), Some(None));
        assert_eq!(resolver.snapshot(&MIN).await, ToolSnapshot::unavailable());
    }

    #[test]
    fn test_cache_is_empty_until_resolved() {
        let mut mock = MockCommandInvoker::new();
        mock.expect_invoke().times(1).returning(|_| ok("contextpilot 0.9.0"));

        let cache = ToolCache::new();
        let resolver = resolver(mock, &["contextpilot"]).with_cache(cache.clone());
        assert_eq!(cache.peek(), None);

        tokio_test::block_on(resolver.resolve(&MIN)).unwrap();
        assert!(matches!(cache.peek(), Some(Some(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_first_resolutions_probe_once() {
        let probes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = probes.clone();

        let mut mock = MockCommandInvoker::new();
        mock.expect_invoke().times(1).returning(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(100));
            ok("contextpilot 0.9.2")
        });

        let resolver = Arc::new(resolver(mock, &["contextpilot"]));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve(&MIN).await })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            let tool = task.unwrap().unwrap();
            assert_eq!(tool.version(), ToolVersion::new(0, 9, 2));
        }
        assert_eq!(probes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_version_token_needs_name_then_version() {
        assert_eq!(
            version_token("contextpilot 0.9.4 (abc)", "contextpilot"),
            Some(ToolVersion::new(0, 9, 4))
        );
        assert_eq!(
            version_token("built by cargo 1.75.0\ncontextpilot\t2.0.1", "contextpilot"),
            Some(ToolVersion::new(2, 0, 1))
        );
        // the name is matched literally, not as a pattern
        assert_eq!(version_token("c.p 1.2.3", "c.p"), Some(ToolVersion::new(1, 2, 3)));
        assert_eq!(version_token("cxp 1.2.3", "c.p"), None);
        assert_eq!(version_token("contextpilot version 1.0.0", "contextpilot"), None);
        assert_eq!(version_token("1.0.0", ""), None);
    }

    #[tokio::test]
    async fn test_cache_is_shared_between_resolvers() {
        let mut first = MockCommandInvoker::new();
        first.expect_invoke().times(1).returning(|_| ok("contextpilot 1.2.3"));
        let mut second = MockCommandInvoker::new();
        second.expect_invoke().times(0).returning(|_| ok("contextpilot 9.9.9"));

        let cache = ToolCache::new();
        let a = resolver(first, &["x"]).with_cache(cache.clone());
        let b = resolver(second, &["y"]).with_cache(cache.clone());

        assert_eq!(a.resolve(&MIN).await.unwrap().executable_path(), "x");
        assert_eq!(b.resolve(&MIN).await.unwrap().executable_path(), "x");
    }
}
