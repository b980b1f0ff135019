// Integration test for the public API
use contextpilot_bridge::{
    decode_commits, decode_related_files, is_version_compatible, AnalysisOrchestrator, AnalysisState, Bridge,
    BridgeConfig, BridgeError, Selection, ToolCache, ToolVersion, UserFacingError, VERSION,
};

#[test]
fn test_version_constant() {
    assert!(!VERSION.is_empty());
    assert!(VERSION.starts_with("0."));
}

#[test]
fn test_compatibility_gate() {
    assert!(is_version_compatible("1.0.0", "0.9.9"));
    assert!(!is_version_compatible("0.9.0", "0.9.5"));
    assert!(is_version_compatible("0.9.5", "0.9.5"));
    assert_eq!(ToolVersion::parse("nothing"), ToolVersion::new(0, 0, 0));
}

#[test]
fn test_decoders() {
    assert!(decode_commits("[]").unwrap().is_empty());
    assert!(matches!(decode_commits("not json"), Err(BridgeError::MalformedResponse(_))));

    let counts: Vec<u32> = decode_related_files("a - 3\nb - 7\nc - 7\nd - 1")
        .into_iter()
        .map(|r| r.occurrence_count)
        .collect();
    assert_eq!(counts, vec![7, 7, 3, 1]);
}

#[test]
fn test_error_types() {
    let error = BridgeError::MalformedResponse("test".to_string());
    match &error {
        BridgeError::MalformedResponse(msg) => assert_eq!(msg, "test"),
        _ => panic!("Unexpected error type"),
    }

    let error = BridgeError::ToolNotFound {
        tool: "contextpilot".to_string(),
        required: "0.9.0".to_string(),
    };
    assert_eq!(error.to_user_facing(), UserFacingError::ExternalToolUnavailable);
}

#[cfg(unix)]
mod fake_tool {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::runtime::Handle;

    const COMMITS: &str = r#"[["fix bug","desc","alice","2024-01-01T00:00:00Z","https://x/abc123"]]"#;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// A stand-in for contextpilot; `desc_exit` lets a test break the commit query.
    fn contextpilot(dir: &Path, desc_exit: i32) -> PathBuf {
        let body = format!(
            r#"case "$1" in
  --version) echo "contextpilot 0.9.5 (fake)"; exit 0;;
esac
case "$*" in
  *"-t index"*)
    echo "Indexing file: a.rs"
    echo "Indexing file: b.rs" 1>&2
    echo "Indexing file: c.rs"
    echo "done"
    exit 0;;
  *"-t desc"*)
    if [ {desc_exit} -ne 0 ]; then echo "desc failed"; exit {desc_exit}; fi
    echo '{commits}'
    exit 0;;
  *"-t query"*)
    printf 'src/a.rs - 3 occurrences\nsrc/b.rs - 7 occurrences\n\nnot a record\n'
    exit 0;;
esac
exit 64
"#,
            desc_exit = desc_exit,
            commits = COMMITS
        );
        write_script(dir, "contextpilot", &body)
    }

    fn fake_git(dir: &Path) -> PathBuf {
        write_script(
            dir,
            "git",
            "case \"$1\" in\n  diff) printf '%s\\n' '-old' '+new'; exit 0;;\nesac\nexit 1\n",
        )
    }

    fn bridge(bin_dir: &Path, desc_exit: i32) -> Bridge {
        let tool = contextpilot(bin_dir, desc_exit);
        let git = fake_git(bin_dir);
        let config = BridgeConfig {
            git_binary: git.to_string_lossy().into_owned(),
            ..BridgeConfig::default()
        };
        Bridge::new(config)
            .with_candidates(vec![
                bin_dir.join("missing-contextpilot").to_string_lossy().into_owned(),
                tool.to_string_lossy().into_owned(),
            ])
            .with_cache(ToolCache::new())
    }

    fn workspace() -> (TempDir, Selection) {
        let ws = TempDir::new().unwrap();
        let file = ws.path().join("a.txt");
        fs::write(&file, "line\n".repeat(20)).unwrap();
        let selection = Selection::new(ws.path(), &file, 10, 12).unwrap();
        (ws, selection)
    }

    #[tokio::test]
    async fn test_resolves_past_missing_candidate() {
        let bin = TempDir::new().unwrap();
        let bridge = bridge(bin.path(), 0);

        let tool = bridge.tool().await.unwrap();
        assert!(tool.executable_path().ends_with("/contextpilot"));
        assert_eq!(tool.version(), ToolVersion::new(0, 9, 5));
        assert!(bridge.tool_snapshot().await.compatible);
    }

    #[tokio::test]
    async fn test_commit_descriptions_end_to_end() {
        let bin = TempDir::new().unwrap();
        let (_ws, selection) = workspace();

        let commits = bridge(bin.path(), 0).commit_descriptions(&selection).await.unwrap();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].source_url.ends_with("abc123"));
        assert_ne!(commits[0].formatted_date(), "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_related_files_sorted_and_lenient() {
        let bin = TempDir::new().unwrap();
        let (_ws, selection) = workspace();

        let files = bridge(bin.path(), 0).related_files(&selection).await.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["src/b.rs", "src/a.rs"]);
    }

    #[tokio::test]
    async fn test_index_counts_markers_from_both_streams() {
        let bin = TempDir::new().unwrap();
        let (ws, _) = workspace();
        let bridge = bridge(bin.path(), 0);

        let mut seen = Vec::new();
        let summary = bridge
            .index_workspace(ws.path(), |event| seen.push(event.files_indexed))
            .await
            .unwrap();

        assert_eq!(summary.files_indexed, 3);
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(bridge.last_index_time().is_some());
    }

    #[tokio::test]
    async fn test_analysis_survives_failing_commit_query() {
        let bin = TempDir::new().unwrap();
        let (_ws, selection) = workspace();
        let orchestrator = AnalysisOrchestrator::new(Arc::new(bridge(bin.path(), 3)), Handle::current());

        let (handle, rx) = orchestrator.analyze_to_channel(selection);
        let result = rx.await.unwrap();

        assert_eq!(result.context_files.len(), 2);
        assert!(result.commits.is_empty());
        assert_eq!(result.diffs.len(), 1);
        assert!(result.diffs[0].patch.contains("+new"));
        assert_eq!(handle.wait().await, AnalysisState::Completed);
    }

    #[tokio::test]
    async fn test_commit_failure_reaches_single_query_caller() {
        let bin = TempDir::new().unwrap();
        let (_ws, selection) = workspace();

        let err = bridge(bin.path(), 3).commit_descriptions(&selection).await.unwrap_err();
        match &err {
            BridgeError::NonZeroExit { code, output, .. } => {
                assert_eq!(*code, 3);
                assert!(output.contains("desc failed"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.to_user_facing(), UserFacingError::ExternalToolUnavailable);
    }
}
