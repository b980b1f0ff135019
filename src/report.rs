//! Markdown documents for commit descriptions and commit history.

use std::fmt::Write as _;
use std::path::Path;

use crate::bridge::CommitDiff;
use crate::decoder::CommitRecord;
use crate::selection::Selection;

fn header(out: &mut String, title: &str, blurb: &str, selection: &Selection) {
    let _ = writeln!(out, "# {}\n", title);
    let _ = writeln!(out, "{}\n", blurb);
    let _ = writeln!(out, "File: `{}`", selection.file_path().display());
    let _ = writeln!(out, "Lines: {} to {}\n", selection.start_line(), selection.end_line());
    out.push_str("---\n\n");
}

fn commit_body(out: &mut String, commit: &CommitRecord) {
    let _ = writeln!(out, "**Author:** {}\n", commit.author);
    let _ = writeln!(out, "**Date:** {}\n", commit.formatted_date());
    if !commit.description.is_empty() {
        let _ = writeln!(out, "**Description:**\n{}\n", commit.description);
    }
}

pub fn commit_descriptions_markdown(selection: &Selection, commits: &[CommitRecord]) -> String {
    let mut out = String::new();
    header(
        &mut out,
        "Commit History Analysis",
        "This file contains the relevant commit history for the selected code.",
        selection,
    );

    for commit in commits {
        let _ = writeln!(out, "## {}\n", commit.title);
        commit_body(&mut out, commit);
        let _ = writeln!(out, "**Commit URL:** [View on GitHub]({})\n", commit.source_url);
        out.push_str("---\n\n");
    }
    out
}

pub fn history_markdown(selection: &Selection, history: &[CommitDiff]) -> String {
    let mut out = String::new();
    header(
        &mut out,
        "Git History Analysis",
        "This file contains the relevant git history for analysis. You can use this information to understand the code evolution and context.",
        selection,
    );

    for entry in history {
        let _ = writeln!(out, "## Commit: {}\n", entry.hash);
        let _ = writeln!(out, "**Title:** {}\n", entry.commit.title);
        commit_body(&mut out, &entry.commit);
        out.push_str("**Changes:**\n");
        let _ = writeln!(out, "```diff\n{}\n```\n", entry.patch.trim_end());
        let _ = writeln!(out, "**Commit URL:** {}\n", entry.commit.source_url);
        out.push_str("---\n\n");
    }
    out
}

/// Suggested document name, e.g. `Git History - main.rs.md`.
pub fn report_file_name(prefix: &str, file: &Path) -> String {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{} - {}.md", prefix, name)
}
