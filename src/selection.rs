use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decoder::RelatedFileRecord;
use crate::error::{BridgeError, Result};

/// The line range a query is about: 1-based, inclusive at both ends.
///
/// Both paths are made absolute on construction, so every argument handed
/// to the external tool is absolute regardless of how the host supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    workspace_root: PathBuf,
    file_path: PathBuf,
    start_line: u32,
    end_line: u32,
}

impl Selection {
    pub fn new(
        workspace_root: impl AsRef<Path>,
        file_path: impl AsRef<Path>,
        start_line: u32,
        end_line: u32,
    ) -> Result<Self> {
        if start_line < 1 {
            return Err(BridgeError::invalid_selection("lines are 1-based; start line must be >= 1"));
        }
        if end_line < start_line {
            return Err(BridgeError::invalid_selection(format!(
                "end line {} is before start line {}",
                end_line, start_line
            )));
        }

        Ok(Self {
            workspace_root: absolutize(workspace_root.as_ref())?,
            file_path: absolutize(file_path.as_ref())?,
            start_line,
            end_line,
        })
    }

    /// A caret with nothing selected covers exactly one line.
    pub fn caret(workspace_root: impl AsRef<Path>, file_path: impl AsRef<Path>, line: u32) -> Result<Self> {
        Self::new(workspace_root, file_path, line, line)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    /// `-s <start> -e <end>`
    pub fn line_args(&self) -> Vec<String> {
        vec![
            "-s".to_string(),
            self.start_line.to_string(),
            "-e".to_string(),
            self.end_line.to_string(),
        ]
    }

    /// Where a related file reported relative to the workspace lives on disk.
    pub fn resolve_related(&self, record: &RelatedFileRecord) -> PathBuf {
        normalize(&self.workspace_root.join(&record.relative_path))
    }
}

/// Make `path` absolute against the current directory without touching the
/// filesystem, and drop `.`/`..` components lexically.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
