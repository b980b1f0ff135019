use serde::Serialize;

/// One step of indexing progress, derived from the tool's output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub files_indexed: u64,
    /// Display fraction in `[0, 1)`.
    ///
    /// The tool never reports a total, so this is `files_indexed % 100`
    /// scaled to a fraction: 101 indexed files shows as 1%. It wraps on
    /// purpose and must not be read as real completion.
    pub fraction: f64,
}

/// Counts marker lines in streamed index output.
///
/// The count comes from matching lines, never from numbers the tool prints.
#[derive(Debug, Clone)]
pub struct IndexProgress {
    marker: String,
    files_indexed: u64,
}

impl IndexProgress {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            files_indexed: 0,
        }
    }

    /// Feed one output line; returns an event when it carries the marker.
    pub fn observe(&mut self, line: &str) -> Option<ProgressEvent> {
        if !line.contains(&self.marker) {
            return None;
        }
        self.files_indexed += 1;
        Some(ProgressEvent {
            files_indexed: self.files_indexed,
            fraction: (self.files_indexed % 100) as f64 / 100.0,
        })
    }

    pub fn files_indexed(&self) -> u64 {
        self.files_indexed
    }
}
