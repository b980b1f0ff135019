//! Decoding of the two output protocols spoken by the external tool.
//!
//! Commit descriptions come back as strict JSON and any deviation is an
//! error. Related files come back as loose text and are decoded best-effort,
//! one line at a time.

use std::path::Path;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};

const DISPLAY_DATE_FORMAT: &str = "%b %d, %Y %H:%M:%S";
const RELATED_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub title: String,
    pub description: String,
    pub author: String,
    /// ISO-8601 instant exactly as the tool emitted it.
    pub date: String,
    pub source_url: String,
}

impl CommitRecord {
    /// Last `/`-separated segment of the source URL.
    pub fn commit_hash(&self) -> &str {
        self.source_url.rsplit('/').next().unwrap_or(&self.source_url)
    }

    pub fn formatted_date(&self) -> String {
        format_commit_date(&self.date)
    }
}

impl From<[String; 5]> for CommitRecord {
    fn from([title, description, author, date, source_url]: [String; 5]) -> Self {
        Self {
            title,
            description,
            author,
            date,
            source_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedFileRecord {
    pub relative_path: String,
    pub occurrence_count: u32,
}

impl RelatedFileRecord {
    pub fn file_name(&self) -> &str {
        Path::new(&self.relative_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.relative_path)
    }

    pub fn parent_path(&self) -> &str {
        Path::new(&self.relative_path)
            .parent()
            .and_then(|parent| parent.to_str())
            .unwrap_or("")
    }

    /// The line form the tool emits for this record.
    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.relative_path, RELATED_SEPARATOR, self.occurrence_count)
    }
}

/// Which protocol a piece of output is expected to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Commits,
    RelatedFiles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Commits(Vec<CommitRecord>),
    RelatedFiles(Vec<RelatedFileRecord>),
}

pub fn decode(mode: DecodeMode, raw: &str) -> Result<Decoded> {
    match mode {
        DecodeMode::Commits => decode_commits(raw).map(Decoded::Commits),
        DecodeMode::RelatedFiles => Ok(Decoded::RelatedFiles(decode_related_files(raw))),
    }
}

/// Strict: the whole output must be a JSON array of 5-string arrays.
pub fn decode_commits(raw: &str) -> Result<Vec<CommitRecord>> {
    let rows: Vec<[String; 5]> = serde_json::from_str(raw)
        .map_err(|e| BridgeError::malformed(format!("commit list is not an array of 5-string arrays: {}", e)))?;
    Ok(rows.into_iter().map(CommitRecord::from).collect())
}

/// Lenient: never fails. Lines without the `" - "` separator are skipped,
/// and a count with no digits in it becomes 0. The result is ordered by
/// occurrence count, highest first, keeping output order among equals.
pub fn decode_related_files(raw: &str) -> Vec<RelatedFileRecord> {
    let mut records: Vec<RelatedFileRecord> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let Some((path, rest)) = line.split_once(RELATED_SEPARATOR) else {
                debug!(line, "skipping related-file line without separator");
                return None;
            };
            let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
            Some(RelatedFileRecord {
                relative_path: path.trim().to_string(),
                occurrence_count: digits.parse().unwrap_or(0),
            })
        })
        .collect();

    // sort_by is stable
    records.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
    records
}

/// Render an ISO-8601 instant in local time, e.g. `Jan 01, 2024 00:00:00`.
/// Anything that does not parse is returned unchanged.
pub fn format_commit_date(raw: &str) -> String {
    format_commit_date_in(raw, &Local)
}

pub fn format_commit_date_in<Tz>(raw: &str, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(instant) => instant.with_timezone(zone).format(DISPLAY_DATE_FORMAT).to_string(),
        Err(_) => raw.to_string(),
    }
}
