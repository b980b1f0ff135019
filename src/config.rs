use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Runtime settings for the bridge and its command-line host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bare executable name, also expected in front of the `--version` output.
    pub tool_name: String,
    pub min_version: String,
    /// Probed before any of the built-in locations.
    pub tool_path: Option<PathBuf>,
    /// Probed after the built-in locations.
    pub extra_search_dirs: Vec<PathBuf>,
    /// Substring that marks one indexed file in the index output.
    pub index_marker: String,
    pub git_binary: String,
    pub index_on_startup: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tool_name: "contextpilot".to_string(),
            min_version: "0.9.0".to_string(),
            tool_path: None,
            extra_search_dirs: Vec::new(),
            index_marker: "Indexing file:".to_string(),
            git_binary: "git".to_string(),
            index_on_startup: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl BridgeConfig {
    /// Defaults, then the config file (explicit path or the per-user one), then
    /// `CONTEXTPILOT_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match explicit {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        let settings = builder
            .add_source(Environment::with_prefix("CONTEXTPILOT").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "contextpilot").map(|dirs| dirs.config_dir().join("bridge.toml"))
    }

    /// Every location the resolver tries, in probe order.
    pub fn candidate_paths(&self) -> Vec<String> {
        let name = &self.tool_name;
        let mut candidates = Vec::new();

        if let Some(path) = &self.tool_path {
            candidates.push(path.to_string_lossy().into_owned());
        }
        candidates.push(name.clone());

        if let Some(base) = BaseDirs::new() {
            let home = base.home_dir();
            candidates.push(home.join(".local/bin").join(name).to_string_lossy().into_owned());
            candidates.push(home.join(".cargo/bin").join(name).to_string_lossy().into_owned());
        }
        candidates.push(format!("/usr/local/bin/{}", name));
        candidates.push(format!("/usr/bin/{}", name));

        for dir in &self.extra_search_dirs {
            candidates.push(dir.join(name).to_string_lossy().into_owned());
        }
        candidates
    }
}
