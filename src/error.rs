use std::io;

use thiserror::Error;
use tracing::error;

/// Errors raised inside the bridge.
///
/// The tool-related kinds stay distinct here so logs can tell them apart;
/// callers at the user boundary should go through [`BridgeError::to_user_facing`].
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no compatible {tool} installation found (need >= {required})")]
    ToolNotFound { tool: String, required: String },

    #[error("failed to launch {program}: {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with status {code}")]
    NonZeroExit {
        program: String,
        code: i32,
        output: String,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn invalid_selection(msg: impl Into<String>) -> Self {
        Self::InvalidSelection(msg.into())
    }

    /// True for every kind that means "the external tool could not do its job".
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound { .. } | Self::LaunchFailure { .. } | Self::NonZeroExit { .. }
        )
    }

    /// Collapse into the category reported to the user, logging the detail.
    pub fn to_user_facing(&self) -> UserFacingError {
        match self {
            Self::NonZeroExit { program, code, output } => {
                error!(%program, code, output = %output, "external tool failed");
            }
            other => error!(error = %other, "bridge operation failed"),
        }

        if self.is_tool_unavailable() {
            UserFacingError::ExternalToolUnavailable
        } else {
            match self {
                Self::MalformedResponse(msg) => UserFacingError::UnreadableResponse(msg.clone()),
                Self::InvalidSelection(msg) => UserFacingError::InvalidSelection(msg.clone()),
                other => UserFacingError::Internal(other.to_string()),
            }
        }
    }
}

/// What a host shows the user. Tool failures all share one message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserFacingError {
    #[error("ContextPilot binary not found or version incompatible. Please check installation.")]
    ExternalToolUnavailable,

    #[error("Error processing ContextPilot output: {0}")]
    UnreadableResponse(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Unexpected error: {0}")]
    Internal(String),
}
