//! Running the external tool as a child process.
//!
//! stdout and stderr are merged into a single line stream in arrival order.
//! Nothing here imposes a timeout, and children are not killed when a
//! handle is dropped: a caller that gives up on a run simply stops reading.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// One fully specified execution of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    pub executable: String,
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
}

impl InvocationSpec {
    pub fn new<I, S>(executable: impl Into<String>, arguments: I, working_directory: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            working_directory: working_directory.as_ref().to_path_buf(),
        }
    }

    /// Space-joined command line, for logs only.
    pub fn command_line(&self) -> String {
        let mut line = self.executable.clone();
        for arg in &self.arguments {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub exit_code: i32,
    pub combined_output: String,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The output of a zero exit, or `NonZeroExit` carrying the output.
    pub fn into_output(self, program: &str) -> Result<String> {
        if self.success() {
            Ok(self.combined_output)
        } else {
            Err(BridgeError::NonZeroExit {
                program: program.to_string(),
                code: self.exit_code,
                output: self.combined_output,
            })
        }
    }
}

/// Output of a running invocation, consumed line by line.
pub struct OutputLines {
    program: String,
    lines: mpsc::UnboundedReceiver<String>,
    exit: JoinHandle<Result<i32>>,
}

impl OutputLines {
    pub fn new(
        program: impl Into<String>,
        lines: mpsc::UnboundedReceiver<String>,
        exit: JoinHandle<Result<i32>>,
    ) -> Self {
        Self {
            program: program.into(),
            lines,
            exit,
        }
    }

    /// Next merged output line, or `None` once both streams are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for the process and return its exit code. Unread lines are dropped.
    pub async fn wait(self) -> Result<i32> {
        let code = self
            .exit
            .await
            .map_err(|e| BridgeError::Io(io::Error::new(io::ErrorKind::Other, e)))??;
        debug!(program = %self.program, code, "streamed process exited");
        Ok(code)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandInvoker: Send + Sync {
    /// Run to completion and capture the merged output.
    async fn invoke(&self, spec: &InvocationSpec) -> Result<InvocationResult>;

    /// Start the process and hand back its output as it is produced.
    async fn stream(&self, spec: &InvocationSpec) -> Result<OutputLines>;
}

/// [`CommandInvoker`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    pub fn new() -> Self {
        Self
    }

    fn start(
        &self,
        spec: &InvocationSpec,
    ) -> Result<(tokio::process::Child, mpsc::UnboundedReceiver<String>)> {
        info!(command = %spec.command_line(), cwd = %spec.working_directory.display(), "running command");

        let mut child = Command::new(&spec.executable)
            .args(&spec.arguments)
            .current_dir(&spec.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BridgeError::LaunchFailure {
                program: spec.executable.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx));
        }

        Ok((child, rx))
    }
}

#[async_trait]
impl CommandInvoker for ProcessInvoker {
    async fn invoke(&self, spec: &InvocationSpec) -> Result<InvocationResult> {
        let (mut child, mut rx) = self.start(spec)?;

        let mut combined_output = String::new();
        while let Some(line) = rx.recv().await {
            combined_output.push_str(&line);
            combined_output.push('\n');
        }

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);
        debug!(
            program = %spec.executable,
            code = exit_code,
            output_len = combined_output.len(),
            "command finished"
        );

        Ok(InvocationResult {
            exit_code,
            combined_output,
        })
    }

    async fn stream(&self, spec: &InvocationSpec) -> Result<OutputLines> {
        let (mut child, rx) = self.start(spec)?;
        let exit = tokio::spawn(async move {
            let status = child.wait().await?;
            Ok::<_, BridgeError>(status.code().unwrap_or(-1))
        });
        Ok(OutputLines::new(spec.executable.clone(), rx, exit))
    }
}

// Keeps draining after the receiver is gone so the child never blocks on a full pipe.
async fn pump_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let _ = tx.send(line.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(e) => {
                warn!(error = %e, "failed reading child output");
                break;
            }
        }
    }
}
