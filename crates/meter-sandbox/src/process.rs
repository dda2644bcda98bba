//! Subprocess-backed tools.
//!
//! The tool body is an external program: the input JSON goes to its stdin
//! and its stdout becomes the output. The child is spawned with
//! `kill_on_drop`, so when the enforcer aborts the task on timeout the
//! process is killed with it.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolError;
use crate::tool::{SandboxContext, SandboxedTool};

/// Capability every process tool declares.
pub const PROCESS_CAPABILITY: &str = "process.spawn";

/// Tool that runs an external program per invocation.
#[derive(Debug, Clone)]
pub struct ProcessTool {
    name: String,
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    capabilities: Vec<String>,
}

impl ProcessTool {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            capabilities: vec![PROCESS_CAPABILITY.to_string()],
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run the program in `dir`. Declares `fs.read` as well.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        if !self.capabilities.iter().any(|c| c == "fs.read") {
            self.capabilities.push("fs.read".to_string());
        }
        self
    }

    /// Declare extra capabilities the program uses.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl SandboxedTool for ProcessTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn run(&self, input: Value, ctx: &SandboxContext) -> Result<Value, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ToolError::failed(format!("failed to spawn '{}': {e}", self.program))
        })?;
        debug!(tool = %self.name, program = %self.program, pid = ?child.id(), "spawned tool process");

        let payload = serde_json::to_vec(&input)
            .map_err(|e| ToolError::invalid_input(format!("input is not serializable: {e}")))?;
        ctx.track_memory(payload.len() as u64)?;

        // Stdin is fed while stdout and stderr drain so neither pipe fills.
        let stdin = child.stdin.take();
        let write_input = async move {
            if let Some(mut stdin) = stdin {
                // The program may exit without reading its input.
                match stdin.write_all(&payload).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        };
        let (written, output) = tokio::join!(write_input, child.wait_with_output());

        let output = output
            .map_err(|e| ToolError::failed(format!("failed to wait for '{}': {e}", self.program)))?;
        written.map_err(|e| ToolError::failed(format!("failed to write stdin: {e}")))?;
        ctx.track_memory((output.stdout.len() + output.stderr.len()) as u64)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(ToolError::failed(format!(
                "'{}' exited with {code}: {}",
                self.program,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
    }
}
