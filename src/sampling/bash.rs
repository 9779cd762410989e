//! Shell tool exposed to the model
//!
//! Runs one `/bin/sh -c` command per invocation with a hard timeout.

use std::process::Stdio;

use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use super::messages::ToolOutput;

pub const BASH_TOOL_NAME: &str = "bash";

#[derive(Debug, Clone)]
pub struct BashTool {
    timeout: Duration,
}

impl BashTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Tool definition sent with every Messages API request
    pub fn definition() -> serde_json::Value {
        serde_json::json!({
            "name": BASH_TOOL_NAME,
            "description": "Run a shell command in the desktop environment and return its output. Use this to inspect files, start programs and check system state.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to run"
                    }
                },
                "required": ["command"]
            }
        })
    }

    /// Execute the `command` field of a tool_use input
    pub async fn run(&self, input: &serde_json::Value) -> ToolOutput {
        let command = input["command"].as_str().unwrap_or("");
        if command.trim().is_empty() {
            warn!("Rejecting empty bash command from model");
            return ToolOutput::error("no command provided");
        }

        info!(command_len = command.len(), "Running bash tool");

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                ToolOutput {
                    output: Some(stdout),
                    error: Some(stderr).filter(|e| !e.is_empty()),
                    ..ToolOutput::default()
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to spawn bash command");
                ToolOutput::error(format!("failed to run command: {}", e))
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f64(), "Bash command timed out");
                ToolOutput::error(format!("command timed out after {:?}", self.timeout))
            }
        }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}
