//! Desktop environment restart
//!
//! Reset tears down the display stack and relaunches it. The steps are opaque
//! shell commands run strictly in order, each awaited to completion, with a
//! fixed pause after each one.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Default teardown and relaunch of the virtual display stack
pub const DEFAULT_RESTART_STEPS: [&str; 2] = ["pkill Xvfb; pkill tint2", "./start_all.sh"];

pub const DEFAULT_RESTART_PAUSE: Duration = Duration::from_secs(1);

/// Error type for environment restarts
#[derive(Debug)]
pub enum RestartError {
    /// A step could not be started at all
    Spawn { step: String, source: std::io::Error },
    /// The restart task stopped before finishing
    Aborted(String),
}

impl std::fmt::Display for RestartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartError::Spawn { step, source } => {
                write!(f, "Failed to run restart step `{}`: {}", step, source)
            }
            RestartError::Aborted(msg) => write!(f, "Restart aborted: {}", msg),
        }
    }
}

impl std::error::Error for RestartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RestartError::Spawn { source, .. } => Some(source),
            RestartError::Aborted(_) => None,
        }
    }
}

#[async_trait]
pub trait EnvironmentRestart: Send + Sync {
    async fn restart(&self) -> Result<(), RestartError>;
}

/// Restart procedure made of `/bin/sh -c` steps
#[derive(Debug, Clone)]
pub struct ShellRestart {
    steps: Vec<String>,
    pause: Duration,
}

impl ShellRestart {
    pub fn new(steps: Vec<String>, pause: Duration) -> Self {
        Self { steps, pause }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

impl Default for ShellRestart {
    fn default() -> Self {
        Self::new(
            DEFAULT_RESTART_STEPS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_RESTART_PAUSE,
        )
    }
}

#[async_trait]
impl EnvironmentRestart for ShellRestart {
    async fn restart(&self) -> Result<(), RestartError> {
        for (i, step) in self.steps.iter().enumerate() {
            info!(step = i + 1, total = self.steps.len(), command = %step, "Running restart step");

            let status = Command::new("/bin/sh")
                .arg("-c")
                .arg(step)
                .stdin(Stdio::null())
                .status()
                .await
                .map_err(|source| RestartError::Spawn {
                    step: step.clone(),
                    source,
                })?;

            // pkill exits 1 when nothing matched; not worth failing the reset
            if !status.success() {
                warn!(command = %step, code = ?status.code(), "Restart step exited with failure");
            }

            sleep(self.pause).await;
        }

        info!("Environment restart complete");
        Ok(())
    }
}
