//! The live session record
//!
//! Holds the conversation, credential selection, tool ledger, display
//! defaults and the run phase that doubles as the busy latch.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::sampling::{DisplayOptions, LoopRequest, Message, Provider, ToolOutput};

const REDACTED: &str = "<redacted>";

/// Lifecycle phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    /// A sampling loop execution is in flight
    Running,
    /// Reset is tearing down and restarting the environment
    Resetting,
}

/// Parameters of the next loop pass, taken from the latest chat submission
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub model: Option<String>,
    pub display: DisplayOptions,
}

/// Error type for session mutations
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Provider requires a credential and none was supplied
    MissingApiKey(Provider),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::MissingApiKey(provider) => {
                write!(f, "API key required for {} provider", provider)
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone)]
pub struct Session {
    pub messages: Vec<Message>,
    pub api_key: String,
    pub provider: Provider,
    pub auth_validated: bool,
    /// Tool invocation id -> result
    pub tools: BTreeMap<String, ToolOutput>,
    /// Defaults applied when a chat request leaves them out
    pub display: DisplayOptions,
    pub phase: Phase,
    /// Message of the most recent failed run
    pub last_error: Option<String>,
    pending: Option<RunRequest>,
}

impl Session {
    pub fn new(display: DisplayOptions) -> Self {
        Self {
            messages: Vec::new(),
            api_key: String::new(),
            provider: Provider::default(),
            auth_validated: false,
            tools: BTreeMap::new(),
            display,
            phase: Phase::Idle,
            last_error: None,
            pending: None,
        }
    }

    /// Validate and install a provider/credential pair
    ///
    /// Nothing changes when validation fails.
    pub fn setup(&mut self, provider: Provider, api_key: String) -> Result<(), SessionError> {
        if provider.requires_api_key() && api_key.is_empty() {
            return Err(SessionError::MissingApiKey(provider));
        }
        self.provider = provider;
        self.api_key = api_key;
        self.auth_validated = true;
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn record_tool_output(&mut self, tool_id: &str, output: ToolOutput) {
        self.tools.insert(tool_id.to_string(), output);
    }

    /// Queue parameters for the next loop pass
    pub fn request_run(&mut self, model: Option<String>, display: DisplayOptions) {
        self.pending = Some(RunRequest { model, display });
    }

    pub fn has_pending_run(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume the pending run parameters into a loop request
    ///
    /// Falls back to session defaults when nothing was queued.
    pub fn take_loop_request(&mut self) -> LoopRequest {
        let run = self.pending.take().unwrap_or_else(|| RunRequest {
            model: None,
            display: self.display.clone(),
        });
        LoopRequest {
            messages: self.messages.clone(),
            model: run
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| self.provider.default_model().to_string()),
            provider: self.provider,
            api_key: self.api_key.clone(),
            display: run.display,
        }
    }

    /// Replace the conversation with a finished run's output
    ///
    /// Turns appended after `started_len` arrived while the run was in flight
    /// and are kept after the loop's output.
    pub fn complete_run(&mut self, output: Vec<Message>, started_len: usize) {
        let arrived = self.messages.split_off(started_len.min(self.messages.len()));
        self.messages = output;
        self.messages.extend(arrived);
    }

    pub fn snapshot(&self, expose_api_key: bool) -> SessionSnapshot {
        let api_key = if expose_api_key || self.api_key.is_empty() {
            self.api_key.clone()
        } else {
            REDACTED.to_string()
        };
        SessionSnapshot {
            messages: self.messages.clone(),
            api_key,
            provider: self.provider,
            auth_validated: self.auth_validated,
            tools: self.tools.clone(),
            only_n_most_recent_images: self.display.only_n_most_recent_images,
            custom_system_prompt: self.display.custom_system_prompt.clone(),
            in_sampling_loop: self.is_busy(),
            phase: self.phase,
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DisplayOptions::default())
    }
}

/// Read-only view of the session returned by `GET /state`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub api_key: String,
    pub provider: Provider,
    pub auth_validated: bool,
    pub tools: BTreeMap<String, ToolOutput>,
    pub only_n_most_recent_images: Option<usize>,
    pub custom_system_prompt: String,
    pub in_sampling_loop: bool,
    pub phase: Phase,
    pub last_error: Option<String>,
}
