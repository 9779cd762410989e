//! Sampling loop contract
//!
//! The orchestrator treats the agent sampling loop as a black box: it hands
//! over a conversation plus configuration and gets back the updated
//! conversation. While running, the loop reports what it produces through
//! [`LoopCallbacks`].
//!
//! # Architecture
//!
//! ```text
//! LoopRunner ──LoopRequest──► SamplingLoop::run
//!                                   │
//!            ◄── on_assistant_output┤
//!            ◄── on_tool_output ────┤
//!            ◄── on_api_exchange ───┤
//!                                   ▼
//! LoopRunner ◄──── Vec<Message> ────┘
//! ```

pub mod anthropic;
pub mod bash;
pub mod messages;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::{AnthropicConfig, AnthropicLoop};
pub use messages::{ContentBlock, Message, MessageContent, Role, ToolOutput};

/// API provider backing the sampling loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    Bedrock,
    Vertex,
}

impl Provider {
    /// Model used when a chat request does not name one
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::Bedrock => "anthropic.claude-3-5-sonnet-20241022-v2:0",
            Provider::Vertex => "claude-3-5-sonnet-v2@20241022",
        }
    }

    /// Bedrock and Vertex authenticate through the cloud environment
    pub fn requires_api_key(self) -> bool {
        matches!(self, Provider::Anthropic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Bedrock => "bedrock",
            Provider::Vertex => "vertex",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run presentation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Appended to the loop's built-in system prompt
    pub custom_system_prompt: String,
    /// Older screenshots beyond this count are dropped before each call
    pub only_n_most_recent_images: Option<usize>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            custom_system_prompt: String::new(),
            only_n_most_recent_images: Some(3),
        }
    }
}

/// Everything one loop execution needs
#[derive(Debug, Clone)]
pub struct LoopRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub provider: Provider,
    pub api_key: String,
    pub display: DisplayOptions,
}

/// Events the loop emits while it runs
///
/// Invoked synchronously from inside the loop. Implementations must be quick
/// in-memory writes; they never await.
pub trait LoopCallbacks: Send + Sync {
    fn on_assistant_output(&self, block: &ContentBlock);

    fn on_tool_output(&self, output: &ToolOutput, tool_id: &str);

    /// `error` is set when the call failed; `response` may then be absent
    fn on_api_exchange(
        &self,
        request: &serde_json::Value,
        response: Option<&serde_json::Value>,
        error: Option<&str>,
    );
}

/// The external multi-turn agent process
#[async_trait]
pub trait SamplingLoop: Send + Sync {
    async fn run(
        &self,
        request: LoopRequest,
        callbacks: &dyn LoopCallbacks,
    ) -> Result<Vec<Message>, LoopError>;
}

/// Error type for sampling loop executions
#[derive(Debug)]
pub enum LoopError {
    /// HTTP transport failure
    Request(reqwest::Error),
    /// The API answered with a non-success status
    Api { status: u16, body: String },
    /// Response body did not match the expected shape
    Parse(serde_json::Error),
    /// The provider needs a credential and none was configured
    MissingApiKey(Provider),
    /// No transport is available for this provider
    UnsupportedProvider(Provider),
    /// Anything else raised by a loop implementation
    Other(String),
}

impl std::fmt::Display for LoopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopError::Request(e) => write!(f, "Request error: {}", e),
            LoopError::Api { status, body } => write!(f, "API error {}: {}", status, body),
            LoopError::Parse(e) => write!(f, "Parse error: {}", e),
            LoopError::MissingApiKey(p) => write!(f, "API key required for {} provider", p),
            LoopError::UnsupportedProvider(p) => {
                write!(f, "Provider {} is not supported by this sampling loop", p)
            }
            LoopError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LoopError {}

impl From<reqwest::Error> for LoopError {
    fn from(e: reqwest::Error) -> Self {
        LoopError::Request(e)
    }
}

impl From<serde_json::Error> for LoopError {
    fn from(e: serde_json::Error) -> Self {
        LoopError::Parse(e)
    }
}
