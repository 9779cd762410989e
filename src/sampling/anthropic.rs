//! Messages API sampling loop with tool use
//!
//! Each iteration sends the conversation to `/v1/messages`, records the
//! exchange, runs any requested tools and feeds their results back until the
//! model stops asking for tools.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

use super::bash::{BashTool, BASH_TOOL_NAME};
use super::messages::{retain_recent_images, ContentBlock, Message, ToolOutput};
use super::{LoopCallbacks, LoopError, LoopRequest, Provider, SamplingLoop};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are operating a Linux desktop session through a bash tool. \
Run one command at a time, read its output carefully, and explain what you did when the task is complete. \
GUI applications need DISPLAY set to reach the virtual display.";

/// Configuration for the Messages API loop
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Base URL without the `/v1/messages` suffix
    pub api_url: String,
    /// Maximum API calls per run before handing the conversation back
    pub max_iterations: usize,
    pub max_tokens: u32,
    pub bash_timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            max_iterations: 25,
            max_tokens: 4096,
            bash_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Sampling loop backed by the Anthropic Messages API
#[derive(Clone)]
pub struct AnthropicLoop {
    client: reqwest::Client,
    config: AnthropicConfig,
    bash: BashTool,
}

impl AnthropicLoop {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            bash: BashTool::new(config.bash_timeout),
            config,
        }
    }

    fn system_prompt(suffix: &str) -> String {
        if suffix.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            format!("{} {}", DEFAULT_SYSTEM_PROMPT, suffix)
        }
    }

    fn request_body(&self, request: &LoopRequest, messages: &[Message]) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "max_tokens": self.config.max_tokens,
            "system": Self::system_prompt(&request.display.custom_system_prompt),
            "messages": messages,
            "tools": [BashTool::definition()],
        })
    }

    /// One Messages API call; returns the raw JSON alongside the parsed body
    async fn call(
        &self,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<(serde_json::Value, MessagesResponse), LoopError> {
        let endpoint = format!("{}/v1/messages", self.config.api_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LoopError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&text)?;
        let parsed: MessagesResponse = serde_json::from_value(raw.clone())?;
        Ok((raw, parsed))
    }

    async fn run_tool(&self, name: &str, input: &serde_json::Value) -> ToolOutput {
        if name == BASH_TOOL_NAME {
            self.bash.run(input).await
        } else {
            warn!(tool = name, "Model requested an unknown tool");
            ToolOutput::error(format!("unknown tool: {}", name))
        }
    }
}

#[async_trait]
impl SamplingLoop for AnthropicLoop {
    async fn run(
        &self,
        request: LoopRequest,
        callbacks: &dyn LoopCallbacks,
    ) -> Result<Vec<Message>, LoopError> {
        if request.provider != Provider::Anthropic {
            return Err(LoopError::UnsupportedProvider(request.provider));
        }
        if request.api_key.is_empty() {
            return Err(LoopError::MissingApiKey(request.provider));
        }

        let mut messages = request.messages.clone();

        for iteration in 1..=self.config.max_iterations {
            if let Some(keep) = request.display.only_n_most_recent_images {
                retain_recent_images(&mut messages, keep);
            }

            let body = self.request_body(&request, &messages);
            let llm_span = info_span!("llm_call", iteration, model = %request.model);
            let response = match self.call(&request.api_key, &body).instrument(llm_span).await {
                Ok((raw, parsed)) => {
                    callbacks.on_api_exchange(&body, Some(&raw), None);
                    parsed
                }
                Err(e) => {
                    callbacks.on_api_exchange(&body, None, Some(&e.to_string()));
                    return Err(e);
                }
            };

            debug!(iteration, stop_reason = ?response.stop_reason, "Messages API call completed");

            // Unmodelled blocks cannot be echoed back faithfully
            let (content, unknown): (Vec<_>, Vec<_>) = response
                .content
                .into_iter()
                .partition(|block| !block.is_unknown());
            if !unknown.is_empty() {
                debug!(skipped = unknown.len(), "Dropping unrecognised content blocks");
            }

            for block in &content {
                callbacks.on_assistant_output(block);
            }
            let assistant = Message::assistant_blocks(content);
            let tool_uses = assistant.tool_uses();
            messages.push(assistant);

            if tool_uses.is_empty() {
                info!(iterations = iteration, "Sampling loop finished");
                return Ok(messages);
            }

            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                let output = self.run_tool(&name, &input).await;
                callbacks.on_tool_output(&output, &id);
                results.push(output.to_result_block(&id));
            }
            messages.push(Message::tool_results(results));
        }

        warn!(
            max_iterations = self.config.max_iterations,
            "Max iterations reached, returning conversation so far"
        );
        Ok(messages)
    }
}
