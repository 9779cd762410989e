//! Runtime configuration
//!
//! Every setting is a command-line flag that can also be supplied through a
//! `SESSIONVISOR_*` environment variable. Invalid values are rejected at
//! startup.

use std::net::SocketAddr;

use clap::Parser;
use tokio::time::Duration;

use crate::sampling::{AnthropicConfig, DisplayOptions};

/// Separator for restart steps in `--restart-steps`
const STEP_SEPARATOR: &str = ";;";

/// Session orchestrator for a computer-use agent
#[derive(Parser, Debug, Clone)]
#[command(name = "sessionvisor", version, about = "Single-session computer-use orchestrator")]
pub struct OrchestratorConfig {
    /// Address the HTTP server binds to
    #[arg(long, env = "SESSIONVISOR_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Shell commands run in order on reset, separated by `;;`
    #[arg(
        long,
        env = "SESSIONVISOR_RESTART_STEPS",
        default_value = "pkill Xvfb; pkill tint2;;./start_all.sh",
        value_parser = parse_steps
    )]
    pub restart_steps: RestartSteps,

    /// Pause after each restart step, in milliseconds
    #[arg(
        long = "restart-pause-ms",
        env = "SESSIONVISOR_RESTART_PAUSE_MS",
        default_value = "1000",
        value_parser = parse_millis
    )]
    pub restart_pause: Duration,

    /// Screenshots kept per request; `none` keeps all of them
    #[arg(
        long,
        env = "SESSIONVISOR_IMAGE_RETENTION",
        default_value = "3",
        value_parser = parse_retention
    )]
    pub image_retention: ImageRetention,

    /// Appended to the built-in system prompt when a chat gives none
    #[arg(long, env = "SESSIONVISOR_SYSTEM_PROMPT_SUFFIX", default_value = "")]
    pub system_prompt_suffix: String,

    /// Include the raw credential in `GET /state`
    #[arg(long, env = "SESSIONVISOR_EXPOSE_API_KEY")]
    pub expose_api_key: bool,

    /// Credential installed at startup
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Messages API base URL
    #[arg(
        long,
        env = "SESSIONVISOR_ANTHROPIC_URL",
        default_value = crate::sampling::anthropic::DEFAULT_API_URL
    )]
    pub anthropic_url: String,

    /// API calls per run before the conversation is handed back
    #[arg(long, env = "SESSIONVISOR_MAX_ITERATIONS", default_value_t = 25)]
    pub max_iterations: usize,

    #[arg(long, env = "SESSIONVISOR_MAX_TOKENS", default_value_t = 4096)]
    pub max_tokens: u32,

    /// Timeout of one bash tool invocation, in seconds
    #[arg(
        long = "bash-timeout-secs",
        env = "SESSIONVISOR_BASH_TIMEOUT_SECS",
        default_value = "120",
        value_parser = parse_secs
    )]
    pub bash_timeout: Duration,

    /// OTLP collector for trace export; console logging only when unset
    #[arg(long, env = "SESSIONVISOR_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Standard OpenTelemetry fallback for `--otlp-endpoint`
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", hide = true)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

/// Ordered restart commands
#[derive(Debug, Clone, PartialEq)]
pub struct RestartSteps(pub Vec<String>);

/// Image retention; `None` disables filtering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRetention(pub Option<usize>);

impl OrchestratorConfig {
    /// Session defaults for chat requests that omit display options
    pub fn display(&self) -> DisplayOptions {
        DisplayOptions {
            custom_system_prompt: self.system_prompt_suffix.clone(),
            only_n_most_recent_images: self.image_retention.0,
        }
    }

    pub fn anthropic(&self) -> AnthropicConfig {
        AnthropicConfig {
            api_url: self.anthropic_url.clone(),
            max_iterations: self.max_iterations,
            max_tokens: self.max_tokens,
            bash_timeout: self.bash_timeout,
        }
    }

    /// Credential installed at startup, ignoring an empty value
    pub fn initial_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        self.otlp_endpoint
            .as_deref()
            .or(self.otel_exporter_otlp_endpoint.as_deref())
            .filter(|e| !e.trim().is_empty())
    }
}

fn parse_steps(raw: &str) -> Result<RestartSteps, String> {
    let steps: Vec<String> = raw
        .split(STEP_SEPARATOR)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err("at least one restart step is required".to_string());
    }
    Ok(RestartSteps(steps))
}

fn parse_millis(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| format!("expected milliseconds: {}", e))
}

fn parse_secs(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("expected seconds: {}", e))
}

fn parse_retention(raw: &str) -> Result<ImageRetention, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(ImageRetention(None));
    }
    raw.parse::<usize>()
        .map(|n| ImageRetention(Some(n)))
        .map_err(|e| format!("expected a count or `none`: {}", e))
}
