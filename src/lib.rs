//! SessionVisor - single-session orchestrator for a computer-use agent
//!
//! Keeps one live conversation with an agent sampling loop, serializes loop
//! executions through a busy latch, audits every model API exchange and
//! resets the desktop environment on demand.
//!
//! # Modules
//!
//! - `session` - session record, shared handle and audit ledger
//! - `sampling` - sampling loop contract and the Anthropic implementation
//! - `orchestrator` - lifecycle operations and the single-flight loop runner
//! - `environment` - desktop environment restart procedure
//! - `http` - axum routes exposing the orchestrator
//! - `config` - environment-driven configuration
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - console logging and optional OTLP export
//!
//! # Quick Start
//!
//! ```ignore
//! use sessionvisor::{AnthropicLoop, Orchestrator, ShellRestart, SessionSettings};
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(AnthropicLoop::new(Default::default())),
//!     Arc::new(ShellRestart::default()),
//!     SessionSettings::default(),
//! );
//! orchestrator.setup(Provider::Anthropic, "sk-...")?;
//! orchestrator.submit_chat(ChatSubmission::new("open a terminal"))?;
//! orchestrator.wait_until_idle().await;
//! ```

pub mod config;
pub mod environment;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod sampling;
pub mod session;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use config::OrchestratorConfig;
pub use environment::{EnvironmentRestart, RestartError, ShellRestart};
pub use orchestrator::{ChatReceipt, ChatSubmission, Orchestrator, OrchestratorError, SessionSettings};
pub use sampling::{AnthropicLoop, LoopCallbacks, LoopError, LoopRequest, Message, Provider, SamplingLoop};
pub use session::{LedgerEntry, Phase, SessionSnapshot};
