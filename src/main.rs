//! SessionVisor server
//!
//! Wires the Anthropic sampling loop and the shell restart procedure into an
//! orchestrator and serves it over HTTP until ctrl-c.

use std::sync::Arc;

use clap::Parser;
use sessionvisor::http::{self, AppState};
use sessionvisor::tracing::{init_tracing, shutdown_tracing};
use sessionvisor::{AnthropicLoop, Orchestrator, OrchestratorConfig, SessionSettings, ShellRestart};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Missing .env is fine; real environment variables still apply
    let _ = dotenvy::dotenv();
    let config = OrchestratorConfig::parse();

    init_tracing("sessionvisor", config.otlp_endpoint())?;
    info!(
        bind = %config.bind,
        restart_steps = config.restart_steps.0.len(),
        expose_api_key = config.expose_api_key,
        "Starting sessionvisor"
    );

    let sampling = Arc::new(AnthropicLoop::new(config.anthropic()));
    let environment = Arc::new(ShellRestart::new(
        config.restart_steps.0.clone(),
        config.restart_pause,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        sampling,
        environment,
        SessionSettings {
            display: config.display(),
            expose_api_key: config.expose_api_key,
        },
    ));

    if let Some(api_key) = config.initial_api_key() {
        match orchestrator.setup(Default::default(), api_key) {
            Ok(()) => info!("Installed API key from environment"),
            Err(e) => warn!(error = %e, "Ignoring API key from environment"),
        }
    }

    let app = http::create_router(AppState::new(orchestrator));
    let result = http::serve(config.bind, app).await;

    shutdown_tracing();
    result?;
    Ok(())
}
