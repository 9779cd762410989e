//! Session orchestrator
//!
//! Owns the one live session and mediates every mutation of it:
//!
//! - lifecycle: `setup`, `reset`, `snapshot`
//! - dispatch: `submit_chat` appends the user turn and schedules the runner
//! - the single-flight [`runner`] that drives the sampling loop
//!
//! The session phase doubles as the busy latch. Every transition happens
//! under the session lock and is mirrored onto a `watch` channel so callers
//! can await completion.

pub mod runner;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::environment::{EnvironmentRestart, RestartError};
use crate::metrics::{CHAT_SUBMISSIONS, RESETS, SESSION_BUSY};
use crate::sampling::{DisplayOptions, Message, Provider, SamplingLoop};
use crate::session::{LedgerEntry, Phase, Session, SessionError, SessionSnapshot, SharedSession};
use runner::LoopRunner;

/// Error type for orchestrator operations
#[derive(Debug)]
pub enum OrchestratorError {
    /// Request was well-formed but not acceptable
    Validation(SessionError),
    /// Operation collides with an in-flight run or reset
    Conflict(&'static str),
    /// Session was reset but the environment restart failed
    Restart(RestartError),
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorError::Validation(e) => write!(f, "{}", e),
            OrchestratorError::Conflict(msg) => write!(f, "{}", msg),
            OrchestratorError::Restart(e) => write!(f, "Environment restart failed: {}", e),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<SessionError> for OrchestratorError {
    fn from(e: SessionError) -> Self {
        OrchestratorError::Validation(e)
    }
}

impl From<RestartError> for OrchestratorError {
    fn from(e: RestartError) -> Self {
        OrchestratorError::Restart(e)
    }
}

/// Session behaviour that is fixed for the life of the process
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// Display defaults for fresh sessions
    pub display: DisplayOptions,
    /// Include the raw credential in snapshots
    pub expose_api_key: bool,
}

/// One chat submission
#[derive(Debug, Clone, Default)]
pub struct ChatSubmission {
    pub message: String,
    /// Overrides the provider's default model for this run
    pub model: Option<String>,
    /// Overrides the session's system prompt suffix for this run
    pub custom_system_prompt: Option<String>,
    /// Overrides the session's image retention for this run; `Some(None)`
    /// keeps every image
    pub only_n_most_recent_images: Option<Option<usize>>,
}

impl ChatSubmission {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Result of a chat submission
#[derive(Debug, Clone)]
pub struct ChatReceipt {
    /// Conversation including the new user turn
    pub messages: Vec<Message>,
    /// True if this submission started a run; false if it joined one
    pub scheduled: bool,
}

pub struct Orchestrator {
    shared: Arc<SharedSession>,
    sampling: Arc<dyn SamplingLoop>,
    environment: Arc<dyn EnvironmentRestart>,
    settings: SessionSettings,
    phase_tx: Arc<watch::Sender<Phase>>,
}

impl Orchestrator {
    pub fn new(
        sampling: Arc<dyn SamplingLoop>,
        environment: Arc<dyn EnvironmentRestart>,
        settings: SessionSettings,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            shared: Arc::new(SharedSession::new(Session::new(settings.display.clone()))),
            sampling,
            environment,
            settings,
            phase_tx: Arc::new(phase_tx),
        }
    }

    /// Validate and install a provider/credential pair
    pub fn setup(
        &self,
        provider: Provider,
        api_key: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        self.shared.session().setup(provider, api_key.into())?;
        info!(provider = %provider, "Session setup complete");
        Ok(())
    }

    /// Discard the session and restart the desktop environment
    ///
    /// Refused while a run or another reset is in flight.
    pub async fn reset(&self) -> Result<(), OrchestratorError> {
        {
            let mut session = self.shared.session();
            match session.phase {
                Phase::Running => {
                    RESETS.with_label_values(&["conflict"]).inc();
                    return Err(OrchestratorError::Conflict(
                        "Can not reset while the loop is running",
                    ));
                }
                Phase::Resetting => {
                    RESETS.with_label_values(&["conflict"]).inc();
                    return Err(OrchestratorError::Conflict("Reset already in progress"));
                }
                Phase::Idle => {}
            }

            *session = Session::new(self.settings.display.clone());
            set_phase(&mut session, &self.phase_tx, Phase::Resetting);
        }
        info!("Session discarded, restarting environment");

        // An empty key never validates for the default provider; the session
        // stays unauthenticated until the caller runs setup again.
        if let Err(e) = self.setup(Provider::default(), "") {
            debug!(error = %e, "Default setup after reset left session unauthenticated");
        }

        // Run the restart on its own task so a dropped request cannot strand
        // the session in `Resetting`.
        let shared = self.shared.clone();
        let phase_tx = self.phase_tx.clone();
        let environment = self.environment.clone();
        let restart = tokio::spawn(async move {
            let result = environment.restart().await;
            let mut session = shared.session();
            if session.phase == Phase::Resetting {
                set_phase(&mut session, &phase_tx, Phase::Idle);
            }
            result
        });

        match restart.await {
            Ok(Ok(())) => {
                RESETS.with_label_values(&["ok"]).inc();
                info!("Session reset complete");
                Ok(())
            }
            Ok(Err(e)) => {
                RESETS.with_label_values(&["failed"]).inc();
                warn!(error = %e, "Environment restart failed");
                Err(e.into())
            }
            Err(join_err) => {
                RESETS.with_label_values(&["failed"]).inc();
                warn!(error = %join_err, "Environment restart task died");
                let mut session = self.shared.session();
                if session.phase == Phase::Resetting {
                    set_phase(&mut session, &self.phase_tx, Phase::Idle);
                }
                Err(RestartError::Aborted(join_err.to_string()).into())
            }
        }
    }

    /// Append a user turn and make sure a run will pick it up
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_chat(&self, submission: ChatSubmission) -> Result<ChatReceipt, OrchestratorError> {
        let (messages, scheduled) = {
            let mut session = self.shared.session();
            if session.phase == Phase::Resetting {
                return Err(OrchestratorError::Conflict(
                    "Can not accept messages while the session is resetting",
                ));
            }

            session.messages.push(Message::user(submission.message));
            let display = DisplayOptions {
                custom_system_prompt: submission
                    .custom_system_prompt
                    .unwrap_or_else(|| session.display.custom_system_prompt.clone()),
                only_n_most_recent_images: submission
                    .only_n_most_recent_images
                    .unwrap_or(session.display.only_n_most_recent_images),
            };
            session.request_run(submission.model, display);

            let scheduled = session.phase == Phase::Idle;
            if scheduled {
                set_phase(&mut session, &self.phase_tx, Phase::Running);
            }
            (session.messages.clone(), scheduled)
        };
        CHAT_SUBMISSIONS.inc();

        if scheduled {
            LoopRunner {
                shared: self.shared.clone(),
                sampling: self.sampling.clone(),
                phase_tx: self.phase_tx.clone(),
            }
            .spawn();
        } else {
            debug!("Run in flight, message queued for the next pass");
        }

        Ok(ChatReceipt {
            messages,
            scheduled,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.session().snapshot(self.settings.expose_api_key)
    }

    /// Copy of the audit ledger, oldest entry first
    pub fn ledger(&self) -> BTreeMap<String, LedgerEntry> {
        self.shared.ledger_snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.session().is_busy()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// Resolve once no run or reset is in flight
    pub async fn wait_until_idle(&self) {
        let mut rx = self.phase_tx.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|phase| *phase == Phase::Idle).await;
    }
}

/// Transition the session phase and publish it
pub(crate) fn set_phase(session: &mut Session, phase_tx: &watch::Sender<Phase>, phase: Phase) {
    session.phase = phase;
    SESSION_BUSY.set(if phase == Phase::Running { 1.0 } else { 0.0 });
    phase_tx.send_replace(phase);
}
