//! Single-flight loop runner
//!
//! The busy latch is taken by the dispatcher before the runner is spawned, so
//! by the time this code runs the session is already `Running`. The runner
//! keeps passing the conversation through the sampling loop until no new
//! turns arrived during the last pass, then flips the session back to `Idle`
//! inside the same critical section that checked for new turns.
//!
//! ```text
//!  submit_chat ──(Idle → Running)──► spawn
//!                                      │
//!                  ┌──────── pass ◄────┘
//!                  │           │
//!                  │   new turns queued?
//!                  └── yes ────┤
//!                              no
//!                              ▼
//!                       Running → Idle
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::set_phase;
use crate::metrics::{LOOP_DURATION, LOOP_RUNS};
use crate::sampling::{LoopError, Message, SamplingLoop};
use crate::session::{Phase, SharedSession};

pub(crate) struct LoopRunner {
    pub(crate) shared: Arc<SharedSession>,
    pub(crate) sampling: Arc<dyn SamplingLoop>,
    pub(crate) phase_tx: Arc<watch::Sender<Phase>>,
}

impl LoopRunner {
    /// Run in the background until the session returns to `Idle`
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        let run_id = Uuid::now_v7().to_string();
        let span = info_span!("sampling_run", run_id = %run_id, otel.name = "sampling_run");
        tokio::spawn(self.run_until_idle().instrument(span))
    }

    async fn run_until_idle(self) {
        let mut guard = BusyGuard {
            shared: &self.shared,
            phase_tx: &self.phase_tx,
            armed: true,
        };

        let mut pass = 0usize;
        loop {
            pass += 1;
            let (request, started_len) = {
                let mut session = self.shared.session();
                let started_len = session.messages.len();
                (session.take_loop_request(), started_len)
            };

            info!(
                pass,
                model = %request.model,
                provider = %request.provider,
                messages = started_len,
                "Starting sampling loop"
            );
            let start = Instant::now();
            let result = self.sampling.run(request, self.shared.as_ref()).await;
            LOOP_DURATION.observe(start.elapsed().as_secs_f64());

            if !self.finish_pass(result, started_len) {
                break;
            }
            info!(pass, "New messages arrived during the run, sampling again");
        }

        guard.armed = false;
    }

    /// Fold a finished pass into the session
    ///
    /// Returns true when another pass is needed. Otherwise the session is
    /// already `Idle` when this returns.
    fn finish_pass(&self, result: Result<Vec<Message>, LoopError>, started_len: usize) -> bool {
        let mut session = self.shared.session();

        match result {
            Ok(messages) => {
                LOOP_RUNS.with_label_values(&["success"]).inc();
                info!(messages = messages.len(), "Sampling loop completed");
                session.complete_run(messages, started_len);
                session.last_error = None;
            }
            Err(e) => {
                LOOP_RUNS.with_label_values(&["failure"]).inc();
                error!(error = %e, "Sampling loop failed");
                let message = e.to_string();
                self.shared
                    .ledger()
                    .record_error(format!("sampling loop failed: {}", message));
                session.last_error = Some(message);
            }
        }

        if session.has_pending_run() {
            return true;
        }
        set_phase(&mut session, &self.phase_tx, Phase::Idle);
        false
    }
}

/// Releases the busy latch if the runner unwinds mid-pass
struct BusyGuard<'a> {
    shared: &'a SharedSession,
    phase_tx: &'a watch::Sender<Phase>,
    armed: bool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        LOOP_RUNS.with_label_values(&["panic"]).inc();
        warn!("Sampling run aborted, releasing busy latch");

        let mut session = self.shared.session();
        let message = "sampling loop aborted before completing".to_string();
        self.shared.ledger().record_error(message.clone());
        session.last_error = Some(message);
        if session.phase == Phase::Running {
            set_phase(&mut session, self.phase_tx, Phase::Idle);
        }
    }
}
