//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sessionvisor::environment::{EnvironmentRestart, RestartError};
use sessionvisor::sampling::{
    ContentBlock, LoopCallbacks, LoopError, LoopRequest, Message, SamplingLoop, ToolOutput,
};
use sessionvisor::{Orchestrator, SessionSettings};
use tokio::sync::Semaphore;

/// What one scripted loop pass does
#[derive(Debug, Clone)]
pub enum Step {
    /// Append an assistant turn with this text
    Reply(String),
    /// Report one tool result, then append an assistant turn
    Tool { id: String, output: String },
    /// Report a failed API call and return an error
    Fail(String),
    Panic,
}

/// Sampling loop that follows a script instead of calling a model
///
/// With a gate, every pass waits for one permit before doing anything, so
/// tests can hold the loop "in flight".
pub struct ScriptedLoop {
    script: Mutex<VecDeque<Step>>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<LoopRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLoop {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            gate: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every pass open for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of overlapping passes seen so far
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn gated(steps: impl IntoIterator<Item = Step>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut scripted = Self::new(steps);
        scripted.gate = Some(gate.clone());
        (scripted, gate)
    }

    pub fn requests(&self) -> Vec<LoopRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Poll until the loop has been entered `n` times
    pub async fn wait_for_requests(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.requests.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sampling loop was not entered in time");
    }
}

#[async_trait]
impl SamplingLoop for ScriptedLoop {
    async fn run(
        &self,
        request: LoopRequest,
        callbacks: &dyn LoopCallbacks,
    ) -> Result<Vec<Message>, LoopError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.pass(request, callbacks).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ScriptedLoop {
    async fn pass(
        &self,
        request: LoopRequest,
        callbacks: &dyn LoopCallbacks,
    ) -> Result<Vec<Message>, LoopError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Reply("done".to_string()));
        let api_request = json!({ "model": request.model, "messages": request.messages });

        match step {
            Step::Reply(text) => {
                let block = ContentBlock::Text { text: text.clone() };
                callbacks.on_api_exchange(&api_request, Some(&json!({ "content": [&block] })), None);
                callbacks.on_assistant_output(&block);
                let mut messages = request.messages;
                messages.push(Message::assistant(text));
                Ok(messages)
            }
            Step::Tool { id, output } => {
                callbacks.on_api_exchange(&api_request, Some(&json!({ "tool_use_id": id })), None);
                callbacks.on_tool_output(&ToolOutput::output(output.clone()), &id);
                let mut messages = request.messages;
                messages.push(Message::assistant(output));
                Ok(messages)
            }
            Step::Fail(error) => {
                callbacks.on_api_exchange(&api_request, None, Some(&error));
                Err(LoopError::Other(error))
            }
            Step::Panic => panic!("scripted loop panic"),
        }
    }
}

/// Restart double that counts calls and can be held or made to fail
#[derive(Default)]
pub struct RecordingRestart {
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    fail: bool,
}

impl RecordingRestart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let restart = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (restart, gate)
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnvironmentRestart for RecordingRestart {
    async fn restart(&self) -> Result<(), RestartError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail {
            return Err(RestartError::Spawn {
                step: "./start_all.sh".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        Ok(())
    }
}

pub fn orchestrator(
    sampling: Arc<ScriptedLoop>,
    restart: Arc<RecordingRestart>,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(sampling, restart, SessionSettings::default()))
}

/// Wait for idle, failing the test instead of hanging
pub async fn settle(orchestrator: &Orchestrator) {
    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_until_idle())
        .await
        .expect("session did not return to idle");
}
