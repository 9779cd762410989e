//! Callback sink wiring loop events into the session and audit ledger

use tracing::{debug, warn};

use super::SharedSession;
use crate::metrics::{API_EXCHANGES, TOOL_OUTPUTS};
use crate::sampling::{ContentBlock, LoopCallbacks, ToolOutput};

impl LoopCallbacks for SharedSession {
    fn on_assistant_output(&self, block: &ContentBlock) {
        match block {
            ContentBlock::Text { text } => debug!(len = text.len(), "Assistant text"),
            ContentBlock::ToolUse { id, name, .. } => {
                debug!(tool_id = %id, tool = %name, "Assistant requested tool")
            }
            _ => {}
        }
    }

    fn on_tool_output(&self, output: &ToolOutput, tool_id: &str) {
        TOOL_OUTPUTS.inc();
        self.session().record_tool_output(tool_id, output.clone());
    }

    fn on_api_exchange(
        &self,
        request: &serde_json::Value,
        response: Option<&serde_json::Value>,
        error: Option<&str>,
    ) {
        let status = if error.is_some() { "error" } else { "ok" };
        API_EXCHANGES.with_label_values(&[status]).inc();
        if let Some(error) = error {
            warn!(error, "API exchange failed");
        }

        let key = self
            .ledger()
            .record_exchange(request.clone(), response.cloned(), error);
        debug!(key = %key, status, "Recorded API exchange");
    }
}
