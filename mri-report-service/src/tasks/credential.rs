use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::{info, warn};

use super::types::{load_state, session_keys, set_state};
use crate::models::WorkflowState;

pub const MISSING_KEY_WARNING: &str = "Please enter your API key.";

/// Gate in front of everything else: nothing happens until a credential is held.
pub struct CredentialTask;

#[async_trait]
impl Task for CredentialTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let api_key: String = context
            .get(session_keys::API_KEY)
            .await
            .unwrap_or_default();

        if api_key.is_empty() {
            warn!("No API key provided yet");
            set_state(&context, WorkflowState::AwaitingKey).await?;
            return Ok(TaskResult::new_with_status(
                Some(MISSING_KEY_WARNING.to_string()),
                NextAction::WaitForInput,
                Some("Waiting for API key".to_string()),
            ));
        }

        if load_state(&context).await == WorkflowState::AwaitingKey {
            set_state(&context, WorkflowState::AwaitingUpload).await?;
        }
        info!("API key stored for session");

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Upload MRI Report (PDF)".to_string()),
        ))
    }
}
