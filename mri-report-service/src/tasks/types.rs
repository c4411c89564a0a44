use base64::{Engine as _, engine::general_purpose::STANDARD};
use graph_flow::{Context, GraphError};
use serde::{Deserialize, Serialize};

use crate::models::{MriReport, StepFailure, WorkflowState};

pub mod session_keys {
    pub const REPORT: &str = "report";
    pub const API_KEY: &str = "api_key";
    pub const STATE: &str = "workflow_state";
    pub const PENDING_UPLOAD: &str = "pending_upload";
    pub const REVIEW_SUBMISSION: &str = "review_submission";
    pub const FAILURE: &str = "failure";
}

/// Uploaded PDF waiting for the extraction task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    pub file_name: Option<String>,
    pdf_base64: String,
}

impl PendingUpload {
    pub fn new(file_name: Option<String>, pdf: &[u8]) -> Self {
        Self {
            file_name,
            pdf_base64: STANDARD.encode(pdf),
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>, GraphError> {
        STANDARD
            .decode(&self.pdf_base64)
            .map_err(|e| GraphError::ContextError(format!("corrupt pending upload: {}", e)))
    }
}

pub async fn load_report(context: &Context) -> graph_flow::Result<MriReport> {
    context
        .get(session_keys::REPORT)
        .await
        .ok_or_else(|| GraphError::ContextError("Report not found in context".to_string()))
}

pub async fn save_report(context: &Context, report: &MriReport) -> graph_flow::Result<()> {
    context.set(session_keys::REPORT, report).await
}

pub async fn load_state(context: &Context) -> WorkflowState {
    context
        .get(session_keys::STATE)
        .await
        .unwrap_or(WorkflowState::AwaitingKey)
}

pub async fn set_state(context: &Context, state: WorkflowState) -> graph_flow::Result<()> {
    context.set(session_keys::STATE, state).await
}

pub async fn record_failure(context: &Context, failure: StepFailure) -> graph_flow::Result<()> {
    context.set(session_keys::FAILURE, failure).await
}
