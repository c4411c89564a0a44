use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{
    PendingUpload, load_report, record_failure, save_report, session_keys, set_state,
};
use crate::error::ReportError;
use crate::extract::TextExtractor;
use crate::models::WorkflowState;

pub const EMPTY_REPORT_WARNING: &str =
    "No text extracted from PDF. Please upload a valid MRI report.";

/// Turns the pending upload into the session's report text.
///
/// A successful extraction replaces the previous report and drops every text,
/// rating and export derived from it. A failed one leaves the session as it was.
pub struct PdfExtractTask {
    extractor: Arc<dyn TextExtractor>,
}

impl PdfExtractTask {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Task for PdfExtractTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let upload: PendingUpload = match context.remove(session_keys::PENDING_UPLOAD).await {
            Some(value) => serde_json::from_value(value)?,
            None => {
                return Ok(TaskResult::new_with_status(
                    None,
                    NextAction::WaitForInput,
                    Some("Upload MRI Report (PDF)".to_string()),
                ));
            }
        };

        info!(file_name = ?upload.file_name, "Extracting text from PDF");
        let pdf = upload.bytes()?;
        let extractor = self.extractor.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&pdf))
            .await
            .map_err(|e| GraphError::TaskExecutionFailed(format!("extraction worker failed: {}", e)))?;

        let report_text = match extracted {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return reject_upload(&context, EMPTY_REPORT_WARNING.to_string()).await,
            Err(e) => return reject_upload(&context, e.to_string()).await,
        };

        info!(
            "Extracted {} characters from {}",
            report_text.len(),
            upload.file_name.as_deref().unwrap_or("upload")
        );

        let mut report = load_report(&context).await?;
        report.clear_derived();
        report.file_name = upload.file_name;
        report.report_text = Some(report_text);
        save_report(&context, &report).await?;
        set_state(&context, WorkflowState::Extracted).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Report extracted, ready to generate".to_string()),
        ))
    }
}

async fn reject_upload(context: &Context, message: String) -> Result<TaskResult> {
    warn!("{}", message);
    record_failure(context, ReportError::Input(message.clone()).into_failure(None)).await?;

    Ok(TaskResult::new_with_status(
        Some(message),
        NextAction::WaitForInput,
        Some("Waiting for a readable MRI report".to_string()),
    ))
}
