use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info};

use super::types::{load_report, record_failure, save_report, session_keys, set_state};
use crate::error::ReportError;
use crate::generator::{ReportGenerator, build_prompt};
use crate::models::{ReportKind, WorkflowState};

/// Runs the three prompts one after another against the session's report text.
///
/// Each text is written to the session as soon as it arrives. The first failure
/// stops the run and leaves the session in `Extracted` so the action can be retried.
pub struct GenerateReportsTask {
    generator: Arc<dyn ReportGenerator>,
}

impl GenerateReportsTask {
    pub fn new(generator: Arc<dyn ReportGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Task for GenerateReportsTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!("Starting report generation");

        let mut report = load_report(&context).await?;
        let report_text = match report.report_text.clone() {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                let err = ReportError::Input(super::pdf_extract::EMPTY_REPORT_WARNING.to_string());
                record_failure(&context, err.into_failure(None)).await?;
                return Ok(TaskResult::new_with_status(
                    None,
                    NextAction::WaitForInput,
                    Some("Waiting for a readable MRI report".to_string()),
                ));
            }
        };
        let api_key: String = context
            .get(session_keys::API_KEY)
            .await
            .unwrap_or_default();

        // A new run replaces the previous texts and everything reviewed from them
        report.clear_derived();
        save_report(&context, &report).await?;
        set_state(&context, WorkflowState::Extracted).await?;

        for kind in ReportKind::ALL {
            info!("Generating {}...", kind.title());
            let prompt = build_prompt(kind, &report_text);

            match self.generator.generate(&prompt, &api_key).await {
                Ok(text) => {
                    info!("{} generated ({} characters)", kind.title(), text.len());
                    report.reports.set(kind, text);
                    save_report(&context, &report).await?;
                }
                Err(e) => {
                    error!("Failed to generate {}: {}", kind.title(), e);
                    let status = format!("Failed to generate {}", kind.title());
                    record_failure(&context, e.into_failure(Some(kind))).await?;
                    return Ok(TaskResult::new_with_status(
                        None,
                        NextAction::WaitForInput,
                        Some(status),
                    ));
                }
            }
        }

        set_state(&context, WorkflowState::Generated).await?;
        info!("All reports generated");

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Rate the quality of the AI-generated reports".to_string()),
        ))
    }
}
