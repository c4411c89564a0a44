use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::types::{load_report, record_failure, save_report, session_keys, set_state};
use crate::error::ReportError;
use crate::models::{ReviewSubmission, WordCounts, WorkflowState};

/// Stores the reviewer's ratings and counts words at submission time.
pub struct ReviewTask;

#[async_trait]
impl Task for ReviewTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let submission: Option<ReviewSubmission> = match context
            .remove(session_keys::REVIEW_SUBMISSION)
            .await
        {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };

        let Some(submission) = submission else {
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::WaitForInput,
                Some("Rate the quality of the AI-generated reports".to_string()),
            ));
        };

        let mut report = load_report(&context).await?;
        let original = report.report_text.clone().unwrap_or_default();
        if !report.reports.is_complete() {
            let err = ReportError::Input(
                "Generate the reports before submitting ratings".to_string(),
            );
            record_failure(&context, err.into_failure(None)).await?;
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::WaitForInput,
                Some("Waiting for generated reports".to_string()),
            ));
        }

        let word_counts = WordCounts::compute(&original, &report.reports);
        let submission = submission.normalized();
        info!(
            summary = submission.ratings.summary.value(),
            patient_friendly = submission.ratings.patient_friendly.value(),
            recommendation = submission.ratings.recommendation.value(),
            hallucination = %submission.hallucination,
            "Ratings received"
        );

        report.review = Some(submission);
        report.word_counts = Some(word_counts);
        report.exported_path = None;
        save_report(&context, &report).await?;
        set_state(&context, WorkflowState::Rated).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some("Ratings recorded".to_string()),
        ))
    }
}
