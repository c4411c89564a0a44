use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use std::path::PathBuf;
use tracing::{error, info};

use super::types::{load_report, record_failure, save_report};
use crate::error::ReportError;
use crate::export::{ExportDocument, write_export};

pub const RATINGS_ACKNOWLEDGMENT: &str = "Ratings submitted! Thank you for your feedback.";

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

/// Renders the reviewed report to the export path, when exporting is enabled.
pub struct ExportReportTask {
    settings: ExportSettings,
}

impl ExportReportTask {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    async fn export(&self, context: &Context) -> std::result::Result<String, ReportError> {
        let mut report = load_report(context).await?;
        let document = ExportDocument::from_report(&report)?;
        let bytes = document.render_pdf()?;
        write_export(&self.settings.path, &bytes).await?;

        let path = self.settings.path.display().to_string();
        report.exported_path = Some(path.clone());
        save_report(context, &report).await?;
        Ok(path)
    }
}

#[async_trait]
impl Task for ExportReportTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        if !self.settings.enabled {
            return Ok(TaskResult::new_with_status(
                Some(RATINGS_ACKNOWLEDGMENT.to_string()),
                NextAction::End,
                Some("Ratings recorded".to_string()),
            ));
        }

        match self.export(&context).await {
            Ok(path) => {
                info!("Report exported to {}", path);
                Ok(TaskResult::new_with_status(
                    Some(RATINGS_ACKNOWLEDGMENT.to_string()),
                    NextAction::End,
                    Some("Report ready for download".to_string()),
                ))
            }
            Err(e) => {
                error!("Export failed: {}", e);
                record_failure(&context, e.into_failure(None)).await?;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::End,
                    Some("Ratings recorded, export failed".to_string()),
                ))
            }
        }
    }
}
