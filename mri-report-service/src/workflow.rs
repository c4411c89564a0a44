use dashmap::DashMap;
use graph_flow::{FlowRunner, Graph, GraphBuilder, Session, SessionStorage, Task};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ReportError;
use crate::export::{EXPORT_FILE_NAME, EXPORT_MIME_TYPE};
use crate::extract::TextExtractor;
use crate::generator::ReportGenerator;
use crate::models::{
    ExportLink, MriReport, ReviewSubmission, SessionResponse, StepFailure, WorkflowState,
};
use crate::tasks::credential::MISSING_KEY_WARNING;
use crate::tasks::types::{PendingUpload, load_report, load_state};
use crate::tasks::*;

/// Collaborators the workflow tasks are built with.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub generator: Arc<dyn ReportGenerator>,
    pub extractor: Arc<dyn TextExtractor>,
    pub export: ExportSettings,
}

/// One user interaction, as the UI would issue it.
#[derive(Debug, Clone)]
pub enum UserAction {
    ProvideKey(String),
    Upload {
        file_name: Option<String>,
        pdf: Vec<u8>,
    },
    GenerateReports,
    SubmitRatings(ReviewSubmission),
}

fn action_name(action: &UserAction) -> &'static str {
    match action {
        UserAction::ProvideKey(_) => "provide_key",
        UserAction::Upload { .. } => "upload",
        UserAction::GenerateReports => "generate_reports",
        UserAction::SubmitRatings(_) => "submit_ratings",
    }
}

fn task_id<T: Task>() -> &'static str {
    std::any::type_name::<T>()
}

pub fn build_mri_workflow(deps: &WorkflowDeps) -> Graph {
    let credential_task = Arc::new(CredentialTask);
    let credential_id = credential_task.id().to_string();

    let pdf_extract_task = Arc::new(PdfExtractTask::new(deps.extractor.clone()));
    let pdf_extract_id = pdf_extract_task.id().to_string();

    let generate_task = Arc::new(GenerateReportsTask::new(deps.generator.clone()));
    let generate_id = generate_task.id().to_string();

    let review_task = Arc::new(ReviewTask);
    let review_id = review_task.id().to_string();

    let export_task = Arc::new(ExportReportTask::new(deps.export.clone()));
    let export_id = export_task.id().to_string();

    GraphBuilder::new("mri_report_workflow")
        .add_task(credential_task)
        .add_task(pdf_extract_task)
        .add_task(generate_task)
        .add_task(review_task)
        .add_task(export_task)
        .add_edge(&credential_id, &pdf_extract_id)
        .add_edge(&pdf_extract_id, &generate_id)
        .add_edge(&generate_id, &review_id)
        .add_edge(&review_id, &export_id)
        .build()
}

pub async fn create_mri_session(api_key: Option<String>) -> graph_flow::Result<Session> {
    let report = MriReport::new(Uuid::new_v4().to_string());

    let session_id = Uuid::new_v4().to_string();
    let session = Session::new_from_task(session_id, task_id::<CredentialTask>());
    session.context.set(session_keys::REPORT, report).await?;
    session
        .context
        .set(session_keys::STATE, WorkflowState::AwaitingKey)
        .await?;
    if let Some(key) = api_key.filter(|key| !key.is_empty()) {
        session.context.set(session_keys::API_KEY, key).await?;
    }

    Ok(session)
}

pub fn create_flow_runner(deps: &WorkflowDeps, session_storage: Arc<dyn SessionStorage>) -> FlowRunner {
    let graph = Arc::new(build_mri_workflow(deps));
    FlowRunner::new(graph, session_storage)
}

/// Maps user actions onto the task graph, one action per call.
///
/// Actions on the same session are serialized; actions on different sessions
/// run independently.
#[derive(Clone)]
pub struct WorkflowController {
    storage: Arc<dyn SessionStorage>,
    runner: FlowRunner,
    action_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowController {
    pub fn new(deps: &WorkflowDeps, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            runner: create_flow_runner(deps, storage.clone()),
            storage,
            action_locks: Arc::new(DashMap::new()),
        }
    }

    fn action_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.action_locks
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    pub async fn start_session(&self, api_key: Option<String>) -> Result<SessionResponse, ReportError> {
        let session = create_mri_session(api_key).await?;
        let session_id = session.id.clone();
        self.storage.save(session).await?;
        info!("Session {} created", session_id);

        let result = self.runner.run(&session_id).await?;
        self.respond(&session_id, result.response).await
    }

    pub async fn handle(
        &self,
        session_id: &str,
        action: UserAction,
    ) -> Result<SessionResponse, ReportError> {
        // unknown ids get no lock entry
        self.load(session_id).await?;

        let lock = self.action_lock(session_id);
        let _guard = lock.lock().await;
        debug!("Session {} handling {}", session_id, action_name(&action));
        self.handle_locked(session_id, action).await
    }

    async fn handle_locked(
        &self,
        session_id: &str,
        action: UserAction,
    ) -> Result<SessionResponse, ReportError> {
        let session = self.load(session_id).await?;
        let context = &session.context;
        let state = load_state(context).await;

        let next_task = match action {
            UserAction::ProvideKey(key) => {
                if key.is_empty() {
                    return Err(ReportError::Input(MISSING_KEY_WARNING.to_string()));
                }
                context.set(session_keys::API_KEY, key).await?;
                if state != WorkflowState::AwaitingKey {
                    info!("API key replaced for session {}", session_id);
                    context.remove(session_keys::FAILURE).await;
                    return self.respond(session_id, None).await;
                }
                task_id::<CredentialTask>()
            }
            UserAction::Upload { file_name, pdf } => {
                if state == WorkflowState::AwaitingKey {
                    return Err(ReportError::Input(MISSING_KEY_WARNING.to_string()));
                }
                if pdf.is_empty() {
                    return Err(ReportError::Input("The uploaded file is empty".to_string()));
                }
                context
                    .set(session_keys::PENDING_UPLOAD, PendingUpload::new(file_name, &pdf))
                    .await?;
                task_id::<PdfExtractTask>()
            }
            UserAction::GenerateReports => {
                if !state.has_report() {
                    return Err(ReportError::Input(
                        "Upload an MRI report before generating reports".to_string(),
                    ));
                }
                task_id::<GenerateReportsTask>()
            }
            UserAction::SubmitRatings(submission) => {
                if !state.has_generated_reports() {
                    return Err(ReportError::Input(
                        "Generate the reports before submitting ratings".to_string(),
                    ));
                }
                context
                    .set(session_keys::REVIEW_SUBMISSION, submission)
                    .await?;
                task_id::<ReviewTask>()
            }
        };

        context.remove(session_keys::FAILURE).await;
        let result = self.runner.resume_at(session_id, next_task).await?;
        self.respond(session_id, result.response).await
    }

    pub async fn status(&self, session_id: &str) -> Result<SessionResponse, ReportError> {
        self.respond(session_id, None).await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<(), ReportError> {
        self.load(session_id).await?;
        self.storage.delete(session_id).await?;
        self.action_locks.remove(session_id);
        info!("Session {} ended", session_id);
        Ok(())
    }

    /// Bytes of the last export written for this session.
    pub async fn export_file(&self, session_id: &str) -> Result<Vec<u8>, ReportError> {
        let session = self.load(session_id).await?;
        let report = load_report(&session.context).await?;
        let path = report.exported_path.ok_or_else(|| {
            ReportError::Input("No export available, submit ratings first".to_string())
        })?;

        tokio::fs::read(&path)
            .await
            .map_err(|e| ReportError::Export(format!("Cannot read {}: {}", path, e)))
    }

    async fn load(&self, session_id: &str) -> Result<Session, ReportError> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| ReportError::SessionNotFound(session_id.to_string()))
    }

    async fn respond(
        &self,
        session_id: &str,
        message: Option<String>,
    ) -> Result<SessionResponse, ReportError> {
        let session = self.load(session_id).await?;
        let context = &session.context;
        let report = load_report(context).await?;
        let api_key: Option<String> = context.get(session_keys::API_KEY).await;
        let failure: Option<StepFailure> = context.get(session_keys::FAILURE).await;

        let export = report.exported_path.as_ref().map(|_| ExportLink {
            file_name: EXPORT_FILE_NAME.to_string(),
            mime_type: EXPORT_MIME_TYPE.to_string(),
            download_url: format!("/mri/{}/export", session_id),
        });

        Ok(SessionResponse {
            session_id: session.id.clone(),
            state: load_state(context).await,
            current_task: session.current_task_id.clone(),
            status_message: session.status_message.clone(),
            message,
            has_api_key: api_key.is_some_and(|key| !key.is_empty()),
            file_name: report.file_name.clone(),
            reports: report.reports.ordered(),
            report_text: report.report_text,
            review: report.review,
            word_counts: report.word_counts,
            export,
            failure,
        })
    }
}
