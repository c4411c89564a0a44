use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State, rejection::JsonRejection},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use graph_flow::{InMemorySessionStorage, SessionStorage};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    error::ReportError,
    export::{EXPORT_FILE_NAME, EXPORT_MIME_TYPE},
    extract::LopdfExtractor,
    generator::build_generator,
    models::{
        ApiKeyRequest, FailureKind, ReviewSubmission, SessionResponse, StartSessionRequest,
        UploadQuery,
    },
    tasks::ExportSettings,
    workflow::{UserAction, WorkflowController, WorkflowDeps},
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

type ApiResult<T> = Result<T, ApiError>;
type ApiError = (StatusCode, Json<Value>);
type Outcome = (StatusCode, Json<SessionResponse>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn upstream_error(status: StatusCode, message: &str, details: &str) -> ApiError {
    (
        status,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn api_error(err: ReportError) -> ApiError {
    match &err {
        ReportError::SessionNotFound(id) => not_found_error("Session not found", id),
        ReportError::Input(message) => bad_request_error(message),
        ReportError::Auth(details) => {
            upstream_error(StatusCode::UNAUTHORIZED, "API key rejected", details)
        }
        ReportError::Upstream(details) => {
            upstream_error(StatusCode::BAD_GATEWAY, "LLM provider error", details)
        }
        ReportError::Export(_) | ReportError::Workflow(_) => {
            error!("Request failed: {}", err);
            internal_error("Request failed", &err.to_string())
        }
    }
}

/// Malformed or out-of-range JSON bodies are input errors like any other.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| api_error(ReportError::Input(rejection.body_text())))
}

/// Status for an action outcome: failures recorded by a task keep the
/// session body but change the code.
fn outcome_status(response: &SessionResponse, unusable_input: StatusCode) -> StatusCode {
    match response.failure.as_ref().map(|failure| failure.kind) {
        None => StatusCode::OK,
        Some(FailureKind::Input) => unusable_input,
        Some(FailureKind::Auth) => StatusCode::UNAUTHORIZED,
        Some(FailureKind::Upstream) => StatusCode::BAD_GATEWAY,
        Some(FailureKind::Export | FailureKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Clone)]
pub struct AppState {
    pub controller: WorkflowController,
    pub default_api_key: Option<String>,
}

pub fn create_app(config: &ServiceConfig) -> Router {
    let deps = WorkflowDeps {
        generator: build_generator(config),
        extractor: Arc::new(LopdfExtractor),
        export: ExportSettings {
            enabled: config.export_enabled,
            path: config.export_path.clone(),
        },
    };
    create_app_with(&deps, config.default_api_key.clone())
}

pub fn create_app_with(deps: &WorkflowDeps, default_api_key: Option<String>) -> Router {
    let session_storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
    let app_state = AppState {
        controller: WorkflowController::new(deps, session_storage),
        default_api_key,
    };
    build_router(app_state)
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/mri/session", post(start_session))
        .route(
            "/mri/{session_id}",
            get(get_session_status).delete(end_session),
        )
        .route("/mri/{session_id}/api-key", post(provide_api_key))
        .route("/mri/{session_id}/upload", post(upload_report))
        .route("/mri/{session_id}/generate", post(generate_reports))
        .route("/mri/{session_id}/ratings", post(submit_ratings))
        .route("/mri/{session_id}/export", get(download_export))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Tags every request with an `x-correlation-id` and runs it inside an
/// `http_request` span carrying that id.
async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "MRI Report Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Summaries, patient-friendly explanations and recommendations for MRI reports, rated by a reviewer",
        "endpoints": {
            "POST /mri/session": "Start a session, optionally with an API key",
            "GET /mri/{session_id}": "Get session state, generated texts and review",
            "DELETE /mri/{session_id}": "End a session",
            "POST /mri/{session_id}/api-key": "Provide the LLM API key",
            "POST /mri/{session_id}/upload": "Upload an MRI report PDF (raw body, ?file_name=)",
            "POST /mri/{session_id}/generate": "Generate the three reports",
            "POST /mri/{session_id}/ratings": "Submit ratings and hallucination feedback",
            "GET /mri/{session_id}/export": "Download the exported PDF",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn start_session(
    State(state): State<AppState>,
    request: Option<Json<StartSessionRequest>>,
) -> ApiResult<Json<SessionResponse>> {
    let api_key = request
        .and_then(|Json(request)| request.api_key)
        .filter(|key| !key.is_empty())
        .or_else(|| state.default_api_key.clone());

    let response = state.controller.start_session(api_key).await.map_err(api_error)?;
    info!(
        "Session {} started in state {:?}",
        response.session_id, response.state
    );
    Ok(Json(response))
}

async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    state
        .controller
        .status(&session_id)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .controller
        .end_session(&session_id)
        .await
        .map_err(api_error)?;

    Ok(Json(json!({
        "session_id": session_id,
        "status": "ended"
    })))
}

async fn provide_api_key(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> ApiResult<Outcome> {
    let request = json_body(payload)?;
    run_action(
        &state,
        &session_id,
        UserAction::ProvideKey(request.api_key),
        StatusCode::BAD_REQUEST,
    )
    .await
}

async fn upload_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<Outcome> {
    info!(
        "Upload of {} bytes for session {}",
        body.len(),
        session_id
    );

    let action = UserAction::Upload {
        file_name: query.file_name,
        pdf: body.to_vec(),
    };
    run_action(&state, &session_id, action, StatusCode::UNPROCESSABLE_ENTITY).await
}

async fn generate_reports(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Outcome> {
    run_action(
        &state,
        &session_id,
        UserAction::GenerateReports,
        StatusCode::BAD_REQUEST,
    )
    .await
}

async fn submit_ratings(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<ReviewSubmission>, JsonRejection>,
) -> ApiResult<Outcome> {
    let submission = json_body(payload)?;
    run_action(
        &state,
        &session_id,
        UserAction::SubmitRatings(submission),
        StatusCode::BAD_REQUEST,
    )
    .await
}

async fn run_action(
    state: &AppState,
    session_id: &str,
    action: UserAction,
    unusable_input: StatusCode,
) -> ApiResult<Outcome> {
    let response = state
        .controller
        .handle(session_id, action)
        .await
        .map_err(api_error)?;

    let status = outcome_status(&response, unusable_input);
    if let Some(failure) = &response.failure {
        warn!(
            "Session {} action failed ({:?}): {}",
            session_id, failure.kind, failure.message
        );
    }
    Ok((status, Json(response)))
}

async fn download_export(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Response> {
    let bytes = state
        .controller
        .export_file(&session_id)
        .await
        .map_err(api_error)?;

    info!("Serving export of {} bytes for session {}", bytes.len(), session_id);
    Ok((
        [
            (header::CONTENT_TYPE, EXPORT_MIME_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::TextExtractor;
    use crate::generator::ReportGenerator;
    use crate::models::WorkflowState;
    use crate::testing::{FixedExtractor, ScriptedGenerator, spawn_stub, text_pdf};

    const REPORT_TEXT: &str = "Patient has mild L4-L5 disc bulge.";

    async fn spawn_app(
        generator: ScriptedGenerator,
        extractor: Arc<dyn TextExtractor>,
        export_dir: &std::path::Path,
        default_api_key: Option<&str>,
    ) -> String {
        let generator: Arc<dyn ReportGenerator> = Arc::new(generator);
        let deps = WorkflowDeps {
            generator,
            extractor,
            export: ExportSettings {
                enabled: true,
                path: export_dir.join(EXPORT_FILE_NAME),
            },
        };
        spawn_stub(create_app_with(&deps, default_api_key.map(str::to_string))).await
    }

    async fn start(client: &reqwest::Client, base: &str, body: Value) -> SessionResponse {
        client
            .post(format!("{}/mri/session", base))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn_app(
            ScriptedGenerator::mri_defaults(),
            Arc::new(FixedExtractor(REPORT_TEXT.to_string())),
            tmp.path(),
            None,
        )
        .await;

        let health: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");

        let root = reqwest::get(format!("{}/", base)).await.unwrap();
        assert_eq!(root.status(), StatusCode::OK);
        let root: Value = root.json().await.unwrap();
        assert_eq!(root["service"], "MRI Report Assistant");
    }

    #[tokio::test]
    async fn test_full_review_over_http() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn_app(
            ScriptedGenerator::mri_defaults(),
            Arc::new(LopdfExtractor),
            tmp.path(),
            None,
        )
        .await;
        let client = reqwest::Client::new();

        let started = start(&client, &base, json!({})).await;
        assert_eq!(started.state, WorkflowState::AwaitingKey);
        let id = started.session_id;

        let keyed = client
            .post(format!("{}/mri/{}/api-key", base, id))
            .json(&json!({ "api_key": "sk-test" }))
            .send()
            .await
            .unwrap();
        assert_eq!(keyed.status(), StatusCode::OK);

        let uploaded = client
            .post(format!("{}/mri/{}/upload?file_name=lumbar.pdf", base, id))
            .body(text_pdf(&[REPORT_TEXT]))
            .send()
            .await
            .unwrap();
        assert_eq!(uploaded.status(), StatusCode::OK);
        let uploaded: SessionResponse = uploaded.json().await.unwrap();
        assert_eq!(uploaded.state, WorkflowState::Extracted);
        assert_eq!(uploaded.file_name.as_deref(), Some("lumbar.pdf"));

        let generated: SessionResponse = client
            .post(format!("{}/mri/{}/generate", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let texts: Vec<&str> = generated.reports.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["SUMMARY", "PATIENT", "RECS"]);

        let rated = client
            .post(format!("{}/mri/{}/ratings", base, id))
            .json(&json!({
                "ratings": { "summary": 4, "patient_friendly": 5, "recommendation": 3 },
                "hallucination": "Yes",
                "comment": "possible overcall"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(rated.status(), StatusCode::OK);
        let rated: SessionResponse = rated.json().await.unwrap();
        assert_eq!(rated.state, WorkflowState::Rated);
        let export = rated.export.unwrap();
        assert_eq!(export.download_url, format!("/mri/{}/export", id));

        let download = client
            .get(format!("{}{}", base, export.download_url))
            .send()
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_TYPE.as_str()],
            "application/pdf"
        );
        assert_eq!(
            download.headers()[header::CONTENT_DISPOSITION.as_str()],
            "attachment; filename=\"AI_Generated_MRI_Report.pdf\""
        );
        let bytes = download.bytes().await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_status_codes_follow_failure_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn_app(
            ScriptedGenerator::mri_defaults().failing_on("Based on"),
            Arc::new(LopdfExtractor),
            tmp.path(),
            Some("sk-default"),
        )
        .await;
        let client = reqwest::Client::new();

        let started = start(&client, &base, json!({})).await;
        assert_eq!(started.state, WorkflowState::AwaitingUpload);
        let id = started.session_id;

        let premature = client
            .post(format!("{}/mri/{}/generate", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(premature.status(), StatusCode::BAD_REQUEST);

        let garbage = client
            .post(format!("{}/mri/{}/upload", base, id))
            .body("not a pdf")
            .send()
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let blank = client
            .post(format!("{}/mri/{}/upload", base, id))
            .body(text_pdf(&[""]))
            .send()
            .await
            .unwrap();
        assert_eq!(blank.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let blank: SessionResponse = blank.json().await.unwrap();
        assert_eq!(blank.state, WorkflowState::AwaitingUpload);

        client
            .post(format!("{}/mri/{}/upload", base, id))
            .body(text_pdf(&[REPORT_TEXT]))
            .send()
            .await
            .unwrap();

        let partial = client
            .post(format!("{}/mri/{}/generate", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(partial.status(), StatusCode::BAD_GATEWAY);
        let partial: SessionResponse = partial.json().await.unwrap();
        assert_eq!(partial.state, WorkflowState::Extracted);
        assert_eq!(partial.reports.len(), 2);

        let no_export = client
            .get(format!("{}/mri/{}/export", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(no_export.status(), StatusCode::BAD_REQUEST);

        let missing = client
            .get(format!("{}/mri/{}", base, "no-such-session"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejected_key_is_unauthorized() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn_app(
            ScriptedGenerator::mri_defaults().rejecting_keys(),
            Arc::new(FixedExtractor(REPORT_TEXT.to_string())),
            tmp.path(),
            None,
        )
        .await;
        let client = reqwest::Client::new();
        let id = start(&client, &base, json!({ "api_key": "sk-bad" }))
            .await
            .session_id;
        client
            .post(format!("{}/mri/{}/upload", base, id))
            .body("%PDF-1.4")
            .send()
            .await
            .unwrap();

        let generated = client
            .post(format!("{}/mri/{}/generate", base, id))
            .send()
            .await
            .unwrap();

        assert_eq!(generated.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_ends_session() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn_app(
            ScriptedGenerator::mri_defaults(),
            Arc::new(FixedExtractor(REPORT_TEXT.to_string())),
            tmp.path(),
            None,
        )
        .await;
        let client = reqwest::Client::new();
        let id = start(&client, &base, json!({})).await.session_id;

        let ended = client
            .delete(format!("{}/mri/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(ended.status(), StatusCode::OK);

        let gone = client
            .get(format!("{}/mri/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }

    async fn generated_session(client: &reqwest::Client, base: &str) -> String {
        let id = start(client, base, json!({ "api_key": "sk-test" }))
            .await
            .session_id;
        client
            .post(format!("{}/mri/{}/upload", base, id))
            .body("%PDF-1.4")
            .send()
            .await
            .unwrap();
        client
            .post(format!("{}/mri/{}/generate", base, id))
            .send()
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_out_of_range_rating_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn_app(
            ScriptedGenerator::mri_defaults(),
            Arc::new(FixedExtractor(REPORT_TEXT.to_string())),
            tmp.path(),
            None,
        )
        .await;
        let client = reqwest::Client::new();
        let id = generated_session(&client, &base).await;

        for summary in [9, 0] {
            let rejected = client
                .post(format!("{}/mri/{}/ratings", base, id))
                .json(&json!({
                    "ratings": { "summary": summary, "patient_friendly": 3, "recommendation": 3 },
                    "hallucination": "No"
                }))
                .send()
                .await
                .unwrap();

            assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
            let body: Value = rejected.json().await.unwrap();
            let message = body["error"].as_str().unwrap();
            assert!(message.contains("between 1 and 5"), "{}", message);
        }

        let status: SessionResponse = client
            .get(format!("{}/mri/{}", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.state, WorkflowState::Generated);
        assert!(status.review.is_none());
    }

    #[tokio::test]
    async fn test_malformed_api_key_body_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn_app(
            ScriptedGenerator::mri_defaults(),
            Arc::new(FixedExtractor(REPORT_TEXT.to_string())),
            tmp.path(),
            None,
        )
        .await;
        let client = reqwest::Client::new();
        let id = start(&client, &base, json!({})).await.session_id;

        let rejected = client
            .post(format!("{}/mri/{}/api-key", base, id))
            .json(&json!({ "key": "sk-test" }))
            .send()
            .await
            .unwrap();

        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        let body: Value = rejected.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_delete_during_generation_is_not_undone() {
        let tmp = tempfile::tempdir().unwrap();
        let generator: Arc<dyn ReportGenerator> = Arc::new(SlowGenerator);
        let deps = WorkflowDeps {
            generator,
            extractor: Arc::new(FixedExtractor(REPORT_TEXT.to_string())),
            export: ExportSettings {
                enabled: false,
                path: tmp.path().join(EXPORT_FILE_NAME),
            },
        };
        let base = spawn_stub(create_app_with(&deps, None)).await;
        let client = reqwest::Client::new();
        let id = start(&client, &base, json!({ "api_key": "sk-test" }))
            .await
            .session_id;
        client
            .post(format!("{}/mri/{}/upload", base, id))
            .body("%PDF-1.4")
            .send()
            .await
            .unwrap();

        let generating = tokio::spawn({
            let client = client.clone();
            let url = format!("{}/mri/{}/generate", base, id);
            async move { client.post(url).send().await.unwrap().status() }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let deleted = client
            .delete(format!("{}/mri/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        assert_eq!(generating.await.unwrap(), StatusCode::NOT_FOUND);
        let after = client
            .get(format!("{}/mri/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(after.status(), StatusCode::NOT_FOUND);
    }

    struct SlowGenerator;

    #[async_trait::async_trait]
    impl ReportGenerator for SlowGenerator {
        async fn generate(&self, _prompt: &str, _credential: &str) -> Result<String, ReportError> {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            Ok("SLOW".to_string())
        }
    }
}
