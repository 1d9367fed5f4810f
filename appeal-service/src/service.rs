use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    artifact::{ARTIFACT_CONTENT_TYPE, ARTIFACT_FILE_NAME},
    completion::{CompletionClient, MessagesApiClient},
    config::ServiceConfig,
    error::AppealError,
    intake::{self, INVALID_FILE_TYPE_MESSAGE},
    models::CandidateDocument,
    storage::{InMemorySessionStorage, Session, SessionStorage},
    workflow::{
        EXTRACTION_FAILED_MESSAGE, GENERATION_FAILED_MESSAGE, StepOutcome, WorkflowSettings,
        WorkflowSnapshot,
    },
};

/// Upper bound on uploaded denial letters
pub const MAX_DOCUMENT_BYTES: usize = 32 * 1024 * 1024;

const FILE_NAME_HEADER: &str = "x-file-name";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

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

fn conflict_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

/// Status code and body for a workflow error
fn appeal_error(e: &AppealError, session_id: &str) -> ApiError {
    let (status, message) = match e {
        AppealError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "Session not found".to_string()),
        AppealError::InvalidFileType { .. } => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            INVALID_FILE_TYPE_MESSAGE.to_string(),
        ),
        AppealError::OperationInFlight => (StatusCode::CONFLICT, e.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut body = json!({
        "error": message,
        "kind": e.kind(),
        "session_id": session_id
    });
    if let AppealError::InvalidFileType { content_type } = e {
        body["content_type"] = json!(content_type);
    }
    (status, Json(body))
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

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: WorkflowSnapshot,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            created_at: session.created_at,
            snapshot: session.workflow.snapshot(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub session_id: String,
    pub outcome: &'static str,
    pub message: Option<String>,
    #[serde(flatten)]
    pub snapshot: WorkflowSnapshot,
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub client: Arc<dyn CompletionClient>,
    pub settings: WorkflowSettings,
}

impl AppState {
    pub fn new(client: Arc<dyn CompletionClient>, settings: WorkflowSettings) -> Self {
        Self {
            session_storage: Arc::new(InMemorySessionStorage::new()),
            client,
            settings,
        }
    }

    pub fn with_session_storage(mut self, session_storage: Arc<dyn SessionStorage>) -> Self {
        self.session_storage = session_storage;
        self
    }
}

pub fn create_app(config: &ServiceConfig) -> crate::error::Result<Router> {
    let client = Arc::new(MessagesApiClient::new(config)?);
    let session_storage = Arc::new(InMemorySessionStorage::with_idle_ttl(
        config.session_idle_ttl,
    ));
    let app_state = AppState::new(client, WorkflowSettings::from(config))
        .with_session_storage(session_storage);
    Ok(build_router(app_state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/appeals", post(create_session))
        .route(
            "/appeals/{session_id}",
            get(get_session_status).delete(delete_session),
        )
        .route("/appeals/{session_id}/document", post(upload_document))
        .route("/appeals/{session_id}/extract", post(run_extraction))
        .route("/appeals/{session_id}/generate", post(run_generation))
        .route("/appeals/{session_id}/reset", post(reset_session))
        .route("/appeals/{session_id}/artifact", get(download_artifact))
        .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Denial Appeal Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Turns insurance denial letters into structured denial facts and an appeal package",
        "endpoints": {
            "POST /appeals": "Start a new appeal session",
            "GET /appeals/{session_id}": "Get workflow status and results",
            "POST /appeals/{session_id}/document": "Upload a denial letter (PDF, JPG, PNG) as the request body",
            "POST /appeals/{session_id}/extract": "Extract denial details from the uploaded letter",
            "POST /appeals/{session_id}/generate": "Generate the appeal package",
            "POST /appeals/{session_id}/reset": "Start over",
            "GET /appeals/{session_id}/artifact": "Download appeal-letter.txt",
            "DELETE /appeals/{session_id}": "Discard the session",
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

async fn create_session(State(state): State<AppState>) -> ApiResult<SessionResponse> {
    let session = Session::new(state.client.clone(), state.settings);
    let response = SessionResponse::from(&session);

    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to create session: {}", e);
        internal_error("Failed to create appeal session", &e.to_string())
    })?;

    info!(session_id = %response.session_id, "Appeal session created");
    Ok(Json(response))
}

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    match state.session_storage.get(session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => {
            let e = AppealError::SessionNotFound(session_id.to_string());
            warn!("{}", e);
            Err(appeal_error(&e, session_id))
        }
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(internal_error("Failed to load session", &e.to_string()))
        }
    }
}

async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    Ok(Json(SessionResponse::from(&session)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    load_session(&state, &session_id).await?;
    state.session_storage.delete(&session_id).await.map_err(|e| {
        error!("Failed to delete session {}: {}", session_id, e);
        internal_error("Failed to delete session", &e.to_string())
    })?;

    info!(session_id = %session_id, "Appeal session deleted");
    Ok(Json(json!({ "session_id": session_id, "status": "deleted" })))
}

async fn upload_document(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;

    let content_type = header_value(&headers, header::CONTENT_TYPE.as_str()).unwrap_or_default();
    let file_name =
        header_value(&headers, FILE_NAME_HEADER).unwrap_or_else(|| "document".to_string());

    info!(
        session_id = %session_id,
        file_name = %file_name,
        content_type = %content_type,
        size_bytes = body.len(),
        "Document uploaded"
    );

    intake::accepted_content_type(&content_type).map_err(|e| appeal_error(&e, &session_id))?;
    if body.is_empty() {
        return Err(bad_request_error("Document body is required"));
    }

    let candidate = CandidateDocument::from_bytes(file_name, content_type, body.to_vec());
    session
        .workflow
        .select_document(candidate)
        .map_err(|e| appeal_error(&e, &session_id))?;

    Ok(Json(SessionResponse::from(&session)))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

async fn run_extraction(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StepResponse> {
    let session = load_session(&state, &session_id).await?;
    let outcome = session.workflow.run_extraction().await;
    Ok(Json(step_response(
        session_id,
        &session,
        outcome,
        EXTRACTION_FAILED_MESSAGE,
    )))
}

async fn run_generation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StepResponse> {
    let session = load_session(&state, &session_id).await?;
    let outcome = session.workflow.run_generation().await;
    Ok(Json(step_response(
        session_id,
        &session,
        outcome,
        GENERATION_FAILED_MESSAGE,
    )))
}

fn step_response(
    session_id: String,
    session: &Session,
    outcome: StepOutcome,
    failure_message: &str,
) -> StepResponse {
    info!(session_id = %session_id, outcome = outcome.label(), "Workflow step finished");

    StepResponse {
        session_id,
        outcome: outcome.label(),
        message: matches!(outcome, StepOutcome::Failed(_)).then(|| failure_message.to_string()),
        snapshot: session.workflow.snapshot(),
    }
}

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    if !session.workflow.reset() {
        return Err(conflict_error(
            "Cannot reset while a request is in flight",
            &session_id,
        ));
    }

    Ok(Json(SessionResponse::from(&session)))
}

async fn download_artifact(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session = load_session(&state, &session_id).await?;
    let Some(text) = session.workflow.artifact() else {
        return Err(not_found_error("Appeal has not been generated yet", &session_id));
    };

    info!(session_id = %session_id, bytes = text.len(), "Serving appeal artifact");
    Ok((
        [
            (header::CONTENT_TYPE, ARTIFACT_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", ARTIFACT_FILE_NAME),
            ),
        ],
        text,
    )
        .into_response())
}
