//! The document-to-appeal state machine.
//!
//! A [`WorkflowController`] owns exactly one [`WorkflowState`]. Every change
//! goes through [`transition`], and the state lock is never held across a
//! completion request: a second trigger arriving while a request is out sees
//! `Extracting`/`GeneratingAppeal` and is skipped. Requests run on their own
//! task, so every in-flight state is eventually left.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact;
use crate::completion::CompletionClient;
use crate::config::{DEFAULT_EXTRACTION_MAX_TOKENS, DEFAULT_GENERATION_MAX_TOKENS, ServiceConfig};
use crate::encoder;
use crate::error::{AppealError, ErrorKind, Result};
use crate::intake;
use crate::models::{AppealPackage, CandidateDocument, Document, DocumentSummary, ExtractedRecord};
use crate::tasks;
use crate::utils::lock;

pub const EXTRACTION_FAILED_MESSAGE: &str = "Failed to process document. Please try again.";
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate appeal. Please try again.";

#[derive(Debug, Clone)]
pub enum WorkflowState {
    Idle,
    DocumentSelected(Document),
    Extracting(Document),
    Extracted(Document, ExtractedRecord),
    GeneratingAppeal(Document, ExtractedRecord),
    AppealReady(Document, ExtractedRecord, AppealPackage),
    /// `prior` is always `DocumentSelected` or `Extracted`
    Failed {
        prior: Box<WorkflowState>,
        error: AppealError,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    DocumentSelected,
    Extracting,
    Extracted,
    GeneratingAppeal,
    AppealReady,
    Failed,
}

impl WorkflowState {
    pub fn status(&self) -> WorkflowStatus {
        match self {
            WorkflowState::Idle => WorkflowStatus::Idle,
            WorkflowState::DocumentSelected(_) => WorkflowStatus::DocumentSelected,
            WorkflowState::Extracting(_) => WorkflowStatus::Extracting,
            WorkflowState::Extracted(..) => WorkflowStatus::Extracted,
            WorkflowState::GeneratingAppeal(..) => WorkflowStatus::GeneratingAppeal,
            WorkflowState::AppealReady(..) => WorkflowStatus::AppealReady,
            WorkflowState::Failed { .. } => WorkflowStatus::Failed,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            WorkflowState::Extracting(_) | WorkflowState::GeneratingAppeal(..)
        )
    }

    /// The state a failure fell back to, or the state itself
    pub fn stable(&self) -> &WorkflowState {
        match self {
            WorkflowState::Failed { prior, .. } => prior,
            other => other,
        }
    }

    pub fn document(&self) -> Option<&Document> {
        match self.stable() {
            WorkflowState::Idle | WorkflowState::Failed { .. } => None,
            WorkflowState::DocumentSelected(doc)
            | WorkflowState::Extracting(doc)
            | WorkflowState::Extracted(doc, _)
            | WorkflowState::GeneratingAppeal(doc, _)
            | WorkflowState::AppealReady(doc, _, _) => Some(doc),
        }
    }

    pub fn extracted_record(&self) -> Option<&ExtractedRecord> {
        match self.stable() {
            WorkflowState::Extracted(_, record)
            | WorkflowState::GeneratingAppeal(_, record)
            | WorkflowState::AppealReady(_, record, _) => Some(record),
            _ => None,
        }
    }

    pub fn appeal_package(&self) -> Option<&AppealPackage> {
        match self {
            WorkflowState::AppealReady(_, _, package) => Some(package),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<(&AppealError, &str)> {
        match self {
            WorkflowState::Failed { error, message, .. } => Some((error, message.as_str())),
            _ => None,
        }
    }
}

/// Inputs to [`transition`]
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    DocumentAccepted(Document),
    ExtractionStarted { document_id: Uuid },
    ExtractionSucceeded(ExtractedRecord),
    ExtractionFailed(AppealError),
    GenerationStarted { document_id: Uuid },
    GenerationSucceeded(AppealPackage),
    GenerationFailed(AppealError),
    Reset,
}

/// Next state for `event`, or `None` when the event does not apply to `state`
pub fn transition(state: &WorkflowState, event: WorkflowEvent) -> Option<WorkflowState> {
    use WorkflowState as S;

    if state.is_in_flight() {
        return match (state, event) {
            (S::Extracting(doc), WorkflowEvent::ExtractionSucceeded(record)) => {
                Some(S::Extracted(doc.clone(), record))
            }
            (S::Extracting(doc), WorkflowEvent::ExtractionFailed(error)) => Some(S::Failed {
                prior: Box::new(S::DocumentSelected(doc.clone())),
                error,
                message: EXTRACTION_FAILED_MESSAGE.to_string(),
            }),
            (S::GeneratingAppeal(doc, record), WorkflowEvent::GenerationSucceeded(package)) => {
                Some(S::AppealReady(doc.clone(), record.clone(), package))
            }
            (S::GeneratingAppeal(doc, record), WorkflowEvent::GenerationFailed(error)) => {
                Some(S::Failed {
                    prior: Box::new(S::Extracted(doc.clone(), record.clone())),
                    error,
                    message: GENERATION_FAILED_MESSAGE.to_string(),
                })
            }
            _ => None,
        };
    }

    match (state.stable(), event) {
        (_, WorkflowEvent::DocumentAccepted(doc)) => Some(S::DocumentSelected(doc)),
        (_, WorkflowEvent::Reset) => Some(S::Idle),
        (S::DocumentSelected(doc), WorkflowEvent::ExtractionStarted { document_id })
            if doc.id == document_id =>
        {
            Some(S::Extracting(doc.clone()))
        }
        (S::Extracted(doc, record), WorkflowEvent::GenerationStarted { document_id })
            if doc.id == document_id =>
        {
            Some(S::GeneratingAppeal(doc.clone(), record.clone()))
        }
        _ => None,
    }
}

/// What a run operation did. Failures are already recorded in the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped,
    Failed(AppealError),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Completed => "completed",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub extraction_max_tokens: u32,
    pub generation_max_tokens: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            extraction_max_tokens: DEFAULT_EXTRACTION_MAX_TOKENS,
            generation_max_tokens: DEFAULT_GENERATION_MAX_TOKENS,
        }
    }
}

impl From<&ServiceConfig> for WorkflowSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            extraction_max_tokens: config.extraction_max_tokens,
            generation_max_tokens: config.generation_max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub kind: ErrorKind,
    pub message: String,
}

/// Read-only view of the workflow handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub status: WorkflowStatus,
    pub in_flight: bool,
    pub document: Option<DocumentSummary>,
    pub extracted: Option<ExtractedRecord>,
    pub appeal: Option<AppealPackage>,
    pub error: Option<FailureSummary>,
}

impl From<&WorkflowState> for WorkflowSnapshot {
    fn from(state: &WorkflowState) -> Self {
        Self {
            status: state.status(),
            in_flight: state.is_in_flight(),
            document: state.document().map(Document::summary),
            extracted: state.extracted_record().cloned(),
            appeal: state.appeal_package().cloned(),
            error: state.failure().map(|(error, message)| FailureSummary {
                kind: error.kind(),
                message: message.to_string(),
            }),
        }
    }
}

/// Sequences intake, extraction and generation for one session
#[derive(Clone)]
pub struct WorkflowController {
    state: Arc<Mutex<WorkflowState>>,
    client: Arc<dyn CompletionClient>,
    settings: WorkflowSettings,
}

impl WorkflowController {
    pub fn new(client: Arc<dyn CompletionClient>, settings: WorkflowSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorkflowState::Idle)),
            client,
            settings,
        }
    }

    pub fn state(&self) -> WorkflowState {
        lock(&self.state).clone()
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot::from(&*lock(&self.state))
    }

    /// Text of the downloadable appeal, once one has been generated
    pub fn artifact(&self) -> Option<String> {
        lock(&self.state).appeal_package().map(artifact::assemble)
    }

    /// The only place the state is replaced
    fn apply(&self, event: WorkflowEvent) -> bool {
        let mut state = lock(&self.state);
        match transition(&state, event) {
            Some(next) => {
                info!(from = ?state.status(), to = ?next.status(), "Workflow transition");
                *state = next;
                true
            }
            None => false,
        }
    }

    /// Accept a new file, discarding any previous record, appeal and error.
    /// Rejected files leave the state untouched.
    pub fn select_document(&self, candidate: CandidateDocument) -> Result<()> {
        let document = intake::validate(candidate)?;
        if self.apply(WorkflowEvent::DocumentAccepted(document)) {
            Ok(())
        } else {
            warn!("Document selected while a request is in flight");
            Err(AppealError::OperationInFlight)
        }
    }

    pub fn reset(&self) -> bool {
        let applied = self.apply(WorkflowEvent::Reset);
        if !applied {
            warn!("Ignoring reset while a request is in flight");
        }
        applied
    }

    pub async fn run_extraction(&self) -> StepOutcome {
        let Some(document) = self.extraction_source() else {
            info!("Extraction not available in current state, skipping");
            return StepOutcome::Skipped;
        };

        // Encoding failures leave the document selected
        let payload = match encoder::encode(&document).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(file_name = %document.file_name, "Error reading document: {}", e);
                return StepOutcome::Failed(e);
            }
        };

        if !self.apply(WorkflowEvent::ExtractionStarted {
            document_id: document.id,
        }) {
            info!("Extraction already started or document replaced, skipping");
            return StepOutcome::Skipped;
        }

        let worker = self.clone();
        let request = tokio::spawn(async move {
            let result = tasks::extract(
                worker.client.as_ref(),
                &payload,
                worker.settings.extraction_max_tokens,
            )
            .await;

            match result {
                Ok(record) => worker.finish(WorkflowEvent::ExtractionSucceeded(record), None),
                Err(e) => {
                    error!(file_name = %document.file_name, "Error processing document: {}", e);
                    worker.finish(WorkflowEvent::ExtractionFailed(e.clone()), Some(e))
                }
            }
        });

        self.join(request, WorkflowEvent::ExtractionFailed).await
    }

    pub async fn run_generation(&self) -> StepOutcome {
        let Some((document_id, record)) = self.generation_source() else {
            info!("Appeal generation not available in current state, skipping");
            return StepOutcome::Skipped;
        };

        if !self.apply(WorkflowEvent::GenerationStarted { document_id }) {
            info!("Appeal generation already started, skipping");
            return StepOutcome::Skipped;
        }

        let worker = self.clone();
        let request = tokio::spawn(async move {
            let result = tasks::generate_appeal(
                worker.client.as_ref(),
                &record,
                worker.settings.generation_max_tokens,
            )
            .await;

            match result {
                Ok(package) => worker.finish(WorkflowEvent::GenerationSucceeded(package), None),
                Err(e) => {
                    error!("Error generating appeal: {}", e);
                    worker.finish(WorkflowEvent::GenerationFailed(e.clone()), Some(e))
                }
            }
        });

        self.join(request, WorkflowEvent::GenerationFailed).await
    }

    /// Wait for a request task. The task settles the state itself, so it still
    /// lands if this caller is dropped mid-request.
    async fn join(
        &self,
        request: JoinHandle<StepOutcome>,
        failed: fn(AppealError) -> WorkflowEvent,
    ) -> StepOutcome {
        match request.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Completion task did not finish: {}", e);
                let error = AppealError::NetworkFailure(e.to_string());
                self.finish(failed(error.clone()), Some(error))
            }
        }
    }

    fn finish(&self, event: WorkflowEvent, error: Option<AppealError>) -> StepOutcome {
        if !self.apply(event) {
            warn!("Workflow left its in-flight state before the response arrived, discarding");
            return StepOutcome::Skipped;
        }
        match error {
            Some(e) => StepOutcome::Failed(e),
            None => StepOutcome::Completed,
        }
    }

    fn extraction_source(&self) -> Option<Document> {
        let state = lock(&self.state);
        if state.is_in_flight() {
            return None;
        }
        match state.stable() {
            WorkflowState::DocumentSelected(doc) => Some(doc.clone()),
            _ => None,
        }
    }

    fn generation_source(&self) -> Option<(Uuid, ExtractedRecord)> {
        let state = lock(&self.state);
        if state.is_in_flight() {
            return None;
        }
        match state.stable() {
            WorkflowState::Extracted(doc, record) => Some((doc.id, record.clone())),
            _ => None,
        }
    }
}
