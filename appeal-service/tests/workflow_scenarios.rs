use appeal_service::artifact::assemble;
use appeal_service::completion::ScriptedCompletionClient;
use appeal_service::{
    AppealError, CandidateDocument, CompletionClient, CompletionRequest, ErrorKind, StepOutcome,
    WorkflowController, WorkflowSettings, WorkflowState, WorkflowStatus,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

const EXTRACTION_RESPONSE: &str = r#"```json
{
  "patientName": "Jane Doe",
  "denialReason": "not medically necessary",
  "requiredDocuments": ["MRI report"]
}
```"#;

const GENERATION_RESPONSE: &str = r#"{
  "appealLetter": "To the Appeals Department,\n\nI am writing to request reconsideration.",
  "submissionInstructions": ["Sign and date the letter", "Attach the MRI report", "Fax to the number on the denial"],
  "documentsToInclude": ["MRI report", "Physician letter of medical necessity"],
  "deadlineReminder": "Appeals must be received within 180 days of the denial.",
  "additionalTips": ["Keep a copy of everything you send"]
}"#;

fn pdf() -> CandidateDocument {
    CandidateDocument::from_bytes("denial.pdf", "application/pdf", b"%PDF-1.4 denial".to_vec())
}

fn scripted(
    responses: Vec<appeal_service::Result<String>>,
) -> (WorkflowController, Arc<ScriptedCompletionClient>) {
    let client = Arc::new(ScriptedCompletionClient::new(responses));
    let controller = WorkflowController::new(client.clone(), WorkflowSettings::default());
    (controller, client)
}

#[tokio::test]
async fn pdf_extraction_installs_exactly_the_returned_record() {
    let (controller, client) = scripted(vec![Ok(EXTRACTION_RESPONSE.to_string())]);
    controller.select_document(pdf()).unwrap();

    assert_eq!(controller.run_extraction().await, StepOutcome::Completed);

    let state = controller.state();
    let WorkflowState::Extracted(document, record) = &state else {
        panic!("expected Extracted, got {:?}", state.status());
    };
    assert_eq!(document.file_name, "denial.pdf");
    assert_eq!(record.patient_name, "Jane Doe");
    assert_eq!(record.denial_reason, "not medically necessary");
    assert_eq!(record.required_documents, vec!["MRI report".to_string()]);
    assert_eq!(record.patient_id, "");
    assert_eq!(record.insurance_company, "");

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens, 2000);
    assert_eq!(requests[0].content[0]["type"], "document");
    assert_eq!(requests[0].content[0]["source"]["media_type"], "application/pdf");
}

#[tokio::test]
async fn server_error_during_extraction_falls_back_to_selected_document() {
    let (controller, _) = scripted(vec![Err(AppealError::HttpStatusError { code: 500 })]);
    controller.select_document(pdf()).unwrap();

    let outcome = controller.run_extraction().await;
    assert_eq!(outcome, StepOutcome::Failed(AppealError::HttpStatusError { code: 500 }));

    match controller.state() {
        WorkflowState::Failed {
            prior,
            error,
            message,
        } => {
            assert!(matches!(*prior, WorkflowState::DocumentSelected(_)));
            assert_eq!(error, AppealError::HttpStatusError { code: 500 });
            assert_eq!(message, "Failed to process document. Please try again.");
        }
        other => panic!("expected Failed, got {:?}", other.status()),
    }

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.error.unwrap().kind, ErrorKind::HttpStatusError);
    assert_eq!(snapshot.document.unwrap().file_name, "denial.pdf");
}

#[tokio::test]
async fn full_happy_path_produces_numbered_instructions() {
    let (controller, client) = scripted(vec![
        Ok(EXTRACTION_RESPONSE.to_string()),
        Ok(GENERATION_RESPONSE.to_string()),
    ]);
    controller.select_document(pdf()).unwrap();
    controller.run_extraction().await;

    assert_eq!(controller.run_generation().await, StepOutcome::Completed);
    assert_eq!(controller.state().status(), WorkflowStatus::AppealReady);

    let requests = client.requests();
    let generation_request = &requests[1];
    assert_eq!(generation_request.max_tokens, 3000);
    assert!(
        generation_request.content.as_str().unwrap().contains("\"patientName\": \"Jane Doe\"")
    );

    let text = controller.artifact().unwrap();
    assert!(text.starts_with("PRIOR AUTHORIZATION APPEAL LETTER\n"));
    assert!(text.contains(
        "SUBMISSION INSTRUCTIONS:\n\
1. Sign and date the letter\n\
2. Attach the MRI report\n\
3. Fax to the number on the denial\n"
    ));
    assert!(text.contains("• Physician letter of medical necessity"));
    assert!(text.contains("IMPORTANT: Appeals must be received within 180 days of the denial."));

    let package = controller.state().appeal_package().cloned().unwrap();
    assert_eq!(assemble(&package), assemble(&package));
    assert_eq!(controller.artifact().unwrap(), text);
}

#[tokio::test]
async fn failed_generation_keeps_record_and_can_be_retried() {
    let (controller, client) = scripted(vec![
        Ok(EXTRACTION_RESPONSE.to_string()),
        Ok("Sure! Here is your appeal letter: Dear Sir".to_string()),
        Ok(GENERATION_RESPONSE.to_string()),
    ]);
    controller.select_document(pdf()).unwrap();
    controller.run_extraction().await;

    let outcome = controller.run_generation().await;
    assert!(matches!(
        outcome,
        StepOutcome::Failed(AppealError::MalformedResponseJson { .. })
    ));

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(snapshot.extracted.unwrap().patient_name, "Jane Doe");
    assert_eq!(snapshot.appeal, None);
    assert_eq!(
        snapshot.error.unwrap().message,
        "Failed to generate appeal. Please try again."
    );

    // extraction is not re-run from a failed generation
    assert_eq!(controller.run_extraction().await, StepOutcome::Skipped);
    assert_eq!(controller.run_generation().await, StepOutcome::Completed);
    assert_eq!(controller.state().status(), WorkflowStatus::AppealReady);
    assert_eq!(client.requests().len(), 3);
}

#[tokio::test]
async fn reset_discards_everything() {
    let (controller, _) = scripted(vec![
        Ok(EXTRACTION_RESPONSE.to_string()),
        Ok(GENERATION_RESPONSE.to_string()),
    ]);
    controller.select_document(pdf()).unwrap();
    controller.run_extraction().await;
    controller.run_generation().await;

    assert!(controller.reset());
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::Idle);
    assert_eq!(snapshot.document, None);
    assert_eq!(snapshot.extracted, None);
    assert_eq!(snapshot.appeal, None);
    assert_eq!(controller.artifact(), None);
}

/// Holds every request until the test releases it
#[derive(Default)]
struct GatedClient {
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl CompletionClient for GatedClient {
    async fn complete(&self, _request: CompletionRequest) -> appeal_service::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Ok(EXTRACTION_RESPONSE.to_string())
    }
}

#[tokio::test]
async fn triggers_during_a_request_are_ignored() {
    let client = Arc::new(GatedClient::default());
    let controller = WorkflowController::new(client.clone(), WorkflowSettings::default());
    controller.select_document(pdf()).unwrap();

    let worker = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run_extraction().await })
    };
    client.started.notified().await;

    assert_eq!(controller.state().status(), WorkflowStatus::Extracting);
    assert!(controller.snapshot().in_flight);
    assert_eq!(controller.run_extraction().await, StepOutcome::Skipped);
    assert_eq!(controller.run_generation().await, StepOutcome::Skipped);
    assert!(!controller.reset());
    assert!(matches!(
        controller.select_document(pdf()),
        Err(AppealError::OperationInFlight)
    ));

    client.release.notify_one();
    assert_eq!(worker.await.unwrap(), StepOutcome::Completed);
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state().status(), WorkflowStatus::Extracted);
}

#[tokio::test]
async fn dropped_caller_does_not_strand_the_workflow() {
    let client = Arc::new(GatedClient::default());
    let controller = WorkflowController::new(client.clone(), WorkflowSettings::default());
    controller.select_document(pdf()).unwrap();

    // Give up on the run once its request is out, like a disconnected HTTP client
    tokio::select! {
        _ = controller.run_extraction() => panic!("extraction finished before release"),
        _ = client.started.notified() => {}
    }
    assert_eq!(controller.state().status(), WorkflowStatus::Extracting);

    client.release.notify_one();
    tokio::time::timeout(Duration::from_secs(1), async {
        while controller.state().is_in_flight() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workflow stayed in flight after its caller was dropped");

    assert_eq!(controller.state().status(), WorkflowStatus::Extracted);
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert!(controller.reset());
    assert_eq!(controller.state().status(), WorkflowStatus::Idle);
}
