use serde_json::{Value, json};
use tracing::{error, info};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::Result;
use crate::models::{EncodedPayload, ExtractedRecord};
use crate::parser;

const EXTRACTION_PROMPT: &str = r#"You are analyzing an insurance denial or prior authorization letter. Extract ALL key information and respond ONLY with a valid JSON object.

Your response must be a single JSON object with this exact structure:
{
  "patientName": "extracted patient name or empty string",
  "patientId": "member/patient ID or empty string",
  "insuranceCompany": "insurance company name or empty string",
  "denialReason": "primary reason for denial or empty string",
  "deniedService": "specific service/procedure denied or empty string",
  "denialDate": "date of denial or empty string",
  "appealDeadline": "deadline to appeal or empty string",
  "requiredDocuments": ["list of required documents"],
  "referenceNumber": "claim or reference number or empty string",
  "additionalNotes": "any other critical information or empty string"
}

Extract this information from the document. If any field cannot be determined, use an empty string or empty array."#;

/// Document block followed by the extraction instruction
pub fn build_request(payload: &EncodedPayload, max_tokens: u32) -> CompletionRequest {
    let content: Value = json!([
        {
            "type": payload.classification.as_str(),
            "source": {
                "type": "base64",
                "media_type": payload.media_type,
                "data": payload.data,
            }
        },
        {
            "type": "text",
            "text": EXTRACTION_PROMPT
        }
    ]);

    CompletionRequest {
        max_tokens,
        content,
    }
}

/// Ask the completion service for the denial facts in an encoded document
pub async fn extract(
    client: &dyn CompletionClient,
    payload: &EncodedPayload,
    max_tokens: u32,
) -> Result<ExtractedRecord> {
    info!(media_type = payload.media_type, "Starting denial extraction");

    let raw = client.complete(build_request(payload, max_tokens)).await?;

    let record = parser::parse_extracted_record(&raw).inspect_err(|e| {
        error!("Could not parse extraction response: {}", e);
    })?;

    info!(
        required_documents = record.required_documents.len(),
        has_deadline = !record.appeal_deadline.is_empty(),
        "Denial extraction completed"
    );
    Ok(record)
}
