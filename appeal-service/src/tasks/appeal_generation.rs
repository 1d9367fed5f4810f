use serde_json::json;
use tracing::{error, info};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::Result;
use crate::models::{AppealPackage, ExtractedRecord};
use crate::parser;

fn generation_prompt(denial_details: &str) -> String {
    format!(
        r#"Based on this insurance denial information, generate a professional appeal letter and submission instructions.

DENIAL DETAILS:
{denial_details}

Respond ONLY with valid JSON in this exact structure:
{{
  "appealLetter": "full professionally written appeal letter text",
  "submissionInstructions": ["step 1", "step 2", "step 3"],
  "documentsToInclude": ["document 1", "document 2"],
  "deadlineReminder": "friendly reminder about deadline",
  "additionalTips": ["tip 1", "tip 2"]
}}

The appeal letter should be formal, cite medical necessity if relevant, and request reconsideration."#
    )
}

/// Single text instruction embedding the whole record as indented JSON
pub fn build_request(record: &ExtractedRecord, max_tokens: u32) -> CompletionRequest {
    let denial_details =
        serde_json::to_string_pretty(record).expect("ExtractedRecord always serializes");

    CompletionRequest {
        max_tokens,
        content: json!(generation_prompt(&denial_details)),
    }
}

/// Ask the completion service to draft the appeal package for a denial
pub async fn generate_appeal(
    client: &dyn CompletionClient,
    record: &ExtractedRecord,
    max_tokens: u32,
) -> Result<AppealPackage> {
    info!(
        insurance_company = %record.insurance_company,
        denied_service = %record.denied_service,
        "Starting appeal generation"
    );

    let raw = client.complete(build_request(record, max_tokens)).await?;

    let package = parser::parse_appeal_package(&raw).inspect_err(|e| {
        error!("Could not parse appeal response: {}", e);
    })?;

    info!(
        letter_len = package.appeal_letter.len(),
        steps = package.submission_instructions.len(),
        "Appeal generation completed"
    );
    Ok(package)
}
