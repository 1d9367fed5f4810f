//! Turns raw model output into validated values.
//!
//! Models wrap JSON in markdown fences often enough that fences are always
//! stripped first. Typed parsers then check every documented field: a missing
//! or `null` field becomes empty, anything of the wrong type is rejected.

use serde_json::{Map, Value};

use crate::error::{AppealError, Result};
use crate::models::{AppealPackage, ExtractedRecord};

/// Remove ```` ```json ```` / ```` ``` ```` markers anywhere in the text and trim
pub fn strip_fences(raw: &str) -> String {
    raw.replace("```json\n", "")
        .replace("```json", "")
        .replace("```\n", "")
        .replace("```", "")
        .trim()
        .to_string()
}

pub fn parse(raw: &str) -> Result<Value> {
    let cleaned = strip_fences(raw);
    serde_json::from_str(&cleaned)
        .map_err(|e| AppealError::malformed(raw, format!("Could not parse model response: {}", e)))
}

pub fn parse_extracted_record(raw: &str) -> Result<ExtractedRecord> {
    let value = parse(raw)?;
    let fields = FieldReader::new(&value, raw)?;

    Ok(ExtractedRecord {
        patient_name: fields.string("patientName")?,
        patient_id: fields.string("patientId")?,
        insurance_company: fields.string("insuranceCompany")?,
        denial_reason: fields.string("denialReason")?,
        denied_service: fields.string("deniedService")?,
        denial_date: fields.string("denialDate")?,
        appeal_deadline: fields.string("appealDeadline")?,
        required_documents: fields.string_list("requiredDocuments")?,
        reference_number: fields.string("referenceNumber")?,
        additional_notes: fields.string("additionalNotes")?,
    })
}

/// The letter is read by people as-is, so it must be present and non-blank
pub fn parse_appeal_package(raw: &str) -> Result<AppealPackage> {
    let value = parse(raw)?;
    let fields = FieldReader::new(&value, raw)?;

    let appeal_letter = fields.string("appealLetter")?.trim().to_string();
    if appeal_letter.is_empty() {
        return Err(AppealError::malformed(raw, "appealLetter is empty"));
    }

    Ok(AppealPackage {
        appeal_letter,
        submission_instructions: fields.string_list("submissionInstructions")?,
        documents_to_include: fields.string_list("documentsToInclude")?,
        deadline_reminder: fields.string("deadlineReminder")?,
        additional_tips: fields.string_list("additionalTips")?,
    })
}

struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    raw: &'a str,
}

impl<'a> FieldReader<'a> {
    fn new(value: &'a Value, raw: &'a str) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AppealError::malformed(raw, "expected a JSON object"))?;
        Ok(Self { object, raw })
    }

    fn string(&self, name: &str) -> Result<String> {
        match self.object.get(name) {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.mismatch(name, "a string", other)),
        }
    }

    fn string_list(&self, name: &str) -> Result<Vec<String>> {
        match self.object.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.mismatch(name, "an array of strings", other)),
                })
                .collect(),
            Some(other) => Err(self.mismatch(name, "an array of strings", other)),
        }
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> AppealError {
        AppealError::malformed(
            self.raw,
            format!("field `{}` must be {}, found {}", name, expected, type_name(found)),
        )
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
