use crate::error::{AppealError, Result};
use crate::models::{CandidateDocument, Document, SupportedContentType};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

pub const INVALID_FILE_TYPE_MESSAGE: &str = "Please upload a PDF or image file (JPG, PNG)";

/// Allow-list lookup of a declared content type
pub fn accepted_content_type(declared: &str) -> Result<SupportedContentType> {
    SupportedContentType::from_declared(declared).ok_or_else(|| AppealError::InvalidFileType {
        content_type: declared.to_string(),
    })
}

/// Content type a browser would declare for a local file, judged by its extension
pub fn declared_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("jpg") => "image/jpg",
        Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Accept a candidate file if its declared content type is on the allow-list
pub fn validate(candidate: CandidateDocument) -> Result<Document> {
    let content_type = accepted_content_type(&candidate.content_type).inspect_err(|_| {
        warn!(
            file_name = %candidate.file_name,
            content_type = %candidate.content_type,
            "Rejected document with unsupported content type"
        );
    })?;

    info!(
        file_name = %candidate.file_name,
        content_type = content_type.as_str(),
        size_bytes = candidate.size_bytes,
        "Accepted document"
    );

    Ok(Document {
        id: Uuid::new_v4(),
        file_name: candidate.file_name,
        content_type,
        size_bytes: candidate.size_bytes,
        source: candidate.source,
    })
}
