use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Content types accepted at intake, exactly as browsers advertise them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportedContentType {
    #[serde(rename = "application/pdf")]
    Pdf,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/jpg")]
    Jpg,
    #[serde(rename = "image/png")]
    Png,
}

impl SupportedContentType {
    pub const ALL: [SupportedContentType; 4] = [Self::Pdf, Self::Jpeg, Self::Jpg, Self::Png];

    /// Case-sensitive lookup of a declared content type
    pub fn from_declared(content_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == content_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Jpg => "image/jpg",
            Self::Png => "image/png",
        }
    }
}

/// Block type used when attaching a document to a completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClassification {
    Document,
    Image,
}

impl ContentClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
        }
    }
}

/// Where the bytes of a document live
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Bytes(Arc<[u8]>),
    /// Read lazily when the document is encoded
    Path(PathBuf),
}

/// A file offered for intake, before its content type has been checked
#[derive(Debug, Clone)]
pub struct CandidateDocument {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub source: DocumentSource,
}

impl CandidateDocument {
    pub fn from_bytes(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            size_bytes: bytes.len() as u64,
            source: DocumentSource::Bytes(Arc::from(bytes)),
        }
    }

    /// Size is taken from file metadata; an unreadable path reports zero and
    /// fails later, when the document is encoded.
    pub fn from_path(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        Self {
            file_name,
            content_type: content_type.into(),
            size_bytes,
            source: DocumentSource::Path(path),
        }
    }
}

/// An accepted denial letter. Replaced wholesale, never edited.
#[derive(Debug, Clone)]
pub struct Document {
    /// Fresh for every accepted file, even when the same file is selected again
    pub id: Uuid,
    pub file_name: String,
    pub content_type: SupportedContentType,
    pub size_bytes: u64,
    pub source: DocumentSource,
}

impl Document {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            file_name: self.file_name.clone(),
            content_type: self.content_type.as_str().to_string(),
            size_bytes: self.size_bytes,
            size_kb: format!("{:.1} KB", self.size_bytes as f64 / 1024.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub size_kb: String,
}

/// Document bytes ready to be embedded in a completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub classification: ContentClassification,
    pub media_type: &'static str,
    pub data: String,
}

/// Denial facts pulled out of the uploaded letter. Empty means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    pub patient_name: String,
    pub patient_id: String,
    pub insurance_company: String,
    pub denial_reason: String,
    pub denied_service: String,
    pub denial_date: String,
    pub appeal_deadline: String,
    pub required_documents: Vec<String>,
    pub reference_number: String,
    pub additional_notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppealPackage {
    pub appeal_letter: String,
    pub submission_instructions: Vec<String>,
    pub documents_to_include: Vec<String>,
    pub deadline_reminder: String,
    pub additional_tips: Vec<String>,
}
