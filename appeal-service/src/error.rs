use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while turning a denial letter into an appeal package
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppealError {
    #[error("Unsupported file type: {content_type}")]
    InvalidFileType { content_type: String },

    #[error("Failed to read document: {0}")]
    IoFailure(String),

    #[error("Completion service unreachable: {0}")]
    NetworkFailure(String),

    #[error("Completion service returned status {code}")]
    HttpStatusError { code: u16 },

    #[error("Malformed JSON in model response: {reason}")]
    MalformedResponseJson { raw_text: String, reason: String },

    #[error("Another operation is already in flight")]
    OperationInFlight,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Discriminant of [`AppealError`], carried by failed workflow states and snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFileType,
    IoFailure,
    NetworkFailure,
    HttpStatusError,
    MalformedResponseJson,
    OperationInFlight,
    SessionNotFound,
    Config,
}

impl AppealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppealError::InvalidFileType { .. } => ErrorKind::InvalidFileType,
            AppealError::IoFailure(_) => ErrorKind::IoFailure,
            AppealError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            AppealError::HttpStatusError { .. } => ErrorKind::HttpStatusError,
            AppealError::MalformedResponseJson { .. } => ErrorKind::MalformedResponseJson,
            AppealError::OperationInFlight => ErrorKind::OperationInFlight,
            AppealError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            AppealError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn malformed(raw_text: impl Into<String>, reason: impl Into<String>) -> Self {
        AppealError::MalformedResponseJson {
            raw_text: raw_text.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppealError>;
