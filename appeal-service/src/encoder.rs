use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::info;

use crate::error::{AppealError, Result};
use crate::models::{
    ContentClassification, Document, DocumentSource, EncodedPayload, SupportedContentType,
};

/// Block type and normalized media type sent for each accepted content type
pub fn classify(content_type: SupportedContentType) -> (ContentClassification, &'static str) {
    match content_type {
        SupportedContentType::Pdf => (ContentClassification::Document, "application/pdf"),
        SupportedContentType::Jpeg | SupportedContentType::Jpg => {
            (ContentClassification::Image, "image/jpeg")
        }
        SupportedContentType::Png => (ContentClassification::Image, "image/png"),
    }
}

/// Read the document and base64 it for the completion request
pub async fn encode(document: &Document) -> Result<EncodedPayload> {
    let bytes = read_bytes(document).await?;
    if bytes.is_empty() {
        return Err(AppealError::IoFailure(format!(
            "{} contains no data",
            document.file_name
        )));
    }

    let (classification, media_type) = classify(document.content_type);
    let data = STANDARD.encode(&bytes);

    info!(
        file_name = %document.file_name,
        classification = classification.as_str(),
        media_type,
        encoded_len = data.len(),
        "Encoded document"
    );

    Ok(EncodedPayload {
        classification,
        media_type,
        data,
    })
}

async fn read_bytes(document: &Document) -> Result<Vec<u8>> {
    match &document.source {
        DocumentSource::Bytes(bytes) => Ok(bytes.to_vec()),
        DocumentSource::Path(path) => tokio::fs::read(path).await.map_err(|e| {
            AppealError::IoFailure(format!("{}: {}", path.display(), e))
        }),
    }
}
