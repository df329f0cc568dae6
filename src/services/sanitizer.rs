use bytes::Bytes;
use image::{ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::services::store::TempStore;

/// MIME types accepted from the sniffer. Everything else is rejected
/// before a decoder ever sees the bytes.
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Why an upload was rejected. Logged server-side with audit detail;
/// end users only ever see an opaque message.
#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("no file provided")]
    NoFileProvided,

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported content type: {}", detected.as_deref().unwrap_or("unrecognized"))]
    UnsupportedType { detected: Option<String> },

    #[error("image could not be decoded: {0}")]
    DecodeFailed(#[source] image::ImageError),

    #[error("failed to persist sanitized image: {0}")]
    WriteFailed(#[source] anyhow::Error),
}

/// One multipart file field, buffered by the HTTP layer.
///
/// The client-asserted filename is untrusted and is never used for
/// anything beyond logging.
pub struct UploadField {
    pub name: String,
    pub filename: Option<String>,
    pub data: Bytes,
}

/// A successfully cleaned image on disk. The file at `path` contains
/// only pixel data re-encoded as PNG; no byte of the original upload
/// survives sanitization.
#[derive(Debug, Clone)]
pub struct SanitizedAsset {
    pub path: PathBuf,
    pub size: u64,
}

pub struct UploadSanitizer {
    max_upload_size: usize,
    store: Arc<dyn TempStore>,
}

impl UploadSanitizer {
    pub fn new(max_upload_size: usize, store: Arc<dyn TempStore>) -> Self {
        Self {
            max_upload_size,
            store,
        }
    }

    /// Validate and neutralize one uploaded image.
    ///
    /// Pipeline: presence check, size ceiling (before any decoding, to
    /// bound worst-case work), magic-byte sniffing (client headers and
    /// extensions are ignored), full decode into a pixel buffer, PNG
    /// re-encode (drops EXIF/ICC/text chunks/polyglot payloads by
    /// construction), write under a collision-proof generated name.
    pub async fn sanitize(&self, field: &UploadField) -> Result<SanitizedAsset, SanitizeError> {
        let result = self.run(field).await;

        if let Err(e) = &result {
            warn!(
                field = %field.name,
                client_filename = field.filename.as_deref().unwrap_or("-"),
                size = field.data.len(),
                "Upload rejected: {}",
                e
            );
        }

        result
    }

    async fn run(&self, field: &UploadField) -> Result<SanitizedAsset, SanitizeError> {
        if field.data.is_empty() {
            return Err(SanitizeError::NoFileProvided);
        }

        if field.data.len() > self.max_upload_size {
            return Err(SanitizeError::TooLarge {
                size: field.data.len(),
                limit: self.max_upload_size,
            });
        }

        let format = sniff_format(&field.data)?;

        // A valid magic number with a corrupt body fails here.
        let decoded = image::load_from_memory_with_format(&field.data, format)
            .map_err(SanitizeError::DecodeFailed)?;

        // Serialize the pixel buffer only. This is the threat
        // neutralization step: nothing from the original byte stream is
        // carried over into the output.
        let mut png = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .map_err(|e| SanitizeError::WriteFailed(e.into()))?;

        let size = png.len() as u64;
        let path = self
            .store
            .put(&png, "png")
            .await
            .map_err(SanitizeError::WriteFailed)?;

        info!(
            field = %field.name,
            format = ?format,
            input_bytes = field.data.len(),
            output_bytes = size,
            "Sanitized upload stored at {}",
            path.display()
        );

        Ok(SanitizedAsset { path, size })
    }
}

/// Determine the actual content type from the file's magic bytes and
/// map it onto a decoder. The client-supplied content-type header never
/// participates in this decision.
fn sniff_format(data: &[u8]) -> Result<ImageFormat, SanitizeError> {
    let kind = infer::get(data).ok_or(SanitizeError::UnsupportedType { detected: None })?;

    match kind.mime_type() {
        "image/jpeg" => Ok(ImageFormat::Jpeg),
        "image/png" => Ok(ImageFormat::Png),
        "image/webp" => Ok(ImageFormat::WebP),
        other => Err(SanitizeError::UnsupportedType {
            detected: Some(other.to_string()),
        }),
    }
}
