use crate::api::error::AppError;
use crate::services::composer::TicketSpec;
use crate::services::sanitizer::{SanitizedAsset, UploadField};
use axum::{
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::warn;

fn map_multipart_err(e: axum::extract::multipart::MultipartError) -> AppError {
    // The length-limit case only shows up in the error's status, not in
    // its display text.
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.to_string())
    }
}

#[utoipa::path(
    post,
    path = "/ticket",
    request_body(content = Multipart, description = "Fields: logo (file, required), barcode (file, optional), withBarcode (checkbox, \"1\" when set)"),
    responses(
        (status = 200, description = "Composed ticket PDF as attachment", content_type = "application/pdf"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 422, description = "Logo missing or failed sanitization")
    ),
    tag = "ticket"
)]
pub async fn create_ticket(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut logo: Option<SanitizedAsset> = None;
    let mut barcode: Option<SanitizedAsset> = None;
    let mut with_barcode = false;
    // Everything sanitization put on disk for this request, fatal path
    // included. Deleted below on every exit.
    let mut assets: Vec<SanitizedAsset> = Vec::new();

    let result: Result<Response, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(map_multipart_err)? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "logo" | "barcode" => {
                    let filename = field.file_name().map(str::to_string);
                    let data = field.bytes().await.map_err(map_multipart_err)?;

                    // Browsers submit an empty part for an untouched
                    // optional file input.
                    if data.is_empty() && name == "barcode" {
                        continue;
                    }

                    let upload = UploadField {
                        name: name.clone(),
                        filename,
                        data,
                    };

                    match state.sanitizer.sanitize(&upload).await {
                        Ok(asset) => {
                            assets.push(asset.clone());
                            if name == "logo" {
                                logo = Some(asset);
                            } else {
                                barcode = Some(asset);
                            }
                        }
                        // The sanitizer already logged the audit detail.
                        Err(_) if name == "logo" => return Err(AppError::RequiredAsset),
                        Err(_) => {
                            // Non-fatal: the ticket falls back to the
                            // reserved-space placeholder.
                        }
                    }
                }
                "withBarcode" => {
                    let text = field.text().await.map_err(map_multipart_err)?;
                    with_barcode = text == "1";
                }
                other => {
                    warn!("Ignoring unknown form field '{}'", other);
                }
            }
        }

        if logo.is_none() {
            return Err(AppError::RequiredAsset);
        }

        let spec = TicketSpec {
            logo,
            barcode,
            with_barcode,
        };
        let pdf = state.composer.compose(&spec)?;

        Ok((
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", spec.download_filename()),
                ),
            ],
            pdf,
        )
            .into_response())
    }
    .await;

    // Temp files never outlive the request, whether a PDF was produced
    // or not.
    for asset in &assets {
        if let Err(e) = state.store.delete(&asset.path).await {
            warn!("Failed to clean up {}: {}", asset.path.display(), e);
        }
    }

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Consume the remaining multipart stream to avoid a TCP reset
            // ("Network error" in the browser) on early rejection.
            warn!("Ticket request failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}
