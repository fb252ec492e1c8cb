//! Multipart asset uploads.

use axum::extract::{Multipart, State};
use axum::response::Json;
use uuid::Uuid;

use crate::AppState;
use crate::api::models::UploadResponse;
use crate::errors::Error;
use crate::types::AccountId;

/// Upload an input asset
///
/// Accepts a multipart form with an `account_id` text field and a `file`
/// field. The stored object gets a public URL suitable for the `image_url`,
/// `tail_image_url` and `video_url` inputs of a generation request.
#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    request_body(content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Asset stored", body = UploadResponse),
        (status = 400, description = "Malformed form data or uploads not configured"),
        (status = 502, description = "Object storage write failed"),
    ),
    tag = "uploads",
)]
#[tracing::instrument(skip_all)]
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, Error> {
    let Some(uploader) = state.uploader.clone() else {
        return Err(Error::BadRequest {
            message: "uploads are not configured on this deployment".to_string(),
        });
    };

    let mut account_id: Option<AccountId> = None;
    let mut file: Option<(String, Option<String>, bytes::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("malformed multipart body: {e}"),
    })? {
        match field.name() {
            Some("account_id") => {
                let text = field.text().await.map_err(|e| Error::BadRequest {
                    message: format!("unreadable account_id field: {e}"),
                })?;
                account_id = Some(Uuid::parse_str(text.trim()).map_err(|_| Error::BadRequest {
                    message: "account_id is not a valid UUID".to_string(),
                })?);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| Error::BadRequest {
                    message: format!("unreadable file field: {e}"),
                })?;
                file = Some((filename, content_type, bytes));
            }
            _ => {}
        }
    }

    let account_id = account_id.ok_or_else(|| Error::BadRequest {
        message: "missing account_id field".to_string(),
    })?;
    let (filename, content_type, bytes) = file.ok_or_else(|| Error::BadRequest {
        message: "missing file field".to_string(),
    })?;
    if bytes.is_empty() {
        return Err(Error::BadRequest {
            message: "file field is empty".to_string(),
        });
    }

    let url = uploader
        .upload(account_id, &filename, content_type.as_deref(), bytes)
        .await?;
    Ok(Json(UploadResponse { url }))
}
