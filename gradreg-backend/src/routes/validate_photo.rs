use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gradreg_vision::{FaceDetectionClient, PhotoClassification};
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;

#[derive(Serialize)]
pub struct ValidatePhotoResponse {
    pub valid: bool,
    pub message: String,
}

/// Standalone pre-flight check so the UI can reject a bad photo before the
/// full registration call. The commit path re-runs detection on whatever
/// bytes it receives; a pass here is advisory only.
pub async fn validate_photo(
    State(vision): State<Arc<FaceDetectionClient>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut photo = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("photo") {
            photo = Some(field.bytes().await?);
        }
    }
    let photo = photo.ok_or(AppError::MissingField("photo"))?;

    let classification = vision.classify_photo(&photo).await.map_err(|err| {
        warn!("face detection unavailable: {err}");
        AppError::PhotoCheckUnavailable
    })?;

    let (status, body) = match classification {
        PhotoClassification::ExactlyOneFace => (
            StatusCode::OK,
            ValidatePhotoResponse {
                valid: true,
                message: "Photo accepted: exactly one face detected.".to_owned(),
            },
        ),
        PhotoClassification::NoFace => (
            StatusCode::BAD_REQUEST,
            ValidatePhotoResponse {
                valid: false,
                message: AppError::NoFaceDetected.to_string(),
            },
        ),
        PhotoClassification::MultipleFaces(count) => (
            StatusCode::BAD_REQUEST,
            ValidatePhotoResponse {
                valid: false,
                message: AppError::MultipleFacesDetected(count).to_string(),
            },
        ),
    };
    Ok((status, Json(body)).into_response())
}
