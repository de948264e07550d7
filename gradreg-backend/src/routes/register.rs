use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;

use crate::error::AppError;
use crate::registration::{self, Pipeline};
use crate::routes::Message;
use crate::session::Session;
use crate::AppState;

/// `POST /api/register`: multipart form with `eventId`, `mssv` (the student
/// id) and `photo` (a JPEG already cropped by the UI).
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Json<Message>, AppError> {
    let identity = session.identity()?.to_owned();

    let mut event_id: Option<String> = None;
    let mut student_id: Option<String> = None;
    let mut photo: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("eventId") => event_id = Some(field.text().await?),
            Some("mssv") => student_id = Some(field.text().await?),
            Some("photo") => photo = Some(field.bytes().await?),
            _ => {}
        }
    }
    let event_id = event_id.ok_or(AppError::MissingField("eventId"))?;
    let student_id = student_id.ok_or(AppError::MissingField("mssv"))?;
    let photo = photo.ok_or(AppError::MissingField("photo"))?;

    let pipeline = Pipeline {
        roster: &state.pool,
        registrations: &state.pool,
        storage: state.storage.as_ref(),
        faces: state.vision.as_ref(),
    };
    let receipt =
        registration::register(&pipeline, &identity, &event_id, &student_id, &photo).await?;

    Ok(Json(Message {
        message: format!(
            "Registration confirmed for {} ({}). Congratulations!",
            receipt.full_name, receipt.student_id
        ),
    }))
}
