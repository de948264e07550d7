use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use gradreg_database::models::{Event, EventUpdate, NewEvent};
use gradreg_database::queries::{self, DeleteEventOutcome};
use gradreg_database::Pool;
use rand::{thread_rng, Rng as _};
use tracing::info;

use crate::error::AppError;
use crate::routes::Message;
use crate::session::AdminToken;

fn new_event_id() -> String {
    thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

pub async fn create_event(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Json(payload): Json<EventUpdate>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = NewEvent {
        id: new_event_id(),
        title: payload.title,
        organizer: payload.organizer,
        location: payload.location,
        event_time: payload.event_time,
        opens_at: payload.opens_at,
        closes_at: payload.closes_at,
        notes: payload.notes,
        cover_image_url: payload.cover_image_url,
        created_at: Utc::now(),
    };
    queries::create_event(&pool, &event).await?;
    info!(event_id = %event.id, title = %event.title, "event created");
    let created = queries::get_event(&pool, &event.id)
        .await?
        .ok_or_else(|| AppError::UnknownEvent(event.id.clone()))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_events(State(pool): State<Pool>) -> Result<Json<Vec<Event>>, AppError> {
    Ok(Json(queries::list_events(&pool).await?))
}

pub async fn get_event(
    State(pool): State<Pool>,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, AppError> {
    queries::get_event(&pool, &event_id)
        .await?
        .map(Json)
        .ok_or(AppError::UnknownEvent(event_id))
}

pub async fn update_event(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Path(event_id): Path<String>,
    Json(payload): Json<EventUpdate>,
) -> Result<Json<Message>, AppError> {
    if !queries::update_event(&pool, &event_id, &payload).await? {
        return Err(AppError::UnknownEvent(event_id));
    }
    Ok(Json(Message {
        message: "Event updated.".to_owned(),
    }))
}

/// Deleting an event cascades to its roster but is blocked while
/// registrations exist; those are permanent records.
pub async fn delete_event(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Path(event_id): Path<String>,
) -> Result<Json<Message>, AppError> {
    // fail-fast courtesy; the registrations foreign key inside
    // queries::delete_event is the authoritative guard
    if queries::has_registrations(&pool, &event_id).await? {
        return Err(AppError::EventHasRegistrations(event_id));
    }
    let outcome = queries::delete_event(&pool, &event_id).await?;
    delete_response(outcome, event_id)
}

fn delete_response(
    outcome: DeleteEventOutcome,
    event_id: String,
) -> Result<Json<Message>, AppError> {
    match outcome {
        DeleteEventOutcome::Deleted => {
            info!(%event_id, "event deleted");
            Ok(Json(Message {
                message: "Event deleted.".to_owned(),
            }))
        }
        DeleteEventOutcome::Missing => Err(AppError::UnknownEvent(event_id)),
        DeleteEventOutcome::Blocked => Err(AppError::EventHasRegistrations(event_id)),
    }
}
