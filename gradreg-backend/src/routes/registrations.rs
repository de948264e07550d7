use axum::extract::{Path, State};
use axum::Json;
use gradreg_database::models::Registration;
use gradreg_database::queries;
use gradreg_database::Pool;

use crate::error::AppError;
use crate::session::AdminToken;

/// Registrant list for an event, oldest first. Consumers build their own
/// exports (spreadsheets, barcodes, photo archives) from this.
pub async fn list_registrations(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Registration>>, AppError> {
    Ok(Json(queries::list_registrations(&pool, &event_id).await?))
}
