use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gradreg_database::error::DatabaseError;
use gradreg_vision::VisionError;
use serde::Serialize;
use tracing::error;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("You need to be signed in before registering.")]
    Unauthenticated,
    #[error("Student id {student_id} does not belong to the signed-in account {identity}.")]
    IdentityMismatch {
        identity: String,
        student_id: String,
    },
    #[error("Student id {student_id} is not on the graduation roster for event {event_id}.")]
    NotEligible {
        event_id: String,
        student_id: String,
    },
    #[error("This student is already registered for this event.")]
    AlreadyRegistered,
    #[error("No face was detected in the photo. Upload a clear portrait and try again.")]
    NoFaceDetected,
    #[error("The photo contains {0} faces. Upload a portrait showing only yourself.")]
    MultipleFacesDetected(usize),
    #[error("The photo check is temporarily unavailable. Please try again in a moment.")]
    PhotoCheckUnavailable,
    #[error("Storing the photo failed. Please try again.")]
    Storage(#[source] std::io::Error),
    #[error("The registration could not be committed. Please try again.")]
    CommitFailed,
    #[error("Only {0} accounts can sign in here.")]
    EmailDomainNotAllowed(String),
    #[error("Admin token missing or wrong.")]
    AdminForbidden,
    #[error("The configured cookie signing key is shorter than 32 bytes.")]
    WeakCookieKey,
    #[error("No event with id {0}.")]
    UnknownEvent(String),
    #[error("Event {0} already has registrations and cannot be deleted.")]
    EventHasRegistrations(String),
    #[error("No roster entry {student_id} for event {event_id}.")]
    UnknownRosterEntry {
        event_id: String,
        student_id: String,
    },
    #[error("Missing field {0}.")]
    MissingField(&'static str),
    #[error("form upload error: {0}")]
    Multipart(#[from] MultipartError),
    #[error("roster file error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    File(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(DatabaseError),
    #[error("face detection client error: {0}")]
    Vision(#[from] VisionError),
}

impl From<DatabaseError> for AppError {
    fn from(value: DatabaseError) -> Self {
        match value {
            // bounded internal retries were already spent; the whole request
            // is safe to resubmit thanks to the stable photo path
            DatabaseError::CommitContention(_) => Self::CommitFailed,
            other => Self::Database(other),
        }
    }
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::IdentityMismatch { .. }
            | Self::EmailDomainNotAllowed(_)
            | Self::AdminForbidden => StatusCode::FORBIDDEN,
            Self::NotEligible { .. } | Self::UnknownEvent(_) | Self::UnknownRosterEntry { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::AlreadyRegistered | Self::EventHasRegistrations(_) => StatusCode::CONFLICT,
            Self::NoFaceDetected
            | Self::MultipleFacesDetected(_)
            | Self::MissingField(_)
            | Self::Multipart(_)
            | Self::Csv(_) => StatusCode::BAD_REQUEST,
            Self::PhotoCheckUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_)
            | Self::CommitFailed
            | Self::WeakCookieKey
            | Self::File(_)
            | Self::Database(_)
            | Self::Vision(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::error::AppError;

    #[test]
    fn rejections_map_to_distinct_statuses() {
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::IdentityMismatch {
                identity: "a@b".into(),
                student_id: "B1".into()
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotEligible {
                event_id: "E1".into(),
                student_id: "B9999999".into()
            }
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::AlreadyRegistered.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::NoFaceDetected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MultipleFacesDetected(2).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PhotoCheckUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::CommitFailed.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn wrong_admin_token_is_forbidden_not_unauthenticated() {
        assert_eq!(AppError::AdminForbidden.status(), StatusCode::FORBIDDEN);
        assert_ne!(
            AppError::AdminForbidden.status(),
            AppError::Unauthenticated.status()
        );
    }

    #[test]
    fn no_face_and_multiple_faces_read_differently() {
        // the user has to be able to tell the two corrections apart
        assert_ne!(
            AppError::NoFaceDetected.to_string(),
            AppError::MultipleFacesDetected(2).to_string()
        );
    }
}
