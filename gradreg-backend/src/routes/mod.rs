pub mod events;
pub mod login;
pub mod register;
pub mod registrations;
pub mod students;
pub mod validate_photo;

use serde::Serialize;

/// Uniform `{"message": ...}` body for calls that only confirm an action.
#[derive(Serialize)]
pub struct Message {
    pub message: String,
}
