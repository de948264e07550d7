use std::collections::BTreeMap;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use gradreg_database::models::{EligibleStudent, NewEligibleStudent};
use gradreg_database::queries;
use gradreg_database::Pool;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::registration::normalize_student_id;
use crate::routes::Message;
use crate::session::AdminToken;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPayload {
    pub student_id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub honors: Option<String>,
}

pub async fn list_students(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<EligibleStudent>>, AppError> {
    Ok(Json(queries::list_eligible_students(&pool, &event_id).await?))
}

pub async fn add_student(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Path(event_id): Path<String>,
    Json(payload): Json<StudentPayload>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let student_id = normalize_student_id(&payload.student_id);
    if student_id.is_empty() {
        return Err(AppError::MissingField("studentId"));
    }
    if queries::get_event(&pool, &event_id).await?.is_none() {
        return Err(AppError::UnknownEvent(event_id));
    }
    queries::add_eligible_student(
        &pool,
        &NewEligibleStudent {
            event_id,
            student_id,
            full_name: payload.full_name,
            email: payload.email,
            class_name: payload.class_name,
            major: payload.major,
            honors: payload.honors,
        },
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(Message {
            message: "Student added to the roster.".to_owned(),
        }),
    ))
}

pub async fn delete_student(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Path((event_id, student_id)): Path<(String, String)>,
) -> Result<Json<Message>, AppError> {
    let student_id = normalize_student_id(&student_id);
    if !queries::delete_eligible_student(&pool, &event_id, &student_id).await? {
        return Err(AppError::UnknownRosterEntry {
            event_id,
            student_id,
        });
    }
    Ok(Json(Message {
        message: "Student removed from the roster.".to_owned(),
    }))
}

/// `POST /api/events/{id}/students/upload`: multipart `file` holding a CSV
/// with a `student_id,full_name,email,class_name,major,honors` header row.
/// Rows are upserted; the upload size becomes the event's eligible count.
pub async fn upload_roster(
    _admin: AdminToken,
    State(pool): State<Pool>,
    Path(event_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Message>, AppError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            file = Some(field.bytes().await?);
        }
    }
    let file = file.ok_or(AppError::MissingField("file"))?;

    if queries::get_event(&pool, &event_id).await?.is_none() {
        return Err(AppError::UnknownEvent(event_id));
    }

    let rows = parse_roster_csv(&file, &event_id)?;
    let uploaded = queries::upsert_roster(&pool, &event_id, &rows).await?;
    info!(%event_id, uploaded, "roster uploaded");
    Ok(Json(Message {
        message: format!("Uploaded {uploaded} students."),
    }))
}

#[derive(Deserialize)]
struct RosterRow {
    #[serde(default)]
    student_id: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    major: Option<String>,
    #[serde(default)]
    honors: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// Rows without a student id are skipped; duplicate ids within one file keep
/// the last occurrence so the batch upsert never touches a key twice.
fn parse_roster_csv(
    bytes: &[u8],
    event_id: &str,
) -> Result<Vec<NewEligibleStudent>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut by_id = BTreeMap::new();
    for row in reader.deserialize::<RosterRow>() {
        let row = row?;
        let student_id = normalize_student_id(&row.student_id);
        if student_id.is_empty() {
            continue;
        }
        by_id.insert(
            student_id.clone(),
            NewEligibleStudent {
                event_id: event_id.to_owned(),
                student_id,
                full_name: row.full_name,
                email: blank_to_none(row.email),
                class_name: blank_to_none(row.class_name),
                major: blank_to_none(row.major),
                honors: blank_to_none(row.honors),
            },
        );
    }
    Ok(by_id.into_values().collect())
}

#[cfg(test)]
mod tests {
    use crate::routes::students::parse_roster_csv;

    #[test]
    fn rows_are_normalized_and_blank_ids_skipped() {
        let csv = b"student_id,full_name,email,class_name,major,honors\n\
            \x20 b1234567 ,Tran Thi B,b1234567@student.example.edu,DI19V7A1,Computer Science,\n\
            ,Nobody,,,,\n\
            B7654321,Le Van C,,,Economics,Distinction\n";
        let rows = parse_roster_csv(csv, "E1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].student_id, "B1234567");
        assert_eq!(rows[0].email.as_deref(), Some("b1234567@student.example.edu"));
        assert_eq!(rows[0].honors, None);
        assert_eq!(rows[1].student_id, "B7654321");
        assert_eq!(rows[1].honors.as_deref(), Some("Distinction"));
    }

    #[test]
    fn duplicate_ids_keep_the_last_row() {
        let csv = b"student_id,full_name,email,class_name,major,honors\n\
            B1234567,Old Name,,,,\n\
            b1234567,New Name,,,,\n";
        let rows = parse_roster_csv(csv, "E1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name, "New Name");
    }

    #[test]
    fn malformed_csv_is_an_error() {
        let csv = b"student_id,full_name\n\"unterminated,";
        assert!(parse_roster_csv(csv, "E1").is_err());
    }
}
