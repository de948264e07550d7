use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{eligible_students, events, registrations};

/// One graduation ceremony registration window.
#[derive(Queryable, Selectable, Serialize, Clone, Debug)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub organizer: String,
    pub location: String,
    pub event_time: Option<DateTime<Utc>>,
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub cover_image_url: Option<String>,
    pub eligible_count: i32,
    pub registered_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub id: String,
    pub title: String,
    pub organizer: String,
    pub location: String,
    pub event_time: Option<DateTime<Utc>>,
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub cover_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Administrator edits. Counters and the creation timestamp are not editable.
#[derive(AsChangeset, Deserialize, Debug)]
#[diesel(table_name = events)]
#[diesel(treat_none_as_null = true)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub title: String,
    pub organizer: String,
    pub location: String,
    pub event_time: Option<DateTime<Utc>>,
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub cover_image_url: Option<String>,
}

/// One roster entry scoping a student to an event.
#[derive(Queryable, Selectable, Serialize, Clone, Debug)]
#[diesel(table_name = eligible_students)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct EligibleStudent {
    pub event_id: String,
    pub student_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub honors: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = eligible_students)]
pub struct NewEligibleStudent {
    pub event_id: String,
    pub student_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub honors: Option<String>,
}

/// A confirmed attendance record. Roster fields are copied in at registration
/// time; later roster edits do not flow back into existing registrations.
#[derive(Queryable, Selectable, Serialize, Clone, Debug)]
#[diesel(table_name = registrations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub event_id: String,
    pub student_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub honors: Option<String>,
    pub photo_url: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = registrations)]
pub struct NewRegistration {
    pub event_id: String,
    pub student_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub honors: Option<String>,
    pub photo_url: String,
    pub registered_at: DateTime<Utc>,
}
