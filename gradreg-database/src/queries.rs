//! All queries live here so the composite-key access paths and the
//! transactional registration commit are in one place.

use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::warn;

use crate::error::DatabaseError;
use crate::models::{
    EligibleStudent, Event, EventUpdate, NewEligibleStudent, NewEvent, NewRegistration,
    Registration,
};
use crate::schema::{eligible_students, events, registrations};
use crate::Pool;

/// Bounded internal retries for the registration commit; beyond this the
/// caller gets [`DatabaseError::CommitContention`].
const COMMIT_ATTEMPTS: u32 = 3;

/// Outcome of the transactional registration commit.
#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Row inserted and the event counter incremented by one.
    Created,
    /// A registration for this (event, student) pair already existed.
    /// Nothing was written and the counter is untouched.
    Conflict,
}

pub async fn create_event(pool: &Pool, event: &NewEvent) -> Result<(), DatabaseError> {
    let mut connection = pool.get().await?;
    diesel::insert_into(events::table)
        .values(event)
        .execute(&mut connection)
        .await?;
    Ok(())
}

pub async fn list_events(pool: &Pool) -> Result<Vec<Event>, DatabaseError> {
    let mut connection = pool.get().await?;
    Ok(events::table
        .order(events::created_at.desc())
        .select(Event::as_select())
        .load(&mut connection)
        .await?)
}

pub async fn get_event(pool: &Pool, event_id: &str) -> Result<Option<Event>, DatabaseError> {
    let mut connection = pool.get().await?;
    Ok(events::table
        .find(event_id)
        .select(Event::as_select())
        .first(&mut connection)
        .await
        .optional()?)
}

/// Returns false when no event with this id exists.
pub async fn update_event(
    pool: &Pool,
    event_id: &str,
    update: &EventUpdate,
) -> Result<bool, DatabaseError> {
    let mut connection = pool.get().await?;
    let updated = diesel::update(events::table.find(event_id))
        .set(update)
        .execute(&mut connection)
        .await?;
    Ok(updated == 1)
}

pub async fn has_registrations(pool: &Pool, event_id: &str) -> Result<bool, DatabaseError> {
    let mut connection = pool.get().await?;
    let count: i64 = registrations::table
        .filter(registrations::event_id.eq(event_id))
        .count()
        .get_result(&mut connection)
        .await?;
    Ok(count > 0)
}

/// Result of an event delete attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteEventOutcome {
    Deleted,
    /// No event with this id.
    Missing,
    /// The registrations foreign key blocked the delete; a registration
    /// exists (possibly committed after any pre-check the caller did).
    Blocked,
}

/// Deletes the event; the roster cascades via its foreign key, registrations
/// do not. Their foreign key is the authoritative guard, so a registration
/// committed between a [`has_registrations`] pre-check and the delete still
/// comes back as [`DeleteEventOutcome::Blocked`] rather than an error.
pub async fn delete_event(
    pool: &Pool,
    event_id: &str,
) -> Result<DeleteEventOutcome, DatabaseError> {
    let mut connection = pool.get().await?;
    match diesel::delete(events::table.find(event_id))
        .execute(&mut connection)
        .await
    {
        Ok(0) => Ok(DeleteEventOutcome::Missing),
        Ok(_) => Ok(DeleteEventOutcome::Deleted),
        Err(diesel::result::Error::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            _,
        )) => Ok(DeleteEventOutcome::Blocked),
        Err(err) => Err(err.into()),
    }
}

/// Upserts the uploaded roster rows and records the upload size as the
/// event's eligible count, in one transaction.
pub async fn upsert_roster(
    pool: &Pool,
    event_id: &str,
    rows: &[NewEligibleStudent],
) -> Result<usize, DatabaseError> {
    let mut connection = pool.get().await?;
    connection
        .transaction::<_, diesel::result::Error, _>(|connection| {
            async move {
                if rows.is_empty() {
                    diesel::update(events::table.find(event_id))
                        .set(events::eligible_count.eq(0))
                        .execute(connection)
                        .await?;
                    return Ok(());
                }
                diesel::insert_into(eligible_students::table)
                    .values(rows)
                    .on_conflict((eligible_students::event_id, eligible_students::student_id))
                    .do_update()
                    .set((
                        eligible_students::full_name.eq(excluded(eligible_students::full_name)),
                        eligible_students::email.eq(excluded(eligible_students::email)),
                        eligible_students::class_name.eq(excluded(eligible_students::class_name)),
                        eligible_students::major.eq(excluded(eligible_students::major)),
                        eligible_students::honors.eq(excluded(eligible_students::honors)),
                    ))
                    .execute(connection)
                    .await?;
                diesel::update(events::table.find(event_id))
                    .set(events::eligible_count.eq(i32::try_from(rows.len()).unwrap_or(i32::MAX)))
                    .execute(connection)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
    Ok(rows.len())
}

pub async fn add_eligible_student(
    pool: &Pool,
    student: &NewEligibleStudent,
) -> Result<(), DatabaseError> {
    let mut connection = pool.get().await?;
    diesel::insert_into(eligible_students::table)
        .values(student)
        .on_conflict((eligible_students::event_id, eligible_students::student_id))
        .do_update()
        .set((
            eligible_students::full_name.eq(excluded(eligible_students::full_name)),
            eligible_students::email.eq(excluded(eligible_students::email)),
            eligible_students::class_name.eq(excluded(eligible_students::class_name)),
            eligible_students::major.eq(excluded(eligible_students::major)),
            eligible_students::honors.eq(excluded(eligible_students::honors)),
        ))
        .execute(&mut connection)
        .await?;
    Ok(())
}

pub async fn delete_eligible_student(
    pool: &Pool,
    event_id: &str,
    student_id: &str,
) -> Result<bool, DatabaseError> {
    let mut connection = pool.get().await?;
    let deleted = diesel::delete(eligible_students::table.find((event_id, student_id)))
        .execute(&mut connection)
        .await?;
    Ok(deleted == 1)
}

pub async fn list_eligible_students(
    pool: &Pool,
    event_id: &str,
) -> Result<Vec<EligibleStudent>, DatabaseError> {
    let mut connection = pool.get().await?;
    Ok(eligible_students::table
        .filter(eligible_students::event_id.eq(event_id))
        .order(eligible_students::student_id.asc())
        .select(EligibleStudent::as_select())
        .load(&mut connection)
        .await?)
}

/// Composite-key point lookup. The caller must pass an already normalized
/// student id; this function does not trim or uppercase.
pub async fn get_eligible_student(
    pool: &Pool,
    event_id: &str,
    student_id: &str,
) -> Result<Option<EligibleStudent>, DatabaseError> {
    let mut connection = pool.get().await?;
    Ok(eligible_students::table
        .find((event_id, student_id))
        .select(EligibleStudent::as_select())
        .first(&mut connection)
        .await
        .optional()?)
}

pub async fn get_registration(
    pool: &Pool,
    event_id: &str,
    student_id: &str,
) -> Result<Option<Registration>, DatabaseError> {
    let mut connection = pool.get().await?;
    Ok(registrations::table
        .find((event_id, student_id))
        .select(Registration::as_select())
        .first(&mut connection)
        .await
        .optional()?)
}

pub async fn list_registrations(
    pool: &Pool,
    event_id: &str,
) -> Result<Vec<Registration>, DatabaseError> {
    let mut connection = pool.get().await?;
    Ok(registrations::table
        .filter(registrations::event_id.eq(event_id))
        .order(registrations::registered_at.asc())
        .select(Registration::as_select())
        .load(&mut connection)
        .await?)
}

/// Inserts the registration and increments the event's registered count as
/// one transaction. The insert uses ON CONFLICT DO NOTHING on the composite
/// key, so two concurrent commits for the same pair cannot both insert; the
/// loser sees [`CommitOutcome::Conflict`] and the counter is incremented
/// exactly once.
pub async fn commit_registration(
    pool: &Pool,
    registration: &NewRegistration,
) -> Result<CommitOutcome, DatabaseError> {
    let mut connection = pool.get().await?;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = connection
            .transaction::<CommitOutcome, diesel::result::Error, _>(|connection| {
                async move {
                    let inserted = diesel::insert_into(registrations::table)
                        .values(registration)
                        .on_conflict((registrations::event_id, registrations::student_id))
                        .do_nothing()
                        .execute(connection)
                        .await?;
                    if inserted == 0 {
                        return Ok(CommitOutcome::Conflict);
                    }
                    diesel::update(events::table.find(&registration.event_id))
                        .set(events::registered_count.eq(events::registered_count + 1))
                        .execute(connection)
                        .await?;
                    Ok(CommitOutcome::Created)
                }
                .scope_boxed()
            })
            .await;
        match result {
            Ok(outcome) => return Ok(outcome),
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::SerializationFailure,
                _,
            )) if attempt < COMMIT_ATTEMPTS => {
                warn!(
                    event_id = %registration.event_id,
                    student_id = %registration.student_id,
                    attempt,
                    "registration commit conflicted, retrying"
                );
            }
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::SerializationFailure,
                _,
            )) => return Err(DatabaseError::CommitContention(COMMIT_ATTEMPTS)),
            Err(err) => return Err(err.into()),
        }
    }
}
