//! The registration admission pipeline.
//!
//! A registration request walks six stages in a fixed order: session guard
//! (done by the route, which hands the resolved identity in), identity
//! binding, roster lookup, duplicate guard, photo admission check, durable
//! commit. Every stage talks to its collaborator through a trait so the
//! pipeline runs against substitutes in tests; production wires in the
//! database pool, the filesystem store and the face-detection client.

use axum::async_trait;
use chrono::Utc;
use gradreg_database::models::{EligibleStudent, NewRegistration, Registration};
use gradreg_database::queries::{self, CommitOutcome};
use gradreg_database::Pool;
use gradreg_vision::{FaceDetectionClient, PhotoClassification};
use tracing::{info, warn};

use crate::error::AppError;
use crate::storage::{photo_object_path, ObjectStore};

/// Student ids are stored and looked up in exactly one form.
#[must_use]
pub fn normalize_student_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Identity binding policy: the local part of the session email must contain
/// the student id, case-insensitively. Institutional addresses embed the id
/// with extra characters (program codes and the like), so this is a
/// substring check, not equality. The same policy applies on every path that
/// accepts a student id.
#[must_use]
pub fn identity_binds(identity: &str, student_id: &str) -> bool {
    let local_part = identity.split('@').next().unwrap_or(identity);
    local_part
        .to_uppercase()
        .contains(&student_id.to_uppercase())
}

#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn eligible_student(
        &self,
        event_id: &str,
        student_id: &str,
    ) -> Result<Option<EligibleStudent>, AppError>;
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn existing(
        &self,
        event_id: &str,
        student_id: &str,
    ) -> Result<Option<Registration>, AppError>;

    /// Must insert the record and increment the event counter atomically,
    /// and report a conflict instead of inserting twice.
    async fn commit(&self, registration: NewRegistration) -> Result<CommitOutcome, AppError>;
}

#[async_trait]
pub trait FaceCheck: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<PhotoClassification, AppError>;
}

/// The injected collaborators, constructed once at startup.
pub struct Pipeline<'a> {
    pub roster: &'a dyn RosterStore,
    pub registrations: &'a dyn RegistrationStore,
    pub storage: &'a dyn ObjectStore,
    pub faces: &'a dyn FaceCheck,
}

/// What a successful admission hands back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub student_id: String,
    pub full_name: String,
    pub photo_url: String,
}

/// Runs stages 2-6 for an already authenticated identity. Any failing stage
/// short-circuits; nothing before the durable commit mutates state.
pub async fn register(
    pipeline: &Pipeline<'_>,
    identity: &str,
    event_id: &str,
    student_id: &str,
    photo: &[u8],
) -> Result<RegistrationReceipt, AppError> {
    let student_id = normalize_student_id(student_id);

    if !identity_binds(identity, &student_id) {
        warn!(identity, student_id, "student id not bound to identity");
        return Err(AppError::IdentityMismatch {
            identity: identity.to_owned(),
            student_id,
        });
    }

    let Some(roster_entry) = pipeline
        .roster
        .eligible_student(event_id, &student_id)
        .await?
    else {
        return Err(AppError::NotEligible {
            event_id: event_id.to_owned(),
            student_id,
        });
    };

    // fail fast on duplicates before spending a face-detection call; the
    // authoritative guard is the conflict check inside commit
    if pipeline
        .registrations
        .existing(event_id, &student_id)
        .await?
        .is_some()
    {
        return Err(AppError::AlreadyRegistered);
    }

    match pipeline.faces.classify(photo).await? {
        PhotoClassification::ExactlyOneFace => {}
        PhotoClassification::NoFace => return Err(AppError::NoFaceDetected),
        PhotoClassification::MultipleFaces(count) => {
            return Err(AppError::MultipleFacesDetected(count));
        }
    }

    // the upload sits outside the transaction on purpose: the stable path
    // means a failed commit leaves at worst an orphan that the retry
    // overwrites
    let path = photo_object_path(event_id, &student_id);
    let photo_url = pipeline.storage.put(&path, photo).await?;

    let registration = NewRegistration {
        event_id: event_id.to_owned(),
        student_id: student_id.clone(),
        full_name: roster_entry.full_name.clone(),
        email: roster_entry.email,
        class_name: roster_entry.class_name,
        major: roster_entry.major,
        honors: roster_entry.honors,
        photo_url: photo_url.clone(),
        registered_at: Utc::now(),
    };

    match pipeline.registrations.commit(registration).await? {
        CommitOutcome::Created => {
            info!(event_id, student_id, "registration created");
            Ok(RegistrationReceipt {
                student_id,
                full_name: roster_entry.full_name,
                photo_url,
            })
        }
        // a concurrent request won the race between the duplicate guard and
        // the commit
        CommitOutcome::Conflict => Err(AppError::AlreadyRegistered),
    }
}

#[async_trait]
impl RosterStore for Pool {
    async fn eligible_student(
        &self,
        event_id: &str,
        student_id: &str,
    ) -> Result<Option<EligibleStudent>, AppError> {
        Ok(queries::get_eligible_student(self, event_id, student_id).await?)
    }
}

#[async_trait]
impl RegistrationStore for Pool {
    async fn existing(
        &self,
        event_id: &str,
        student_id: &str,
    ) -> Result<Option<Registration>, AppError> {
        Ok(queries::get_registration(self, event_id, student_id).await?)
    }

    async fn commit(&self, registration: NewRegistration) -> Result<CommitOutcome, AppError> {
        Ok(queries::commit_registration(self, &registration).await?)
    }
}

#[async_trait]
impl FaceCheck for FaceDetectionClient {
    async fn classify(&self, image: &[u8]) -> Result<PhotoClassification, AppError> {
        self.classify_photo(image).await.map_err(|err| {
            warn!("face detection unavailable: {err}");
            AppError::PhotoCheckUnavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::async_trait;
    use gradreg_database::models::{EligibleStudent, NewRegistration, Registration};
    use gradreg_database::queries::CommitOutcome;
    use gradreg_vision::{classify, PhotoClassification};

    use crate::error::AppError;
    use crate::registration::{
        identity_binds, normalize_student_id, register, FaceCheck, Pipeline, RegistrationStore,
        RosterStore,
    };
    use crate::storage::ObjectStore;

    const EVENT: &str = "E1";
    const STUDENT: &str = "B1234567";
    const IDENTITY: &str = "b1234567@student.example.edu";

    struct FakeRoster(HashMap<(String, String), EligibleStudent>);

    impl FakeRoster {
        fn with_student(event_id: &str, student_id: &str) -> Self {
            let entry = EligibleStudent {
                event_id: event_id.to_owned(),
                student_id: student_id.to_owned(),
                full_name: "Tran Thi B".to_owned(),
                email: Some(IDENTITY.to_owned()),
                class_name: Some("DI19V7A1".to_owned()),
                major: Some("Computer Science".to_owned()),
                honors: None,
            };
            Self(HashMap::from([(
                (event_id.to_owned(), student_id.to_owned()),
                entry,
            )]))
        }
    }

    #[async_trait]
    impl RosterStore for FakeRoster {
        async fn eligible_student(
            &self,
            event_id: &str,
            student_id: &str,
        ) -> Result<Option<EligibleStudent>, AppError> {
            Ok(self
                .0
                .get(&(event_id.to_owned(), student_id.to_owned()))
                .cloned())
        }
    }

    #[derive(Default)]
    struct FakeRegistrations {
        records: Mutex<HashMap<(String, String), Registration>>,
        counters: Mutex<HashMap<String, i32>>,
        /// Simulates a concurrent winner between the duplicate guard's read
        /// and the commit.
        conflict_on_commit: bool,
    }

    impl FakeRegistrations {
        fn counter(&self, event_id: &str) -> i32 {
            *self.counters.lock().unwrap().get(event_id).unwrap_or(&0)
        }

        fn record_count(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RegistrationStore for FakeRegistrations {
        async fn existing(
            &self,
            event_id: &str,
            student_id: &str,
        ) -> Result<Option<Registration>, AppError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(event_id.to_owned(), student_id.to_owned()))
                .cloned())
        }

        async fn commit(&self, new: NewRegistration) -> Result<CommitOutcome, AppError> {
            if self.conflict_on_commit {
                return Ok(CommitOutcome::Conflict);
            }
            let key = (new.event_id.clone(), new.student_id.clone());
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&key) {
                return Ok(CommitOutcome::Conflict);
            }
            records.insert(
                key,
                Registration {
                    event_id: new.event_id.clone(),
                    student_id: new.student_id,
                    full_name: new.full_name,
                    email: new.email,
                    class_name: new.class_name,
                    major: new.major,
                    honors: new.honors,
                    photo_url: new.photo_url,
                    registered_at: new.registered_at,
                    updated_at: None,
                },
            );
            *self.counters.lock().unwrap().entry(new.event_id).or_insert(0) += 1;
            Ok(CommitOutcome::Created)
        }
    }

    #[derive(Default)]
    struct FakeStorage {
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for FakeStorage {
        async fn put(&self, path: &str, _bytes: &[u8]) -> Result<String, AppError> {
            self.uploads.lock().unwrap().push(path.to_owned());
            Ok(format!("http://media.test/{path}"))
        }
    }

    struct FakeFaces {
        face_count: usize,
        calls: AtomicUsize,
    }

    impl FakeFaces {
        const fn seeing(face_count: usize) -> Self {
            Self {
                face_count,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FaceCheck for FakeFaces {
        async fn classify(&self, _image: &[u8]) -> Result<PhotoClassification, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(classify(self.face_count))
        }
    }

    struct FacesDown;

    #[async_trait]
    impl FaceCheck for FacesDown {
        async fn classify(&self, _image: &[u8]) -> Result<PhotoClassification, AppError> {
            Err(AppError::PhotoCheckUnavailable)
        }
    }

    fn pipeline<'a>(
        roster: &'a FakeRoster,
        registrations: &'a FakeRegistrations,
        storage: &'a FakeStorage,
        faces: &'a dyn FaceCheck,
    ) -> Pipeline<'a> {
        Pipeline {
            roster,
            registrations,
            storage,
            faces,
        }
    }

    #[test]
    fn student_ids_are_trimmed_and_uppercased() {
        assert_eq!(normalize_student_id("  b1234567 "), "B1234567");
        assert_eq!(normalize_student_id("B1234567"), "B1234567");
    }

    #[test]
    fn identity_binding_is_a_case_insensitive_substring_check() {
        assert!(identity_binds("b1234567@student.example.edu", "B1234567"));
        // program code wrapped around the id
        assert!(identity_binds("csb1234567x@student.example.edu", "B1234567"));
        assert!(!identity_binds("b7654321@student.example.edu", "B1234567"));
        // the domain must not satisfy the check
        assert!(!identity_binds("someone@b1234567.example.edu", "B1234567"));
    }

    #[tokio::test]
    async fn valid_registration_is_created_and_counted_once() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(1);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        let receipt = register(&deps, IDENTITY, EVENT, STUDENT, b"jpeg")
            .await
            .unwrap();
        assert_eq!(receipt.student_id, STUDENT);
        assert_eq!(
            receipt.photo_url,
            "http://media.test/registrations/E1/B1234567.jpg"
        );
        assert_eq!(registrations.record_count(), 1);
        assert_eq!(registrations.counter(EVENT), 1);
    }

    #[tokio::test]
    async fn lowercase_and_padded_input_registers_the_same_student() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(1);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        let receipt = register(&deps, IDENTITY, EVENT, " b1234567 ", b"jpeg")
            .await
            .unwrap();
        assert_eq!(receipt.student_id, STUDENT);
    }

    #[tokio::test]
    async fn second_attempt_is_hard_blocked_and_counter_unchanged() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(1);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        register(&deps, IDENTITY, EVENT, STUDENT, b"jpeg")
            .await
            .unwrap();
        let second = register(&deps, IDENTITY, EVENT, STUDENT, b"jpeg").await;
        assert!(matches!(second, Err(AppError::AlreadyRegistered)));
        assert_eq!(registrations.record_count(), 1);
        assert_eq!(registrations.counter(EVENT), 1);
    }

    #[tokio::test]
    async fn commit_race_loser_gets_already_registered() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations {
            conflict_on_commit: true,
            ..FakeRegistrations::default()
        };
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(1);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        let result = register(&deps, IDENTITY, EVENT, STUDENT, b"jpeg").await;
        assert!(matches!(result, Err(AppError::AlreadyRegistered)));
        assert_eq!(registrations.counter(EVENT), 0);
    }

    #[tokio::test]
    async fn zero_faces_rejects_without_any_write() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(0);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        let result = register(&deps, IDENTITY, EVENT, STUDENT, b"jpeg").await;
        assert!(matches!(result, Err(AppError::NoFaceDetected)));
        assert_eq!(registrations.record_count(), 0);
        assert_eq!(registrations.counter(EVENT), 0);
        assert!(storage.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_photo_rejects_without_any_write() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(2);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        let result = register(&deps, IDENTITY, EVENT, STUDENT, b"jpeg").await;
        assert!(matches!(result, Err(AppError::MultipleFacesDetected(2))));
        assert_eq!(registrations.counter(EVENT), 0);
        assert!(storage.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ineligible_student_is_rejected_before_the_face_check() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(1);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        let result = register(
            &deps,
            "b9999999@student.example.edu",
            EVENT,
            "B9999999",
            b"jpeg",
        )
        .await;
        assert!(matches!(result, Err(AppError::NotEligible { .. })));
        // stage ordering: eligibility before photo validation
        assert_eq!(faces.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(storage.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_student_id_is_a_mismatch_before_roster_lookup() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let faces = FakeFaces::seeing(1);
        let deps = pipeline(&roster, &registrations, &storage, &faces);

        let result = register(
            &deps,
            "b7654321@student.example.edu",
            EVENT,
            STUDENT,
            b"jpeg",
        )
        .await;
        assert!(matches!(result, Err(AppError::IdentityMismatch { .. })));
        assert_eq!(registrations.record_count(), 0);
    }

    #[tokio::test]
    async fn face_service_outage_is_retryable_not_a_face_verdict() {
        let roster = FakeRoster::with_student(EVENT, STUDENT);
        let registrations = FakeRegistrations::default();
        let storage = FakeStorage::default();
        let deps = pipeline(&roster, &registrations, &storage, &FacesDown);

        let result = register(&deps, IDENTITY, EVENT, STUDENT, b"jpeg").await;
        assert!(matches!(result, Err(AppError::PhotoCheckUnavailable)));
        assert_eq!(registrations.record_count(), 0);
    }
}
