diesel::table! {
    events (id) {
        #[max_length = 32]
        id -> Varchar,
        #[max_length = 255]
        title -> Varchar,
        #[max_length = 255]
        organizer -> Varchar,
        #[max_length = 255]
        location -> Varchar,
        event_time -> Nullable<Timestamptz>,
        opens_at -> Nullable<Timestamptz>,
        closes_at -> Nullable<Timestamptz>,
        #[max_length = 4096]
        notes -> Varchar,
        #[max_length = 1024]
        cover_image_url -> Nullable<Varchar>,
        eligible_count -> Int4,
        registered_count -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    eligible_students (event_id, student_id) {
        #[max_length = 32]
        event_id -> Varchar,
        #[max_length = 64]
        student_id -> Varchar,
        #[max_length = 255]
        full_name -> Varchar,
        #[max_length = 255]
        email -> Nullable<Varchar>,
        #[max_length = 255]
        class_name -> Nullable<Varchar>,
        #[max_length = 255]
        major -> Nullable<Varchar>,
        #[max_length = 255]
        honors -> Nullable<Varchar>,
    }
}

diesel::table! {
    registrations (event_id, student_id) {
        #[max_length = 32]
        event_id -> Varchar,
        #[max_length = 64]
        student_id -> Varchar,
        #[max_length = 255]
        full_name -> Varchar,
        #[max_length = 255]
        email -> Nullable<Varchar>,
        #[max_length = 255]
        class_name -> Nullable<Varchar>,
        #[max_length = 255]
        major -> Nullable<Varchar>,
        #[max_length = 255]
        honors -> Nullable<Varchar>,
        #[max_length = 1024]
        photo_url -> Varchar,
        registered_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(eligible_students -> events (event_id));
diesel::joinable!(registrations -> events (event_id));

diesel::allow_tables_to_appear_in_same_query!(events, eligible_students, registrations);
