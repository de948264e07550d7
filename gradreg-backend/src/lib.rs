pub mod error;
pub mod registration;
pub mod routes;
pub mod session;
pub mod storage;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{delete, get, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use error::AppError;
use gradreg_config::Config;
use gradreg_database::{get_database_connection, Pool};
use gradreg_vision::FaceDetectionClient;
use storage::FsObjectStore;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Every external client is built once at startup and handed to the routes
/// through this state; nothing is instantiated lazily at request time.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub pool: Pool,
    pub key: Key,
    pub config: Arc<Config>,
    pub vision: Arc<FaceDetectionClient>,
    pub storage: Arc<FsObjectStore>,
}

pub fn build_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.config.storage.root);

    let app = Router::new()
        .route("/api/login", post(routes::login::login))
        .route("/api/logout", post(routes::login::logout))
        .route("/api/register", post(routes::register::register))
        .route(
            "/api/validate-photo",
            post(routes::validate_photo::validate_photo),
        )
        .route(
            "/api/events",
            get(routes::events::list_events).post(routes::events::create_event),
        )
        .route(
            "/api/events/:event_id",
            get(routes::events::get_event)
                .put(routes::events::update_event)
                .delete(routes::events::delete_event),
        )
        .route(
            "/api/events/:event_id/students",
            get(routes::students::list_students).post(routes::students::add_student),
        )
        .route(
            "/api/events/:event_id/students/upload",
            post(routes::students::upload_roster),
        )
        .route(
            "/api/events/:event_id/students/:student_id",
            delete(routes::students::delete_student),
        )
        .route(
            "/api/events/:event_id/registrations",
            get(routes::registrations::list_registrations),
        )
        .nest_service("/media", media)
        .with_state(state);

    // layers are in reverse order
    let app = app.layer(CatchPanicLayer::new());
    let app = app.layer(TraceLayer::new_for_http());
    app.layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

pub async fn run_server(config: Config) -> Result<(), AppError> {
    info!("starting up server...");

    let pool = get_database_connection(&config.database_url)?;
    let vision = Arc::new(FaceDetectionClient::new(&config.vision)?);
    let storage = Arc::new(FsObjectStore::new(&config.storage));
    let listen_addr = config.listen_addr.clone();

    let app = build_router(AppState {
        pool,
        key: session::signing_key(&config.auth.cookie_key)?,
        config: Arc::new(config),
        vision,
        storage,
    });

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("listening on {listen_addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[allow(clippy::redundant_pub_crate)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
