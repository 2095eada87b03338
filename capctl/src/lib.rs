//! # capctl: training course and enrollment management
//!
//! `capctl` runs the enrollment portal of a dealer network's training program. Administrators
//! publish courses ("capacitaciones"), schedule groups ("grupos") with session days and a seat
//! limit, and maintain the dealer ("concesionarios") and mechanic ("mecanicos") directories.
//! Dealer staff enroll through a public form; every enrollment ("inscripción") reserves one seat
//! and triggers a confirmation email.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses PostgreSQL for persistence.
//!
//! - The **API layer** ([`api`]) exposes a JSON interface. Catalog routes serve both the public
//!   and administrators; management routes require a session and a role permission.
//! - The **authentication layer** ([`auth`]) issues signed session tokens at login and resolves
//!   the caller from a cookie or bearer header.
//! - The **database layer** ([`db`]) uses the repository pattern; repositories borrow a
//!   connection so callers choose transaction boundaries.
//! - The **enrollment workflow** ([`enrollment`]) enforces group capacity under a row lock and
//!   hands the confirmation email to a background task.
//! - **Exports** ([`export`]) render filtered enrollment listings as CSV or XLSX.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use capctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = capctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     capctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Migrations run automatically at startup; they can also be applied directly:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! capctl::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod enrollment;
pub mod errors;
pub mod export;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::{
    api::models::users::Role,
    auth::password,
    config::CorsOrigin,
    db::handlers::{Repository, Users},
    db::models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    email::EmailService,
    openapi::ApiDoc,
};
use axum::http::HeaderValue;
use axum::{
    Router,
    http::{self, HeaderName},
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{CourseId, DealerId, EnrollmentId, GroupId, MechanicId, UserId};

/// Application state shared across all request handlers.
///
/// - `db`: PostgreSQL connection pool
/// - `config`: configuration loaded from file and environment
/// - `email`: outgoing mail for enrollment confirmations
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .email(Arc::new(EmailService::new(&config)?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub email: Arc<EmailService>,
}

/// Get the capctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Ensure the configured super admin exists and can log in.
///
/// Without a password nothing is done. An existing account gets the new password and the
/// `SuperAdmin` role added to its roles; otherwise the account is created.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> anyhow::Result<Option<UserId>> {
    let Some(password) = password else {
        debug!("No admin password configured; skipping initial admin user");
        return Ok(None);
    };
    let password_hash = password::hash_password(password.to_string()).await?;

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    let user_id = if let Some(existing) = user_repo.get_user_by_email(email).await? {
        let mut roles = existing.roles.clone();
        if !roles.contains(&Role::SuperAdmin) {
            roles.push(Role::SuperAdmin);
        }
        user_repo
            .update(
                existing.id,
                &UserUpdateDBRequest {
                    display_name: None,
                    roles: Some(roles),
                    password_hash: Some(password_hash),
                },
            )
            .await?;
        existing.id
    } else {
        let created = user_repo
            .create(&UserCreateDBRequest {
                email: email.to_string(),
                display_name: None,
                password_hash: Some(password_hash),
                roles: vec![Role::SuperAdmin],
            })
            .await?;
        info!(email, "Created initial admin user");
        created.id
    };

    tx.commit().await?;
    Ok(Some(user_id))
}

async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let seconds = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(seconds(settings.idle_timeout_secs))
        .max_lifetime(seconds(settings.max_lifetime_secs))
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let mut origins = Vec::new();
    for origin in &cors_config.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut exposed = vec![http::header::LOCATION];
    for name in &cors_config.exposed_headers {
        exposed.push(name.parse::<HeaderName>()?);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(exposed);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: auth, catalog, management and report routes, the OpenAPI UI,
/// CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{auth, courses, dealers, enrollments, groups, mechanics, reports, users};

    let auth_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::get_current_user));

    let api_routes = Router::new()
        .route(
            "/capacitaciones",
            get(courses::list_courses).post(courses::create_course),
        )
        .route(
            "/capacitaciones/{id}",
            get(courses::get_course)
                .patch(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/capacitaciones/{id}/export/csv", get(courses::export_course_csv))
        .route("/grupos", get(groups::list_groups).post(groups::create_group))
        .route(
            "/grupos/{id}",
            get(groups::get_group).patch(groups::update_group).delete(groups::delete_group),
        )
        .route(
            "/inscripciones",
            get(enrollments::list_enrollments).post(enrollments::create_enrollment),
        )
        .route("/inscripciones/export/csv", get(enrollments::export_enrollments_csv))
        .route("/inscripciones/export/xlsx", get(enrollments::export_enrollments_xlsx))
        .route(
            "/inscripciones/{id}",
            get(enrollments::get_enrollment)
                .patch(enrollments::update_enrollment)
                .delete(enrollments::delete_enrollment),
        )
        .route(
            "/concesionarios",
            get(dealers::list_dealers).post(dealers::create_dealer),
        )
        .route(
            "/concesionarios/{id}",
            get(dealers::get_dealer).patch(dealers::update_dealer).delete(dealers::delete_dealer),
        )
        .route(
            "/mecanicos",
            get(mechanics::list_mechanics).post(mechanics::create_mechanic),
        )
        .route(
            "/mecanicos/{id}",
            get(mechanics::get_mechanic)
                .patch(mechanics::update_mechanic)
                .delete(mechanics::delete_mechanic),
        )
        .route("/dashboard", get(reports::get_dashboard))
        .route("/usuarios", get(users::list_users))
        .route(
            "/usuarios/{id}",
            get(users::get_user).patch(users::update_user).delete(users::delete_user),
        );

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .merge(api_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(create_cors_layer(&state.config)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Connect to the database, run migrations and build the router
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting capctl with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        Self::new_with_pool(config, pool).await
    }

    /// Build the application on an existing, already migrated pool
    pub async fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {e}"))?;

        let email = EmailService::new(&config)?;
        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .email(Arc::new(email))
            .build();

        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "capctl listening on http://{}, available at {}",
            bind_addr, self.config.public_url
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::create_initial_admin_user;
    use crate::{
        api::models::users::Role,
        auth::password,
        db::handlers::Users,
        test_utils::{create_test_app, create_test_user},
    };
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_initial_admin_is_created_once(pool: PgPool) {
        let first = create_initial_admin_user("root@example.com", Some("s3cret-pass"), &pool)
            .await
            .unwrap()
            .unwrap();
        let second = create_initial_admin_user("root@example.com", Some("other-pass"), &pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_user_by_email("root@example.com").await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::SuperAdmin]);
        assert!(password::verify_string("other-pass", user.password_hash.as_deref().unwrap()).unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_initial_admin_promotes_existing_account(pool: PgPool) {
        create_test_user(&pool, "ops@example.com", vec![Role::ReportViewer]).await;

        create_initial_admin_user("ops@example.com", Some("s3cret-pass"), &pool)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_user_by_email("ops@example.com").await.unwrap().unwrap();
        assert!(user.roles.contains(&Role::SuperAdmin));
        assert!(user.roles.contains(&Role::ReportViewer));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_no_password_means_no_admin(pool: PgPool) {
        assert!(create_initial_admin_user("root@example.com", None, &pool).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_healthz_and_docs(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");

        server.get("/docs").await.assert_status_ok();
    }
}
