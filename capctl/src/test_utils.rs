//! Test utilities for integration testing (available with `test-utils` feature).

use crate::api::models::{
    courses::CourseVisibility,
    groups::GroupState,
    users::{CurrentUser, Role},
};
use crate::auth::{password, session};
use crate::config::{Config, EmailConfig, EmailTransportConfig, NativeAuthConfig, SessionConfig};
use crate::db::{
    handlers::{Courses, Dealers, Enrollments, Groups, Repository, Users},
    models::{
        courses::{CourseCreateDBRequest, CourseDBResponse},
        dealers::{DealerCreateDBRequest, DealerDBResponse},
        enrollments::{EnrollmentCreateDBRequest, EnrollmentDBResponse},
        groups::{GroupCreateDBRequest, GroupDBResponse, GroupDayInput},
        users::{UserCreateDBRequest, UserDBResponse},
    },
};
use crate::email::EmailService;
use crate::types::{CourseId, DealerId, GroupId};
use crate::AppState;
use chrono::{Duration, NaiveTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Password given to every account created by [`create_test_user`]
pub const TEST_PASSWORD: &str = "correct-horse-battery";

#[cfg(test)]
pub async fn create_test_app(pool: PgPool) -> axum_test::TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

#[cfg(test)]
pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> axum_test::TestServer {
    crate::Application::new_with_pool(config, pool)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: crate::config::AuthConfig {
            native: NativeAuthConfig {
                session: SessionConfig {
                    cookie_secure: false,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        },
        email: EmailConfig {
            transport: EmailTransportConfig::Disabled,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn create_test_state(pool: PgPool) -> AppState {
    let config = create_test_config();
    let email = EmailService::new(&config).expect("Failed to create email service");

    AppState::builder().db(pool).config(config).email(Arc::new(email)).build()
}

pub async fn create_test_user(pool: &PgPool, email: &str, roles: Vec<Role>) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let password_hash = password::hash_string(TEST_PASSWORD).expect("Failed to hash test password");

    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            display_name: Some("Test User".to_string()),
            password_hash: Some(password_hash),
            roles,
        })
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_admin(pool: &PgPool) -> UserDBResponse {
    let email = format!("admin_{}@example.com", Uuid::new_v4().simple());
    create_test_user(pool, &email, vec![Role::SuperAdmin]).await
}

/// `Authorization` header carrying a session token valid for [`create_test_config`]
pub fn add_auth_headers(user: &UserDBResponse) -> Vec<(String, String)> {
    let token = session::create_session_token(&CurrentUser::from(user.clone()), &create_test_config())
        .expect("Failed to create session token");
    vec![("authorization".to_string(), format!("Bearer {token}"))]
}

pub async fn create_test_course(pool: &PgPool, name: &str, visibility: CourseVisibility) -> CourseDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    Courses::new(&mut conn)
        .create(&CourseCreateDBRequest {
            name: name.to_string(),
            description: None,
            modality: Default::default(),
            visibility,
            created_by: None,
        })
        .await
        .expect("Failed to create test course")
}

/// Active group meeting once, a week from today, 09:00-13:00
pub async fn create_test_group(pool: &PgPool, course_id: CourseId, max_capacity: i32) -> GroupDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    Groups::new(&mut conn)
        .create(&GroupCreateDBRequest {
            course_id,
            name: Some(format!("Grupo {}", &Uuid::new_v4().simple().to_string()[..6])),
            max_capacity,
            state: GroupState::Active,
            days: vec![GroupDayInput {
                day: Utc::now().date_naive() + Duration::days(7),
                start_time: NaiveTime::from_hms_opt(9, 0, 0),
                end_time: NaiveTime::from_hms_opt(13, 0, 0),
            }],
        })
        .await
        .expect("Failed to create test group")
}

pub async fn create_test_dealer(pool: &PgPool, name: &str) -> DealerDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    Dealers::new(&mut conn)
        .create(&DealerCreateDBRequest { name: name.to_string() })
        .await
        .expect("Failed to create test dealer")
}

/// Insert an enrollment directly, bypassing the capacity workflow
pub async fn insert_test_enrollment(pool: &PgPool, group_id: GroupId, dealer_id: DealerId, email: &str) -> EnrollmentDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let participant_name = email.split('@').next().unwrap_or(email).to_string();

    Enrollments::new(&mut conn)
        .create(&EnrollmentCreateDBRequest {
            group_id,
            dealer_id,
            mechanic_id: None,
            participant_name,
            participant_email: email.to_string(),
            phone: None,
            notes: None,
        })
        .await
        .expect("Failed to insert test enrollment")
}
