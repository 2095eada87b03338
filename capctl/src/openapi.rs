//! OpenAPI document served at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, errors};

/// Bearer token and session cookie schemes; both carry the same signed token. The cookie name
/// shown is the default of `auth.native.session.cookie_name`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned by `POST /auth/login`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("capctl_session"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::signup,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::get_current_user,
        api::handlers::courses::list_courses,
        api::handlers::courses::get_course,
        api::handlers::courses::create_course,
        api::handlers::courses::update_course,
        api::handlers::courses::delete_course,
        api::handlers::courses::export_course_csv,
        api::handlers::groups::list_groups,
        api::handlers::groups::get_group,
        api::handlers::groups::create_group,
        api::handlers::groups::update_group,
        api::handlers::groups::delete_group,
        api::handlers::enrollments::list_enrollments,
        api::handlers::enrollments::create_enrollment,
        api::handlers::enrollments::get_enrollment,
        api::handlers::enrollments::update_enrollment,
        api::handlers::enrollments::delete_enrollment,
        api::handlers::enrollments::export_enrollments_csv,
        api::handlers::enrollments::export_enrollments_xlsx,
        api::handlers::dealers::list_dealers,
        api::handlers::dealers::get_dealer,
        api::handlers::dealers::create_dealer,
        api::handlers::dealers::update_dealer,
        api::handlers::dealers::delete_dealer,
        api::handlers::mechanics::list_mechanics,
        api::handlers::mechanics::get_mechanic,
        api::handlers::mechanics::create_mechanic,
        api::handlers::mechanics::update_mechanic,
        api::handlers::mechanics::delete_mechanic,
        api::handlers::reports::get_dashboard,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
    ),
    components(
        schemas(
            api::models::auth::LoginRequest,
            api::models::auth::SignupRequest,
            api::models::auth::AuthResponse,
            api::models::auth::AuthSuccessResponse,
            api::models::courses::CourseModality,
            api::models::courses::CourseVisibility,
            api::models::courses::CourseCreate,
            api::models::courses::CourseUpdate,
            api::models::courses::CourseResponse,
            api::models::courses::CourseDetailResponse,
            api::models::groups::GroupState,
            api::models::groups::GroupDayCreate,
            api::models::groups::GroupCreate,
            api::models::groups::GroupUpdate,
            api::models::groups::GroupDayResponse,
            api::models::groups::GroupResponse,
            api::models::enrollments::AttendanceStatus,
            api::models::enrollments::EnrollmentCreate,
            api::models::enrollments::EnrollmentUpdate,
            api::models::enrollments::EnrollmentResponse,
            api::models::enrollments::EnrollmentReceipt,
            api::models::dealers::DealerCreate,
            api::models::dealers::DealerUpdate,
            api::models::dealers::DealerResponse,
            api::models::mechanics::SkillLevel,
            api::models::mechanics::MechanicCreate,
            api::models::mechanics::MechanicUpdate,
            api::models::mechanics::MechanicResponse,
            api::models::reports::AttendanceSummary,
            api::models::reports::CoursePopularity,
            api::models::reports::GroupPopularity,
            api::models::reports::DealerEnrollmentCount,
            api::models::reports::DashboardResponse,
            api::models::users::Role,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            errors::FieldError,
            errors::ConflictKind,
        )
    ),
    tags(
        (name = "auth", description = "Administrator login, logout and registration."),
        (name = "courses", description = "Training courses. Visible courses form the public catalog."),
        (name = "groups", description = "Scheduled groups of a course, with session days and a seat limit."),
        (name = "enrollments", description = "Public enrollment form and the administrative enrollment listing, attendance and exports."),
        (name = "dealers", description = "Dealer directory. Listing is public so the enrollment form can offer it."),
        (name = "mechanics", description = "Mechanics employed by each dealer."),
        (name = "reports", description = "Dashboard figures for the training program."),
        (name = "users", description = "Administrator accounts and their roles."),
    ),
    info(
        title = "capctl",
        version = "1.0.0",
        description = "Training course catalog and enrollment management.

## Authentication

Management routes take the session token from `POST /auth/login`, either in the
`capctl_session` cookie or in the `Authorization` header:

```
Authorization: Bearer YOUR_TOKEN
```

## Errors

Validation failures return `422` with one entry per failing field:

```json
{ \"message\": \"Validation failed\", \"errors\": [{ \"field\": \"email\", \"message\": \"invalid email address\" }] }
```

Conflicts return `409` with a machine-readable `code`, e.g. `capacity_exceeded` or
`duplicate_enrollment`.",
    ),
)]
pub struct ApiDoc;
