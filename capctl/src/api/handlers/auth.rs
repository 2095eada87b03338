use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;

use crate::{
    AppState,
    api::models::{
        ValidateRequest,
        auth::{AuthResponse, AuthSuccessResponse, LoginRequest, LogoutResponse, SessionResponse, SignupRequest},
        users::{CurrentUser, UserResponse},
    },
    auth::{password, session},
    db::{
        handlers::{Repository, Users},
        models::users::UserCreateDBRequest,
    },
    errors::Error,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn native_auth_enabled(state: &AppState) -> Result<(), Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }
    Ok(())
}

fn session_response(state: &AppState, status: StatusCode, user: UserResponse, message: &str) -> Result<SessionResponse, Error> {
    let current_user = CurrentUser {
        id: user.id,
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        roles: user.roles.clone(),
    };
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = session::session_cookie(&token, &state.config);

    Ok(SessionResponse {
        status,
        auth_response: AuthResponse {
            user,
            token,
            message: message.to_string(),
        },
        cookie,
    })
}

/// Create an administrator account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    tag = "auth",
    responses(
        (status = 201, description = "Account created and session started", body = AuthResponse),
        (status = 400, description = "Registration is disabled"),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signup(State(state): State<AppState>, Json(request): Json<SignupRequest>) -> Result<SessionResponse, Error> {
    native_auth_enabled(&state)?;
    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let password_config = &state.config.auth.native.password;
    let mut errors = match request.validate_request() {
        Ok(()) => Vec::new(),
        Err(Error::Validation { errors }) => errors,
        Err(e) => return Err(e),
    };
    errors.extend(request.password_errors(password_config.min_length, password_config.max_length));
    if !errors.is_empty() {
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        return Err(Error::Validation { errors });
    }

    let password_hash = password::hash_password(request.password).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let created = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: request.email.trim().to_string(),
            display_name: request.display_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            password_hash: Some(password_hash),
            roles: state.config.auth.default_roles.clone(),
        })
        .await?;

    tracing::info!(user_id = %created.id, "Administrator account registered");
    session_response(&state, StatusCode::CREATED, created.into(), "Registration successful")
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Session started", body = AuthResponse),
        (status = 400, description = "Native authentication is disabled"),
        (status = 401, description = "Invalid email or password"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<SessionResponse, Error> {
    native_auth_enabled(&state)?;

    let invalid = || Error::Unauthenticated {
        message: Some(INVALID_CREDENTIALS.to_string()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let mut user = users.get_user_by_email(request.email.trim()).await?.ok_or_else(invalid)?;
    let password_hash = user.password_hash.clone().ok_or_else(invalid)?;

    if !password::verify_password(request.password, password_hash).await? {
        return Err(invalid());
    }

    users.touch_last_login(user.id).await?;
    user.last_login = Some(Utc::now());

    session_response(&state, StatusCode::OK, user.into(), "Login successful")
}

/// End the session by expiring the cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Session cookie cleared", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> LogoutResponse {
    LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie: session::expired_session_cookie(&state.config),
    }
}

/// The logged-in administrator
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not logged in"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_user(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| Error::not_found("User", current_user.id))?;

    Ok(Json(user.into()))
}
