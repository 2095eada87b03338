//! Login, signup and session payloads.

use super::ValidateRequest;
use super::users::UserResponse;
use crate::errors::FieldError;
use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin@example.com")]
    pub email: String,
    pub password: String,
}

/// Password length limits come from configuration, so they are checked in the handler
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct SignupRequest {
    #[schema(example = "coordinator@example.com")]
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[validate(length(max = 200))]
    pub display_name: Option<String>,
}

impl ValidateRequest for SignupRequest {}

impl SignupRequest {
    pub fn password_errors(&self, min_length: usize, max_length: usize) -> Vec<FieldError> {
        let length = self.password.chars().count();
        if length < min_length {
            vec![FieldError::new("password", format!("must be at least {min_length} characters"))]
        } else if length > max_length {
            vec![FieldError::new("password", format!("must be at most {max_length} characters"))]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    /// Same JWT as the session cookie, for clients using `Authorization: Bearer`
    pub token: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// Successful login or signup: the body plus the session cookie
pub struct SessionResponse {
    pub status: StatusCode,
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for SessionResponse {
    fn into_response(self) -> Response {
        (self.status, [(header::SET_COOKIE, self.cookie)], Json(self.auth_response)).into_response()
    }
}

/// Logout clears the session cookie
pub struct LogoutResponse {
    pub auth_response: AuthSuccessResponse,
    pub cookie: String,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, [(header::SET_COOKIE, self.cookie)], Json(self.auth_response)).into_response()
    }
}
