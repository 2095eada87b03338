//! Resolving the calling administrator from a request.
//!
//! Credentials are looked for in two places, in order:
//! 1. `Authorization: Bearer <session token>`
//! 2. the session cookie named by `auth.native.session.cookie_name`
//!
//! A verified token is only the starting point: the account is reloaded from the database so that
//! deleted accounts and role changes take effect immediately rather than at token expiry.

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session::{self, SessionClaims},
    config::Config,
    db::handlers::{Repository, Users},
    errors::{Error, Result},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Session token from the `Authorization` header.
/// Returns:
/// - None: no bearer credentials present
/// - Some(Ok(claims)): token verified
/// - Some(Err(error)): header present but unusable or token invalid
fn try_bearer_auth(parts: &Parts, config: &Config) -> Option<Result<SessionClaims>> {
    let auth_header = parts.headers.get(header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?;
    Some(session::verify_session_token(token.trim(), config))
}

/// Session token from the cookie header; other cookies are ignored
fn try_cookie_auth(parts: &Parts, config: &Config) -> Option<Result<SessionClaims>> {
    let cookie_header = parts.headers.get(header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.native.session.cookie_name;

    cookie_str
        .split(';')
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| name == cookie_name && !value.is_empty())
        .map(|(_, value)| session::verify_session_token(value, config))
}

/// Claims from the first credential source present, if any
fn session_claims(parts: &Parts, config: &Config) -> Option<Result<SessionClaims>> {
    if !config.auth.native.enabled {
        return None;
    }
    try_bearer_auth(parts, config).or_else(|| try_cookie_auth(parts, config))
}

async fn load_user(state: &AppState, claims: SessionClaims) -> Result<CurrentUser> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let user = Users::new(&mut conn).get_by_id(claims.sub).await?;

    match user {
        Some(user) => Ok(CurrentUser::from(user)),
        None => {
            debug!(user_id = %claims.sub, "Session refers to a deleted account");
            Err(Error::Unauthenticated { message: None })
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match session_claims(parts, &state.config) {
            Some(Ok(claims)) => load_user(state, claims).await,
            Some(Err(e)) => {
                trace!("Session authentication failed: {:?}", e);
                match e {
                    Error::BadRequest { .. } | Error::Internal { .. } => Err(e),
                    _ => Err(Error::Unauthenticated { message: None }),
                }
            }
            None => {
                trace!("No authentication credentials found in request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

/// Routes serving both the public and administrators use `Option<CurrentUser>`; credentials
/// that fail verification make the caller anonymous instead of failing the request.
impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        match session_claims(parts, &state.config) {
            Some(Ok(claims)) => match load_user(state, claims).await {
                Ok(user) => Ok(Some(user)),
                Err(Error::Unauthenticated { .. }) => Ok(None),
                Err(e) => Err(e),
            },
            Some(Err(_)) | None => Ok(None),
        }
    }
}
