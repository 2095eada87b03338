//! Administrator authentication and authorization.
//!
//! Administrators log in with email and password at `/auth/login` and receive a signed session
//! token (JWT). The token travels in an HTTP-only cookie for browsers and is also accepted as
//! `Authorization: Bearer <token>` for scripts.
//!
//! Access control is role based: every role grants a fixed set of (resource, operation) pairs,
//! and handlers declare what they need with the [`permissions::RequiresPermission`] extractor.
//! Authorization is decided before the handler body runs, so no persistence access happens for
//! rejected requests.
//!
//! # Modules
//!
//! - [`current_user`]: Extractors resolving the caller from cookie or bearer token
//! - [`password`]: Argon2 password hashing
//! - [`permissions`]: Role table and the permission extractor
//! - [`session`]: Session token creation/verification and cookie helpers
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use capctl::auth::permissions::{operation, resource, RequiresPermission};
//!
//! async fn delete_course(
//!     State(state): State<AppState>,
//!     current_user: RequiresPermission<resource::Courses, operation::DeleteAll>,
//!     Path(id): Path<CourseId>,
//! ) -> Result<StatusCode> {
//!     // current_user derefs to CurrentUser
//!     ...
//! }
//! ```

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
