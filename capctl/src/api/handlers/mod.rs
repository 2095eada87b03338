//! Route handlers.
//!
//! Routes shared by the public portal and administrators take `Option<CurrentUser>`; management
//! routes take a [`crate::auth::permissions::RequiresPermission`] guard, which runs before any
//! database access.

pub mod auth;
pub mod courses;
pub mod dealers;
pub mod enrollments;
pub mod groups;
pub mod mechanics;
pub mod reports;
pub mod users;

use crate::{
    api::models::users::CurrentUser,
    auth::permissions::has_permission,
    types::{Operation, Resource},
};

/// Whether the caller may see drafts, hidden courses and closed groups of `resource`
pub(crate) fn sees_unpublished(user: Option<&CurrentUser>, resource: Resource) -> bool {
    user.is_some_and(|user| has_permission(user, resource, Operation::ReadAll))
}
