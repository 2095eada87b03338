//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed connection or transaction and exposes strongly typed
//! operations returning [`crate::db::models`] types:
//!
//! - [`Courses`]: training courses, including the cascading course delete
//! - [`Groups`]: groups with their session days, capacity locking and the group delete
//! - [`Dealers`], [`Mechanics`]: dealer network
//! - [`Enrollments`]: seat reservations, filtered listings and export rows
//! - [`Users`]: administrative accounts and roles
//! - [`Reports`]: read-only dashboard aggregates
//!
//! Operations touching several tables open a nested transaction (a savepoint when the caller is
//! already inside one), so they are atomic regardless of how the repository was constructed.

pub mod courses;
pub mod dealers;
pub mod enrollments;
pub mod groups;
pub mod mechanics;
pub mod reports;
pub mod repository;
pub mod users;

pub use courses::Courses;
pub use dealers::Dealers;
pub use enrollments::Enrollments;
pub use groups::Groups;
pub use mechanics::Mechanics;
pub use reports::Reports;
pub use repository::Repository;
pub use users::Users;
