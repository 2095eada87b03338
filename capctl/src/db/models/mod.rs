//! Database request/response types consumed and produced by the repositories in
//! [`crate::db::handlers`]. `*DBRequest` types carry already-validated input; `*DBResponse`
//! types are row shapes (`FromRow`) or row shapes enriched with joined data.

pub mod courses;
pub mod dealers;
pub mod enrollments;
pub mod groups;
pub mod mechanics;
pub mod users;
