//! Database access layer.
//!
//! - [`handlers`]: repositories, one per table family, implementing [`handlers::Repository`]
//! - [`models`]: request/response row types exchanged with the repositories
//! - [`errors`]: [`errors::DbError`], which classifies Postgres constraint failures
//!
//! Repositories borrow a `&mut PgConnection`, so callers choose the transaction boundary:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut courses = Courses::new(&mut tx);
//! courses.delete(course_id).await?;
//! tx.commit().await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
