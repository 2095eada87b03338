//! API request and response data models.
//!
//! These types are the public contract of the HTTP API and are kept separate from the database
//! models in [`crate::db::models`], so storage can evolve without breaking clients. Every type is
//! annotated for `utoipa` so the OpenAPI document stays in sync with the code.
//!
//! Request bodies derive [`validator::Validate`] for per-field rules and implement
//! [`ValidateRequest`] to add cross-field rules; handlers call
//! [`ValidateRequest::validate_request`] before touching the database.
//!
//! - [`courses`]: training courses ("capacitaciones")
//! - [`groups`]: scheduled groups and their session days ("grupos")
//! - [`dealers`], [`mechanics`]: dealer network and staff
//! - [`enrollments`]: seat reservations ("inscripciones") and export filters
//! - [`reports`]: dashboard aggregates
//! - [`users`], [`auth`]: administrative accounts and sessions
//! - [`pagination`]: shared `skip`/`limit` handling

pub mod auth;
pub mod courses;
pub mod dealers;
pub mod enrollments;
pub mod groups;
pub mod mechanics;
pub mod pagination;
pub mod reports;
pub mod users;

use crate::errors::{Error, FieldError, flatten_validation_errors};
use validator::{Validate, ValidationError};

/// Derive-based validation plus rules spanning several fields.
pub trait ValidateRequest: Validate {
    /// Cross-field rules the derive cannot express
    fn cross_field_errors(&self) -> Vec<FieldError> {
        Vec::new()
    }

    fn validate_request(&self) -> Result<(), Error> {
        let mut errors = match self.validate() {
            Ok(()) => Vec::new(),
            Err(e) => flatten_validation_errors(&e),
        };
        errors.extend(self.cross_field_errors());
        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort_by(|a, b| a.field.cmp(&b.field));
            Err(Error::Validation { errors })
        }
    }
}

/// Rejects strings that are empty once surrounding whitespace is removed
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Trim user input and collapse empty strings to `None`
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
