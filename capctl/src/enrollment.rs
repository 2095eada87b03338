//! The public enrollment workflow.
//!
//! An enrollment reserves one seat in a group. The group row is locked (`SELECT ... FOR UPDATE`)
//! for the whole transaction, so concurrent requests for the same group are serialized and the
//! capacity check cannot be raced:
//!
//! 1. validate the request (no database access on failure)
//! 2. lock the group; reject groups of unpublished courses, closed/inactive groups and full groups
//! 3. resolve the dealer and, optionally, the mechanic (registering a new one if asked to)
//! 4. insert the enrollment; the `(group, email)` unique index rejects duplicates
//! 5. commit, then send the confirmation email in the background
//!
//! A failed confirmation email never affects the enrollment, which is already committed.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::{
    AppState,
    api::models::{
        ValidateRequest, clean_optional,
        courses::CourseVisibility,
        enrollments::{EnrollmentCreate, EnrollmentReceipt},
        groups::remaining_capacity,
        mechanics::SkillLevel,
    },
    config::EnrollmentConfig,
    db::{
        errors::DbError,
        handlers::{Dealers, Enrollments, Groups, Mechanics, Repository},
        models::{enrollments::EnrollmentCreateDBRequest, mechanics::MechanicCreateDBRequest},
    },
    email::EmailService,
    errors::{ConflictKind, Error, FieldError, Result},
    types::abbrev_uuid,
};

const DUPLICATE_CONSTRAINT: &str = "enrollments_group_email_unique";

/// Run the workflow and, when configured, dispatch the confirmation email
pub async fn submit(state: &AppState, request: EnrollmentCreate) -> Result<EnrollmentReceipt> {
    let receipt = enroll(&state.db, &state.config.enrollment, &request).await?;

    if state.config.enrollment.send_confirmation {
        dispatch_confirmation(state.email.clone(), receipt.clone());
    }
    Ok(receipt)
}

/// Validate, check capacity and persist one enrollment atomically
#[instrument(skip_all, fields(group_id = %abbrev_uuid(&request.group_id), dealer_id = %abbrev_uuid(&request.dealer_id)), err)]
pub async fn enroll(pool: &PgPool, config: &EnrollmentConfig, request: &EnrollmentCreate) -> Result<EnrollmentReceipt> {
    request.validate_request()?;

    let mut tx = pool.begin().await.map_err(DbError::from)?;

    let group = Groups::new(&mut tx)
        .lock_for_enrollment(request.group_id)
        .await?
        .ok_or_else(|| Error::not_found("Group", request.group_id))?;

    // Groups of draft or hidden courses are not part of the public catalog
    if group.course_visibility != CourseVisibility::Visible {
        return Err(Error::not_found("Group", request.group_id));
    }

    if config.reject_closed_groups && !group.state.accepts_enrollments() {
        return Err(Error::Conflict {
            kind: ConflictKind::GroupUnavailable,
            message: "This group is not accepting enrollments".to_string(),
        });
    }

    if group.enrollment_count >= i64::from(group.max_capacity) {
        return Err(Error::Conflict {
            kind: ConflictKind::CapacityExceeded,
            message: "This group has no seats left".to_string(),
        });
    }

    let dealer = Dealers::new(&mut tx)
        .get_by_id(request.dealer_id)
        .await?
        .ok_or_else(|| Error::not_found("Dealer", request.dealer_id))?;

    let (mechanic_id, participant_name) = if request.new_mechanic {
        let mechanic = Mechanics::new(&mut tx)
            .create(&MechanicCreateDBRequest {
                dealer_id: dealer.id,
                first_name: trimmed(&request.mechanic_first_name),
                last_name: trimmed(&request.mechanic_last_name),
                role_label: None,
                skill_level: SkillLevel::Junior,
            })
            .await?;
        info!(mechanic_id = %abbrev_uuid(&mechanic.id), "Registered mechanic from enrollment form");
        (Some(mechanic.id), mechanic.full_name())
    } else if let Some(mechanic_id) = request.mechanic_id {
        let mechanic = Mechanics::new(&mut tx)
            .get_by_id(mechanic_id)
            .await?
            .ok_or_else(|| Error::not_found("Mechanic", mechanic_id))?;
        if mechanic.dealer_id != dealer.id {
            return Err(Error::Validation {
                errors: vec![FieldError::new("mechanic_id", "does not belong to the selected dealer")],
            });
        }
        let name = clean_optional(request.participant_name.clone()).unwrap_or_else(|| mechanic.full_name());
        (Some(mechanic.id), name)
    } else {
        (None, trimmed(&request.participant_name))
    };

    let created = Enrollments::new(&mut tx)
        .create(&EnrollmentCreateDBRequest {
            group_id: group.id,
            dealer_id: dealer.id,
            mechanic_id,
            participant_name,
            participant_email: request.participant_email.trim().to_string(),
            phone: clean_optional(request.phone.clone()),
            notes: clean_optional(request.notes.clone()),
        })
        .await
        .map_err(|e| match e {
            DbError::UniqueViolation { .. } if e.constraint() == Some(DUPLICATE_CONSTRAINT) => Error::Conflict {
                kind: ConflictKind::DuplicateEnrollment,
                message: "This email address is already enrolled in the selected group".to_string(),
            },
            other => Error::Database(other),
        })?;

    let details = Groups::new(&mut tx)
        .get_by_id(group.id)
        .await?
        .ok_or_else(|| Error::not_found("Group", group.id))?;

    tx.commit().await.map_err(DbError::from)?;

    info!(
        enrollment_id = %abbrev_uuid(&created.id),
        seats_taken = group.enrollment_count + 1,
        max_capacity = group.max_capacity,
        "Enrollment created"
    );

    Ok(EnrollmentReceipt {
        remaining_capacity: remaining_capacity(group.max_capacity, group.enrollment_count + 1),
        enrollment: created.into(),
        course_id: details.course_id,
        course_name: details.course_name,
        group_name: details.name,
        dealer_name: dealer.name,
        days: details.days.into_iter().map(Into::into).collect(),
    })
}

/// Send the confirmation on a background task; failures are only logged
pub fn dispatch_confirmation(email: Arc<EmailService>, receipt: EnrollmentReceipt) {
    tokio::spawn(async move {
        if let Err(e) = email.send_enrollment_confirmation(&receipt).await {
            warn!(
                enrollment_id = %receipt.enrollment.id,
                error = %e,
                "Failed to send enrollment confirmation"
            );
        }
    });
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_string()
}
