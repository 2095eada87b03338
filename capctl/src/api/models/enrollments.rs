//! API request/response models for enrollments ("inscripciones").

use super::groups::GroupDayResponse;
use super::pagination::Pagination;
use super::{ValidateRequest, clean_optional};
use crate::db::models::enrollments::{EnrollmentDBResponse, EnrollmentFilter};
use crate::errors::FieldError;
use crate::types::{CourseId, DealerId, EnrollmentId, GroupId, MechanicId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Attendance mark recorded by administrators after the group meets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "attendance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Pending,
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "Pending",
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

/// Filters shared by the enrollment list and the exports
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct EnrollmentFilterQuery {
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub course_id: Option<CourseId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub group_id: Option<GroupId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub dealer_id: Option<DealerId>,
    pub attendance: Option<AttendanceStatus>,
    /// Case-insensitive match on participant name or email
    pub search: Option<String>,
}

impl From<EnrollmentFilterQuery> for EnrollmentFilter {
    fn from(query: EnrollmentFilterQuery) -> Self {
        Self {
            course_id: query.course_id,
            group_id: query.group_id,
            dealer_id: query.dealer_id,
            attendance: query.attendance,
            search: clean_optional(query.search),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListEnrollmentsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[serde(flatten)]
    #[param(inline)]
    pub filter: EnrollmentFilterQuery,
}

/// Public enrollment form.
///
/// Three ways to name the participant:
/// - `participant_name` for walk-in participants;
/// - `mechanic_id` to enroll an existing mechanic of the dealer (name taken from the mechanic);
/// - `new_mechanic` with `mechanic_first_name`/`mechanic_last_name` to register the mechanic first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct EnrollmentCreate {
    #[schema(value_type = String, format = "uuid")]
    pub group_id: GroupId,
    #[schema(value_type = String, format = "uuid")]
    pub dealer_id: DealerId,
    #[schema(example = "Ana García")]
    #[validate(length(max = 200))]
    pub participant_name: Option<String>,
    #[schema(example = "ana@x.com")]
    #[validate(email, length(max = 320))]
    pub participant_email: String,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub new_mechanic: bool,
    #[validate(length(max = 100))]
    pub mechanic_first_name: Option<String>,
    #[validate(length(max = 100))]
    pub mechanic_last_name: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub mechanic_id: Option<MechanicId>,
}

impl ValidateRequest for EnrollmentCreate {
    fn cross_field_errors(&self) -> Vec<FieldError> {
        let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());
        let mut errors = Vec::new();

        if self.new_mechanic {
            if blank(&self.mechanic_first_name) {
                errors.push(FieldError::new("mechanic_first_name", "required when registering a new mechanic"));
            }
            if blank(&self.mechanic_last_name) {
                errors.push(FieldError::new("mechanic_last_name", "required when registering a new mechanic"));
            }
            if self.mechanic_id.is_some() {
                errors.push(FieldError::new("mechanic_id", "cannot be combined with new_mechanic"));
            }
        } else if self.mechanic_id.is_none() && blank(&self.participant_name) {
            errors.push(FieldError::new("participant_name", "must not be blank"));
        }
        errors
    }
}

/// Admin edits after enrollment; omitted fields are unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct EnrollmentUpdate {
    pub attendance: Option<AttendanceStatus>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl ValidateRequest for EnrollmentUpdate {}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: EnrollmentId,
    #[schema(value_type = String, format = "uuid")]
    pub group_id: GroupId,
    #[schema(value_type = String, format = "uuid")]
    pub dealer_id: DealerId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub mechanic_id: Option<MechanicId>,
    pub participant_name: String,
    pub participant_email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub attendance: AttendanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EnrollmentDBResponse> for EnrollmentResponse {
    fn from(db: EnrollmentDBResponse) -> Self {
        Self {
            id: db.id,
            group_id: db.group_id,
            dealer_id: db.dealer_id,
            mechanic_id: db.mechanic_id,
            participant_name: db.participant_name,
            participant_email: db.participant_email,
            phone: db.phone,
            notes: db.notes,
            attendance: db.attendance,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Result of a successful enrollment: the stored row plus the context shown to the participant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentReceipt {
    pub enrollment: EnrollmentResponse,
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    pub course_name: String,
    pub group_name: Option<String>,
    pub dealer_name: String,
    pub days: Vec<GroupDayResponse>,
    /// Seats left in the group after this enrollment
    pub remaining_capacity: i64,
}
