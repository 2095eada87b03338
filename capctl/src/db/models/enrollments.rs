use crate::api::models::enrollments::AttendanceStatus;
use crate::types::{CourseId, DealerId, EnrollmentId, GroupId, MechanicId};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct EnrollmentCreateDBRequest {
    pub group_id: GroupId,
    pub dealer_id: DealerId,
    pub mechanic_id: Option<MechanicId>,
    pub participant_name: String,
    pub participant_email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentUpdateDBRequest {
    pub attendance: Option<AttendanceStatus>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EnrollmentDBResponse {
    pub id: EnrollmentId,
    pub group_id: GroupId,
    pub dealer_id: DealerId,
    pub mechanic_id: Option<MechanicId>,
    pub participant_name: String,
    pub participant_email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub attendance: AttendanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Narrowing criteria shared by listings, exports and counts
#[derive(Debug, Clone, Default)]
pub struct EnrollmentFilter {
    pub course_id: Option<CourseId>,
    pub group_id: Option<GroupId>,
    pub dealer_id: Option<DealerId>,
    pub attendance: Option<AttendanceStatus>,
    pub search: Option<String>,
}

impl EnrollmentFilter {
    pub fn for_course(course_id: CourseId) -> Self {
        Self {
            course_id: Some(course_id),
            ..Default::default()
        }
    }
}

/// Denormalized enrollment row for CSV/XLSX export
#[derive(Debug, Clone, FromRow)]
pub struct EnrollmentExportRow {
    pub participant_name: String,
    pub participant_email: String,
    pub phone: Option<String>,
    pub dealer_name: String,
    pub course_name: String,
    pub group_name: Option<String>,
    pub group_date: Option<NaiveDate>,
    pub attendance: AttendanceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
