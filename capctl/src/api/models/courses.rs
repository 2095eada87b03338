//! API request/response models for training courses.

use super::groups::GroupResponse;
use super::pagination::Pagination;
use super::{ValidateRequest, not_blank};
use crate::db::models::courses::CourseDBResponse;
use crate::types::{CourseId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// How a course is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "course_modality", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CourseModality {
    #[default]
    InPerson,
    Online,
    Hybrid,
}

/// Whether the course shows up in the public catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "course_visibility", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CourseVisibility {
    Visible,
    Hidden,
    #[default]
    Draft,
}

/// Query parameters for listing courses
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListCoursesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Case-insensitive substring match on the course name
    pub search: Option<String>,

    /// Restrict to one visibility state (ignored for anonymous callers, who only see visible courses)
    pub visibility: Option<CourseVisibility>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CourseCreate {
    #[schema(example = "Maintenance 101")]
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub name: String,
    #[schema(example = "Preventive maintenance fundamentals")]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    /// Defaults to `in_person`
    pub modality: Option<CourseModality>,
    /// Defaults to `draft`
    pub visibility: Option<CourseVisibility>,
}

impl ValidateRequest for CourseCreate {}

/// Partial update; omitted fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct CourseUpdate {
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub modality: Option<CourseModality>,
    pub visibility: Option<CourseVisibility>,
}

impl ValidateRequest for CourseUpdate {}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CourseId,
    pub name: String,
    pub description: Option<String>,
    pub modality: CourseModality,
    pub visibility: CourseVisibility,
    /// Hidden from anonymous callers
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of groups scheduled for this course
    pub group_count: i64,
    /// Enrollments across all groups of this course
    pub enrollment_count: i64,
}

impl From<CourseDBResponse> for CourseResponse {
    fn from(db: CourseDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            modality: db.modality,
            visibility: db.visibility,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
            group_count: 0,
            enrollment_count: 0,
        }
    }
}

impl CourseResponse {
    pub fn with_counts(mut self, group_count: i64, enrollment_count: i64) -> Self {
        self.group_count = group_count;
        self.enrollment_count = enrollment_count;
        self
    }

    pub fn mask_created_by(mut self) -> Self {
        self.created_by = None;
        self
    }
}

/// A course together with its groups, as shown on the course page
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseDetailResponse {
    #[serde(flatten)]
    pub course: CourseResponse,
    pub groups: Vec<GroupResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn test_course_create_requires_name() {
        let request = CourseCreate {
            name: "   ".to_string(),
            description: None,
            modality: None,
            visibility: None,
        };
        let Err(Error::Validation { errors }) = request.validate_request() else {
            panic!("blank name must be rejected");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
    }

    #[test]
    fn test_course_update_allows_empty_patch() {
        assert!(CourseUpdate::default().validate_request().is_ok());
    }

    #[test]
    fn test_enum_wire_format() {
        let course: CourseCreate = serde_json::from_value(serde_json::json!({
            "name": "Diagnostics",
            "modality": "in_person",
            "visibility": "visible"
        }))
        .unwrap();
        assert_eq!(course.modality, Some(CourseModality::InPerson));
        assert_eq!(course.visibility, Some(CourseVisibility::Visible));
    }
}
