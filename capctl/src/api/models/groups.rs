//! API request/response models for course groups and their session days.

use super::pagination::Pagination;
use super::{ValidateRequest, clean_optional};
use crate::db::models::groups::{GroupDBResponse, GroupDayDBResponse, GroupDayInput};
use crate::errors::FieldError;
use crate::types::{CourseId, GroupDayId, GroupId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Lifecycle of a group. `full` is set by administrators; seat counting never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "group_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    #[default]
    Active,
    Inactive,
    Closed,
    Full,
}

impl GroupState {
    /// Closed and inactive groups take no new enrollments
    pub fn accepts_enrollments(self) -> bool {
        matches!(self, GroupState::Active | GroupState::Full)
    }
}

/// Remaining seats, floored at zero
pub fn remaining_capacity(max_capacity: i32, enrollment_count: i64) -> i64 {
    (i64::from(max_capacity) - enrollment_count).max(0)
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListGroupsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub course_id: Option<CourseId>,

    /// Ignored for anonymous callers, who only see active groups
    pub state: Option<GroupState>,
}

/// One session day in a create/update request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct GroupDayCreate {
    #[schema(value_type = String, format = Date, example = "2025-04-07")]
    pub day: NaiveDate,
    #[schema(value_type = Option<String>, example = "09:00:00")]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, example = "13:00:00")]
    pub end_time: Option<NaiveTime>,
}

impl From<&GroupDayCreate> for GroupDayInput {
    fn from(day: &GroupDayCreate) -> Self {
        Self {
            day: day.day,
            start_time: day.start_time,
            end_time: day.end_time,
        }
    }
}

/// Days must be distinct and each time window must end after it starts
fn day_errors(days: &[GroupDayCreate]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, day) in days.iter().enumerate() {
        if let (Some(start), Some(end)) = (day.start_time, day.end_time) {
            if end <= start {
                errors.push(FieldError::new(format!("days[{index}].end_time"), "must be after start_time"));
            }
        }
        if !seen.insert(day.day) {
            errors.push(FieldError::new(format!("days[{index}].day"), "duplicate session day"));
        }
    }
    errors
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct GroupCreate {
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    #[schema(example = "Turno mañana")]
    #[validate(length(max = 200))]
    pub name: Option<String>,
    #[schema(example = 20)]
    #[validate(range(min = 1, max = 10000))]
    pub max_capacity: i32,
    /// Defaults to `active`
    pub state: Option<GroupState>,
    #[serde(default)]
    #[validate(nested)]
    pub days: Vec<GroupDayCreate>,
}

impl ValidateRequest for GroupCreate {
    fn cross_field_errors(&self) -> Vec<FieldError> {
        day_errors(&self.days)
    }
}

impl GroupCreate {
    pub fn clean_name(&self) -> Option<String> {
        clean_optional(self.name.clone())
    }
}

/// Partial update. When `days` is present it replaces the whole session-day set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct GroupUpdate {
    #[validate(length(max = 200))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub max_capacity: Option<i32>,
    pub state: Option<GroupState>,
    #[validate(nested)]
    pub days: Option<Vec<GroupDayCreate>>,
}

impl ValidateRequest for GroupUpdate {
    fn cross_field_errors(&self) -> Vec<FieldError> {
        self.days.as_deref().map(day_errors).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupDayResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GroupDayId,
    #[schema(value_type = String, format = Date)]
    pub day: NaiveDate,
    #[schema(value_type = Option<String>)]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub end_time: Option<NaiveTime>,
}

impl From<GroupDayDBResponse> for GroupDayResponse {
    fn from(db: GroupDayDBResponse) -> Self {
        Self {
            id: db.id,
            day: db.day,
            start_time: db.start_time,
            end_time: db.end_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GroupId,
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    pub course_name: String,
    pub name: Option<String>,
    pub max_capacity: i32,
    pub state: GroupState,
    pub enrollment_count: i64,
    /// `max(0, max_capacity - enrollment_count)`
    pub remaining_capacity: i64,
    /// Session days in date order
    pub days: Vec<GroupDayResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupResponse {
    pub fn new(db: GroupDBResponse, enrollment_count: i64) -> Self {
        Self {
            id: db.id,
            course_id: db.course_id,
            course_name: db.course_name,
            name: db.name,
            max_capacity: db.max_capacity,
            state: db.state,
            enrollment_count,
            remaining_capacity: remaining_capacity(db.max_capacity, enrollment_count),
            days: db.days.into_iter().map(Into::into).collect(),
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
