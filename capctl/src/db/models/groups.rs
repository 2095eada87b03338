use crate::api::models::{courses::CourseVisibility, groups::GroupState};
use crate::types::{CourseId, GroupDayId, GroupId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDayInput {
    pub day: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone)]
pub struct GroupCreateDBRequest {
    pub course_id: CourseId,
    pub name: Option<String>,
    pub max_capacity: i32,
    pub state: GroupState,
    pub days: Vec<GroupDayInput>,
}

/// Partial update; `days: Some(..)` replaces every session day of the group
#[derive(Debug, Clone, Default)]
pub struct GroupUpdateDBRequest {
    pub name: Option<String>,
    pub max_capacity: Option<i32>,
    pub state: Option<GroupState>,
    pub days: Option<Vec<GroupDayInput>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupDayDBResponse {
    pub id: GroupDayId,
    pub group_id: GroupId,
    pub day: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone)]
pub struct GroupDBResponse {
    pub id: GroupId,
    pub course_id: CourseId,
    pub course_name: String,
    pub name: Option<String>,
    pub max_capacity: i32,
    pub state: GroupState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub days: Vec<GroupDayDBResponse>,
}

impl GroupDBResponse {
    /// Earliest session day, used as "the group date" in exports and emails
    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.iter().map(|d| d.day).min()
    }
}

/// Snapshot of a group taken under its row lock during enrollment
#[derive(Debug, Clone, FromRow)]
pub struct LockedGroup {
    pub id: GroupId,
    pub course_id: CourseId,
    pub course_visibility: CourseVisibility,
    pub max_capacity: i32,
    pub state: GroupState,
    pub enrollment_count: i64,
}
