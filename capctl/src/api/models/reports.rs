//! Dashboard aggregates.

use crate::types::{CourseId, DealerId, GroupId};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Every figure on the dashboard is narrowed by these filters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct DashboardQuery {
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub course_id: Option<CourseId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub group_id: Option<GroupId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub dealer_id: Option<DealerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttendanceSummary {
    pub present: i64,
    pub absent: i64,
    pub pending: i64,
    /// `present / (present + absent)`; null until someone has been marked
    pub rate: Option<f64>,
}

impl AttendanceSummary {
    pub fn new(present: i64, absent: i64, pending: i64) -> Self {
        let marked = present + absent;
        let rate = (marked > 0).then(|| present as f64 / marked as f64);
        Self {
            present,
            absent,
            pending,
            rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CoursePopularity {
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    pub course_name: String,
    pub enrollment_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupPopularity {
    #[schema(value_type = String, format = "uuid")]
    pub group_id: GroupId,
    pub group_name: Option<String>,
    pub course_name: String,
    pub max_capacity: i32,
    pub enrollment_count: i64,
    /// Share of seats taken, between 0 and 1
    pub fill_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DealerEnrollmentCount {
    #[schema(value_type = String, format = "uuid")]
    pub dealer_id: DealerId,
    pub dealer_name: String,
    pub enrollment_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub total_courses: i64,
    pub total_groups: i64,
    pub total_dealers: i64,
    pub total_mechanics: i64,
    pub total_enrollments: i64,
    pub attendance: AttendanceSummary,
    pub top_courses: Vec<CoursePopularity>,
    pub top_groups: Vec<GroupPopularity>,
    pub enrollments_by_dealer: Vec<DealerEnrollmentCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attendance_rate() {
        let summary = AttendanceSummary::new(3, 1, 10);
        assert_eq!(summary.rate, Some(0.75));

        let unmarked = AttendanceSummary::new(0, 0, 4);
        assert_eq!(unmarked.rate, None);
    }
}
