//! Read-only aggregates behind the admin dashboard.
//!
//! Every figure is recomputed from the tables on each call. The optional course, group and dealer
//! filters narrow all of them: totals of courses and groups only count those reached by matching
//! enrollments once a dealer is chosen, and dealers/mechanics only those with enrollments in the
//! chosen course or group.

use crate::api::models::reports::{
    AttendanceSummary, CoursePopularity, DashboardQuery, DashboardResponse, DealerEnrollmentCount, GroupPopularity,
};
use crate::db::errors::Result;
use crate::types::{CourseId, DealerId, GroupId};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Size of the popularity rankings
const TOP_N: i64 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardFilter {
    pub course_id: Option<CourseId>,
    pub group_id: Option<GroupId>,
    pub dealer_id: Option<DealerId>,
}

impl From<DashboardQuery> for DashboardFilter {
    fn from(query: DashboardQuery) -> Self {
        Self {
            course_id: query.course_id,
            group_id: query.group_id,
            dealer_id: query.dealer_id,
        }
    }
}

// Enrollments matching the filter, with their course; $1 course, $2 group, $3 dealer
const SCOPED: &str = r#"
    WITH scoped AS (
        SELECT e.id, e.group_id, e.dealer_id, e.mechanic_id, e.attendance, g.course_id
        FROM enrollments e
        JOIN groups g ON g.id = e.group_id
        WHERE ($1::uuid IS NULL OR g.course_id = $1)
          AND ($2::uuid IS NULL OR e.group_id = $2)
          AND ($3::uuid IS NULL OR e.dealer_id = $3)
    )
"#;

#[derive(Debug, FromRow)]
struct Totals {
    total_courses: i64,
    total_groups: i64,
    total_dealers: i64,
    total_mechanics: i64,
    total_enrollments: i64,
    present: i64,
    absent: i64,
    pending: i64,
}

pub struct Reports<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Reports<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn dashboard(&mut self, filter: &DashboardFilter) -> Result<DashboardResponse> {
        let totals = self.totals(filter).await?;

        Ok(DashboardResponse {
            total_courses: totals.total_courses,
            total_groups: totals.total_groups,
            total_dealers: totals.total_dealers,
            total_mechanics: totals.total_mechanics,
            total_enrollments: totals.total_enrollments,
            attendance: AttendanceSummary::new(totals.present, totals.absent, totals.pending),
            top_courses: self.top_courses(filter).await?,
            top_groups: self.top_groups(filter).await?,
            enrollments_by_dealer: self.enrollments_by_dealer(filter).await?,
        })
    }

    async fn totals(&mut self, filter: &DashboardFilter) -> Result<Totals> {
        let totals = sqlx::query_as::<_, Totals>(&format!(
            r#"
            {SCOPED}
            SELECT
                (SELECT COUNT(*) FROM courses c
                  WHERE ($1::uuid IS NULL OR c.id = $1)
                    AND ($2::uuid IS NULL OR EXISTS (SELECT 1 FROM groups g WHERE g.id = $2 AND g.course_id = c.id))
                    AND ($3::uuid IS NULL OR EXISTS (SELECT 1 FROM scoped s WHERE s.course_id = c.id))) AS total_courses,
                (SELECT COUNT(*) FROM groups g
                  WHERE ($1::uuid IS NULL OR g.course_id = $1)
                    AND ($2::uuid IS NULL OR g.id = $2)
                    AND ($3::uuid IS NULL OR EXISTS (SELECT 1 FROM scoped s WHERE s.group_id = g.id))) AS total_groups,
                (SELECT COUNT(*) FROM dealers d
                  WHERE ($3::uuid IS NULL OR d.id = $3)
                    AND (($1::uuid IS NULL AND $2::uuid IS NULL) OR EXISTS (SELECT 1 FROM scoped s WHERE s.dealer_id = d.id))) AS total_dealers,
                (SELECT COUNT(*) FROM mechanics m
                  WHERE ($3::uuid IS NULL OR m.dealer_id = $3)
                    AND (($1::uuid IS NULL AND $2::uuid IS NULL) OR EXISTS (SELECT 1 FROM scoped s WHERE s.mechanic_id = m.id))) AS total_mechanics,
                (SELECT COUNT(*) FROM scoped) AS total_enrollments,
                (SELECT COUNT(*) FROM scoped WHERE attendance = 'present') AS present,
                (SELECT COUNT(*) FROM scoped WHERE attendance = 'absent') AS absent,
                (SELECT COUNT(*) FROM scoped WHERE attendance = 'pending') AS pending
            "#
        ))
        .bind(filter.course_id)
        .bind(filter.group_id)
        .bind(filter.dealer_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(totals)
    }

    async fn top_courses(&mut self, filter: &DashboardFilter) -> Result<Vec<CoursePopularity>> {
        let rows = sqlx::query_as::<_, (CourseId, String, i64)>(&format!(
            r#"
            {SCOPED}
            SELECT c.id, c.name, COUNT(s.id) AS enrollment_count
            FROM courses c
            JOIN scoped s ON s.course_id = c.id
            GROUP BY c.id, c.name
            ORDER BY enrollment_count DESC, c.name ASC
            LIMIT $4
            "#
        ))
        .bind(filter.course_id)
        .bind(filter.group_id)
        .bind(filter.dealer_id)
        .bind(TOP_N)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(course_id, course_name, enrollment_count)| CoursePopularity {
                course_id,
                course_name,
                enrollment_count,
            })
            .collect())
    }

    async fn top_groups(&mut self, filter: &DashboardFilter) -> Result<Vec<GroupPopularity>> {
        let rows = sqlx::query_as::<_, (GroupId, Option<String>, String, i32, i64)>(&format!(
            r#"
            {SCOPED}
            SELECT g.id, g.name, c.name, g.max_capacity, COUNT(s.id) AS enrollment_count
            FROM groups g
            JOIN courses c ON c.id = g.course_id
            JOIN scoped s ON s.group_id = g.id
            GROUP BY g.id, g.name, c.name, g.max_capacity
            ORDER BY enrollment_count DESC, c.name ASC, g.created_at ASC
            LIMIT $4
            "#
        ))
        .bind(filter.course_id)
        .bind(filter.group_id)
        .bind(filter.dealer_id)
        .bind(TOP_N)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(group_id, group_name, course_name, max_capacity, enrollment_count)| GroupPopularity {
                group_id,
                group_name,
                course_name,
                max_capacity,
                enrollment_count,
                fill_rate: fill_rate(enrollment_count, max_capacity),
            })
            .collect())
    }

    async fn enrollments_by_dealer(&mut self, filter: &DashboardFilter) -> Result<Vec<DealerEnrollmentCount>> {
        let rows = sqlx::query_as::<_, (DealerId, String, i64)>(&format!(
            r#"
            {SCOPED}
            SELECT d.id, d.name, COUNT(s.id) AS enrollment_count
            FROM dealers d
            JOIN scoped s ON s.dealer_id = d.id
            GROUP BY d.id, d.name
            ORDER BY enrollment_count DESC, LOWER(d.name) ASC
            "#
        ))
        .bind(filter.course_id)
        .bind(filter.group_id)
        .bind(filter.dealer_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(dealer_id, dealer_name, enrollment_count)| DealerEnrollmentCount {
                dealer_id,
                dealer_name,
                enrollment_count,
            })
            .collect())
    }
}

/// Seats taken over capacity, capped at 1 when capacity was lowered below the head count
fn fill_rate(enrollment_count: i64, max_capacity: i32) -> f64 {
    if max_capacity <= 0 {
        return 0.0;
    }
    (enrollment_count as f64 / max_capacity as f64).min(1.0)
}
