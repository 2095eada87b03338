//! Database repository for enrollments.
//!
//! Capacity checks are not done here: they need the group row lock taken by
//! [`crate::db::handlers::Groups::lock_for_enrollment`], which the enrollment workflow in
//! [`crate::enrollment`] holds around [`Enrollments::create`].

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::enrollments::{
        EnrollmentCreateDBRequest, EnrollmentDBResponse, EnrollmentExportRow, EnrollmentFilter, EnrollmentUpdateDBRequest,
    },
};
use crate::types::{EnrollmentId, abbrev_uuid};
use sqlx::{PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

/// Paginated listing criteria
#[derive(Debug, Clone)]
pub struct EnrollmentListFilter {
    pub skip: i64,
    pub limit: i64,
    pub criteria: EnrollmentFilter,
}

impl EnrollmentListFilter {
    pub fn new(skip: i64, limit: i64, criteria: EnrollmentFilter) -> Self {
        Self { skip, limit, criteria }
    }
}

/// Appends the filter to a query whose FROM clause aliases enrollments as `e` and groups as `g`
pub(crate) fn push_enrollment_conditions(filter: &EnrollmentFilter, query: &mut QueryBuilder<'_, sqlx::Postgres>) {
    if let Some(course_id) = filter.course_id {
        query.push(" AND g.course_id = ");
        query.push_bind(course_id);
    }
    if let Some(group_id) = filter.group_id {
        query.push(" AND e.group_id = ");
        query.push_bind(group_id);
    }
    if let Some(dealer_id) = filter.dealer_id {
        query.push(" AND e.dealer_id = ");
        query.push_bind(dealer_id);
    }
    if let Some(attendance) = filter.attendance {
        query.push(" AND e.attendance = ");
        query.push_bind(attendance);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{search}%");
        query.push(" AND (e.participant_name ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR e.participant_email ILIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
}

const ENROLLMENT_COLUMNS: &str = "e.id, e.group_id, e.dealer_id, e.mechanic_id, e.participant_name, e.participant_email, \
     e.phone, e.notes, e.attendance, e.created_at, e.updated_at";

pub struct Enrollments<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Enrollments<'c> {
    type CreateRequest = EnrollmentCreateDBRequest;
    type UpdateRequest = EnrollmentUpdateDBRequest;
    type Response = EnrollmentDBResponse;
    type Id = EnrollmentId;
    type Filter = EnrollmentListFilter;

    /// Fails with a `UniqueViolation` on `enrollments_group_email_unique` for a repeated email
    #[instrument(skip(self, request), fields(group_id = %abbrev_uuid(&request.group_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let enrollment = sqlx::query_as::<_, EnrollmentDBResponse>(&format!(
            r#"
            INSERT INTO enrollments AS e (group_id, dealer_id, mechanic_id, participant_name, participant_email, phone, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        ))
        .bind(request.group_id)
        .bind(request.dealer_id)
        .bind(request.mechanic_id)
        .bind(&request.participant_name)
        .bind(&request.participant_email)
        .bind(&request.phone)
        .bind(&request.notes)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(enrollment)
    }

    #[instrument(skip(self), fields(enrollment_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let enrollment = sqlx::query_as::<_, EnrollmentDBResponse>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE e.id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(enrollment)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<EnrollmentId>) -> Result<HashMap<EnrollmentId, EnrollmentDBResponse>> {
        let enrollments = sqlx::query_as::<_, EnrollmentDBResponse>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE e.id = ANY($1)"
        ))
        .bind(ids.as_slice())
        .fetch_all(&mut *self.db)
        .await?;

        Ok(enrollments.into_iter().map(|e| (e.id, e)).collect())
    }

    /// Newest first
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e JOIN groups g ON g.id = e.group_id WHERE 1=1"
        ));
        push_enrollment_conditions(&filter.criteria, &mut query);
        query.push(" ORDER BY e.created_at DESC, e.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let enrollments = query.build_query_as::<EnrollmentDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(enrollments)
    }

    #[instrument(skip(self), fields(enrollment_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM enrollments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(enrollment_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let enrollment = sqlx::query_as::<_, EnrollmentDBResponse>(&format!(
            r#"
            UPDATE enrollments AS e SET
                attendance = COALESCE($2, attendance),
                phone = CASE WHEN $3::text IS NULL THEN phone ELSE NULLIF($3, '') END,
                notes = CASE WHEN $4::text IS NULL THEN notes ELSE NULLIF($4, '') END,
                updated_at = NOW()
            WHERE e.id = $1
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.attendance)
        .bind(&request.phone)
        .bind(&request.notes)
        .fetch_optional(&mut *self.db)
        .await?;

        enrollment.ok_or(DbError::NotFound)
    }
}

impl<'c> Enrollments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &EnrollmentFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM enrollments e JOIN groups g ON g.id = e.group_id WHERE 1=1");
        push_enrollment_conditions(filter, &mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    /// Every matching enrollment, denormalized for spreadsheets.
    ///
    /// Ordered by course, then group date, then participant, so one course's groups stay together.
    #[instrument(skip(self, filter), err)]
    pub async fn export_rows(&mut self, filter: &EnrollmentFilter) -> Result<Vec<EnrollmentExportRow>> {
        let mut query = QueryBuilder::new(
            r#"
            SELECT e.participant_name, e.participant_email, e.phone, d.name AS dealer_name,
                   c.name AS course_name, g.name AS group_name,
                   (SELECT MIN(gd.day) FROM group_days gd WHERE gd.group_id = g.id) AS group_date,
                   e.attendance, e.notes, e.created_at
            FROM enrollments e
            JOIN groups g ON g.id = e.group_id
            JOIN courses c ON c.id = g.course_id
            JOIN dealers d ON d.id = e.dealer_id
            WHERE 1=1
            "#,
        );
        push_enrollment_conditions(filter, &mut query);
        query.push(" ORDER BY c.name ASC, group_date ASC NULLS LAST, g.id, LOWER(e.participant_name) ASC, e.created_at ASC");

        let rows = query.build_query_as::<EnrollmentExportRow>().fetch_all(&mut *self.db).await?;
        Ok(rows)
    }
}
