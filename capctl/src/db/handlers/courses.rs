//! Database repository for training courses.

use crate::api::models::courses::CourseVisibility;
use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::courses::{CourseCreateDBRequest, CourseDBResponse, CourseStats, CourseUpdateDBRequest},
};
use crate::types::{CourseId, abbrev_uuid};
use sqlx::{Connection, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

const COURSE_COLUMNS: &str = "id, name, description, modality, visibility, created_by, created_at, updated_at";

/// Filter for listing courses
#[derive(Debug, Clone)]
pub struct CourseFilter {
    pub skip: i64,
    pub limit: i64,
    /// Case-insensitive substring match on name
    pub search: Option<String>,
    pub visibility: Option<CourseVisibility>,
}

impl CourseFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            search: None,
            visibility: None,
        }
    }

    pub fn with_search(mut self, search: String) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_visibility(mut self, visibility: CourseVisibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, sqlx::Postgres>) {
        if let Some(ref search) = self.search {
            query.push(" AND LOWER(name) LIKE ");
            query.push_bind(format!("%{}%", search.to_lowercase()));
        }
        if let Some(visibility) = self.visibility {
            query.push(" AND visibility = ");
            query.push_bind(visibility);
        }
    }
}

pub struct Courses<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Courses<'c> {
    type CreateRequest = CourseCreateDBRequest;
    type UpdateRequest = CourseUpdateDBRequest;
    type Response = CourseDBResponse;
    type Id = CourseId;
    type Filter = CourseFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let course = sqlx::query_as::<_, CourseDBResponse>(&format!(
            r#"
            INSERT INTO courses (name, description, modality, visibility, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COURSE_COLUMNS}
            "#
        ))
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.modality)
        .bind(request.visibility)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(course)
    }

    #[instrument(skip(self), fields(course_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let course = sqlx::query_as::<_, CourseDBResponse>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(course)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<CourseId>) -> Result<HashMap<CourseId, CourseDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let courses = sqlx::query_as::<_, CourseDBResponse>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ANY($1)"))
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        Ok(courses.into_iter().map(|c| (c.id, c)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("SELECT {COURSE_COLUMNS} FROM courses WHERE 1=1"));
        filter.push_conditions(&mut query);

        query.push(" ORDER BY name ASC, created_at ASC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let courses = query.build_query_as::<CourseDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(courses)
    }

    /// Removes the course with every group and enrollment under it, atomically.
    ///
    /// The course's groups are locked first so a concurrent enrollment either commits before the
    /// delete starts or finds its group gone.
    #[instrument(skip(self), fields(course_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        sqlx::query("SELECT id FROM groups WHERE course_id = $1 FOR UPDATE")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        let enrollments = sqlx::query("DELETE FROM enrollments WHERE group_id IN (SELECT id FROM groups WHERE course_id = $1)")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Session days go with their group (ON DELETE CASCADE)
        let groups = sqlx::query("DELETE FROM groups WHERE course_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let course = sqlx::query("DELETE FROM courses WHERE id = $1").bind(id).execute(&mut *tx).await?;

        if course.rows_affected() == 0 {
            // Nothing to delete; dropping the transaction rolls back the child deletes
            return Ok(false);
        }

        tx.commit().await?;

        tracing::info!(
            groups = groups.rows_affected(),
            enrollments = enrollments.rows_affected(),
            "Deleted course with its groups and enrollments"
        );
        Ok(true)
    }

    #[instrument(skip(self, request), fields(course_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // An empty description clears it; an absent one keeps the current value
        let course = sqlx::query_as::<_, CourseDBResponse>(&format!(
            r#"
            UPDATE courses SET
                name = COALESCE($2, name),
                description = CASE WHEN $3::text IS NULL THEN description ELSE NULLIF($3, '') END,
                modality = COALESCE($4, modality),
                visibility = COALESCE($5, visibility),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COURSE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.modality)
        .bind(request.visibility)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(crate::db::errors::DbError::NotFound)?;

        Ok(course)
    }
}

impl<'c> Courses<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &CourseFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM courses WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    /// Group and enrollment counts per course; courses without groups are absent from the map
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn stats(&mut self, ids: &[CourseId]) -> Result<HashMap<CourseId, CourseStats>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (CourseId, i64, i64)>(
            r#"
            SELECT g.course_id, COUNT(DISTINCT g.id), COUNT(e.id)
            FROM groups g
            LEFT JOIN enrollments e ON e.group_id = g.id
            WHERE g.course_id = ANY($1)
            GROUP BY g.course_id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, group_count, enrollment_count)| {
                (
                    id,
                    CourseStats {
                        group_count,
                        enrollment_count,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::courses::CourseModality;
    use crate::test_utils::{create_test_admin, create_test_course, create_test_dealer, create_test_group, insert_test_enrollment};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_get_course(pool: PgPool) {
        let admin = create_test_admin(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Courses::new(&mut conn);

        let created = repo
            .create(&CourseCreateDBRequest {
                name: "Maintenance 101".to_string(),
                description: Some("Preventive maintenance".to_string()),
                modality: CourseModality::Hybrid,
                visibility: CourseVisibility::Visible,
                created_by: Some(admin.id),
            })
            .await
            .unwrap();

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Maintenance 101");
        assert_eq!(fetched.modality, CourseModality::Hybrid);
        assert_eq!(fetched.created_by, Some(admin.id));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_is_ordered_by_name_and_filtered(pool: PgPool) {
        create_test_course(&pool, "Transmissions", CourseVisibility::Visible).await;
        create_test_course(&pool, "Air conditioning", CourseVisibility::Hidden).await;
        create_test_course(&pool, "Brakes", CourseVisibility::Visible).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Courses::new(&mut conn);

        let all = repo.list(&CourseFilter::new(0, 10)).await.unwrap();
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Air conditioning", "Brakes", "Transmissions"]);

        let visible = CourseFilter::new(0, 10).with_visibility(CourseVisibility::Visible);
        assert_eq!(repo.list(&visible).await.unwrap().len(), 2);
        assert_eq!(repo.count(&visible).await.unwrap(), 2);

        let search = CourseFilter::new(0, 10).with_search("BRA".to_string());
        let found = repo.list(&search).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Brakes");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_partial_update(pool: PgPool) {
        let course = create_test_course(&pool, "Diagnostics", CourseVisibility::Draft).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Courses::new(&mut conn);

        let updated = repo
            .update(
                course.id,
                &CourseUpdateDBRequest {
                    visibility: Some(CourseVisibility::Visible),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Diagnostics");
        assert_eq!(updated.visibility, CourseVisibility::Visible);

        let cleared = repo
            .update(
                course.id,
                &CourseUpdateDBRequest {
                    description: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.description, None);

        let missing = repo.update(uuid::Uuid::new_v4(), &CourseUpdateDBRequest::default()).await;
        assert!(matches!(missing, Err(crate::db::errors::DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_cascades_to_groups_and_enrollments(pool: PgPool) {
        let course = create_test_course(&pool, "Maintenance 101", CourseVisibility::Visible).await;
        let other = create_test_course(&pool, "Electrical", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 2).await;
        let other_group = create_test_group(&pool, other.id, 5).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;
        insert_test_enrollment(&pool, group.id, dealer.id, "ana@x.com").await;
        insert_test_enrollment(&pool, group.id, dealer.id, "bob@x.com").await;
        insert_test_enrollment(&pool, other_group.id, dealer.id, "carl@x.com").await;

        let mut conn = pool.acquire().await.unwrap();
        assert!(Courses::new(&mut conn).delete(course.id).await.unwrap());

        let groups: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM groups WHERE course_id = $1")
            .bind(course.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        let enrollments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE group_id = $1")
            .bind(group.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        let days: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM group_days WHERE group_id = $1")
            .bind(group.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((groups, enrollments, days), (0, 0, 0));

        // Unrelated course untouched
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments").fetch_one(&pool).await.unwrap();
        assert_eq!(remaining, 1);

        // Second delete finds nothing
        assert!(!Courses::new(&mut conn).delete(course.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stats(pool: PgPool) {
        let course = create_test_course(&pool, "Maintenance 101", CourseVisibility::Visible).await;
        let empty = create_test_course(&pool, "Empty", CourseVisibility::Visible).await;
        let g1 = create_test_group(&pool, course.id, 10).await;
        create_test_group(&pool, course.id, 10).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;
        insert_test_enrollment(&pool, g1.id, dealer.id, "ana@x.com").await;

        let mut conn = pool.acquire().await.unwrap();
        let stats = Courses::new(&mut conn).stats(&[course.id, empty.id]).await.unwrap();
        assert_eq!(
            stats.get(&course.id),
            Some(&CourseStats {
                group_count: 2,
                enrollment_count: 1
            })
        );
        assert!(!stats.contains_key(&empty.id));
    }
}
